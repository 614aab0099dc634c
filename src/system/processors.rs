//! Firmware view of the processors, as the `acpi` crate reports it from the MADT.
//!
//! Callers holding `acpi::PlatformInfo` build the table from
//! `processor_info.boot_processor` and `processor_info.application_processors`.

use acpi::platform::{Processor, ProcessorState};
use alloc::vec::Vec;
use log::{error, trace};

use crate::status::DriverStatus;

#[derive(Debug, Clone)]
pub struct ProcessorTable {
    processors: Vec<Processor>,
}

impl ProcessorTable {
    /// Boot processor first, then the application processors in firmware order.
    pub fn new(boot: Processor, application: &[Processor]) -> Result<Self, DriverStatus> {
        let mut processors = Vec::new();
        processors
            .try_reserve_exact(application.len() + 1)
            .map_err(|_| {
                error!("cannot hold {} processor entries", application.len() + 1);
                DriverStatus::InsufficientResources
            })?;
        processors.push(boot);
        processors.extend_from_slice(application);
        trace!("{} processor(s) described by firmware", processors.len());
        Ok(Self { processors })
    }

    pub fn processors(&self) -> &[Processor] {
        &self.processors
    }

    /// Entries firmware marks usable, now or after hot-add.
    pub fn usable(&self) -> impl Iterator<Item = &Processor> {
        self.processors
            .iter()
            .filter(|p| !matches!(p.state, ProcessorState::Disabled))
    }

    pub fn processor_uid_for_apic(&self, apic_id: u32) -> Result<u32, DriverStatus> {
        self.processors
            .iter()
            .find(|p| p.local_apic_id == apic_id)
            .map(|p| p.processor_uid)
            .ok_or(DriverStatus::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{apic_for, processor, processor_table, uid_for, x2apic_for};

    #[test]
    fn maps_apic_to_processor_uid() {
        let table = processor_table(4);
        assert_eq!(table.processors().len(), 4);
        assert!(!table.processors()[0].is_ap);
        for i in 0..4 {
            assert_eq!(table.processor_uid_for_apic(apic_for(i)), Ok(uid_for(i)));
        }
        assert_eq!(table.processor_uid_for_apic(0xFE), Err(DriverStatus::NotFound));
    }

    #[test]
    fn x2apic_ids_resolve() {
        let mut ap = processor(1);
        ap.local_apic_id = x2apic_for(1);
        let table = ProcessorTable::new(processor(0), &[ap]).unwrap();
        assert!(x2apic_for(1) > 0xFF);
        assert_eq!(table.processor_uid_for_apic(x2apic_for(1)), Ok(uid_for(1)));
        assert_eq!(
            table.processor_uid_for_apic(x2apic_for(1) & 0xFF),
            Err(DriverStatus::NotFound)
        );
    }

    #[test]
    fn disabled_entries_still_map() {
        let mut parked = processor(2);
        parked.state = ProcessorState::Disabled;
        let table = ProcessorTable::new(processor(0), &[processor(1), parked]).unwrap();
        assert_eq!(table.usable().count(), 2);
        assert_eq!(table.processor_uid_for_apic(apic_for(2)), Ok(uid_for(2)));
    }
}
