use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use log::{error, info, trace, warn};
use spin::{Mutex, RwLock};
use strum::Display;

use crate::platform::Platform;
use crate::status::DriverStatus;
use crate::structs::event::Event;
use crate::system::cpu;
use crate::system::processors::ProcessorTable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorRecord {
    pub manufacturer: String,
    pub apic_id: u32,
    pub processor_id: u32,
}

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorChange {
    AddStart,
    AddComplete,
    AddFailed,
}

/// Per-processor identity table kept in step with processor hot-add.
///
/// The table only ever grows. Slot `i` is filled by a probe that runs on
/// processor `i` itself after its add completes.
pub struct TopologySync {
    platform: Arc<dyn Platform>,
    firmware: ProcessorTable,
    processors: RwLock<Vec<Option<ProcessorRecord>>>,
}

impl TopologySync {
    pub fn new(platform: Arc<dyn Platform>, firmware: ProcessorTable) -> Arc<Self> {
        Arc::new(Self {
            platform,
            firmware,
            processors: RwLock::new(Vec::new()),
        })
    }

    pub fn processor_change(self: &Arc<Self>, index: u32, change: ProcessorChange) -> Result<(), DriverStatus> {
        trace!("====> ({}:{})", index, change);
        let result = match change {
            ProcessorChange::AddStart => self.grow(index),
            ProcessorChange::AddComplete => self.populate(index),
            ProcessorChange::AddFailed => {
                warn!("processor {} failed to come online", index);
                Ok(())
            }
        };
        trace!("<==== ({}:{})", index, change);
        result
    }

    /// Replays add-start/add-complete for processors already online at registration.
    pub fn register_existing(self: &Arc<Self>, count: u32) -> Result<(), DriverStatus> {
        for index in 0..count {
            self.processor_change(index, ProcessorChange::AddStart)?;
            self.processor_change(index, ProcessorChange::AddComplete)?;
        }
        Ok(())
    }

    fn grow(&self, index: u32) -> Result<(), DriverStatus> {
        let wanted = index as usize + 1;
        let mut table = self.processors.write();
        if wanted <= table.len() {
            return Ok(());
        }

        let mut grown: Vec<Option<ProcessorRecord>> = Vec::new();
        grown.try_reserve_exact(wanted).map_err(|_| {
            error!("cannot grow processor table to {}", wanted);
            DriverStatus::InsufficientResources
        })?;
        grown.extend(table.iter().cloned());
        grown.resize(wanted, None);
        *table = grown;
        Ok(())
    }

    fn populate(self: &Arc<Self>, index: u32) -> Result<(), DriverStatus> {
        if index as usize >= self.processor_count() {
            error!("add-complete for {} without add-start", index);
            return Err(DriverStatus::InvalidParameter);
        }

        let done = Arc::new(Event::new());
        let outcome: Arc<Mutex<Option<Result<(), DriverStatus>>>> = Arc::new(Mutex::new(None));
        let job = {
            let this = self.clone();
            let done = done.clone();
            let outcome = outcome.clone();
            Box::new(move || {
                *outcome.lock() = Some(this.probe_current());
                done.set();
            })
        };
        self.platform.run_on(index, job)?;
        done.wait(&*self.platform);

        let result = outcome.lock().take();
        result.unwrap_or(Err(DriverStatus::Unsuccessful))
    }

    fn probe_current(&self) -> Result<(), DriverStatus> {
        let index = self.platform.current_processor();
        info!("====> ({})", index);

        let identity = cpu::read_identity(&self.platform)?;
        let processor_id = self
            .firmware
            .processor_uid_for_apic(identity.apic_id)
            .map_err(|e| {
                error!("APIC ID {:02X} not described by the MADT", identity.apic_id);
                e
            })?;

        info!("Manufacturer: {}", identity.manufacturer);
        info!("APIC ID: {:02X}", identity.apic_id);
        info!("PROCESSOR ID: {:02X}", processor_id);

        let mut table = self.processors.write();
        let slot = table
            .get_mut(index as usize)
            .ok_or(DriverStatus::InvalidParameter)?;
        *slot = Some(ProcessorRecord {
            manufacturer: identity.manufacturer,
            apic_id: identity.apic_id,
            processor_id,
        });
        info!("<==== ({})", index);
        Ok(())
    }

    pub fn processor(&self, index: u32) -> Option<ProcessorRecord> {
        self.processors.read().get(index as usize).cloned().flatten()
    }

    pub fn processor_count(&self) -> usize {
        self.processors.read().len()
    }

    /// Firmware processor id for an OS processor index, once that processor is probed.
    pub fn virtual_cpu_index(&self, index: u32) -> Option<u32> {
        self.processor(index).map(|p| p.processor_id)
    }
}
