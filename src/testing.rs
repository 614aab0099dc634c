//! Host-side stand-ins for the kernel services, used by the unit tests.

use acpi::platform::{Processor, ProcessorState};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::Cell;
use raw_cpuid::CpuIdResult;
use spin::Mutex;
use std::thread;

use crate::platform::{Job, Platform};
use crate::status::DriverStatus;
use crate::system::processors::ProcessorTable;

std::thread_local! {
    static CURRENT_PROCESSOR: Cell<u32> = const { Cell::new(0) };
}

pub struct TestPlatform {
    pub runs: Mutex<Vec<u32>>,
    x2apic: bool,
}

impl TestPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            runs: Mutex::new(Vec::new()),
            x2apic: false,
        })
    }

    /// Processors report `x2apic_for(index)` through leaf 0xB; leaf 1 only has the low byte.
    pub fn with_x2apic() -> Arc<Self> {
        Arc::new(Self {
            runs: Mutex::new(Vec::new()),
            x2apic: true,
        })
    }

    fn apic_id(&self) -> u32 {
        let index = self.current_processor();
        if self.x2apic {
            x2apic_for(index)
        } else {
            apic_for(index)
        }
    }
}

/// Synthetic local APIC id reported by processor `index`.
pub fn apic_for(index: u32) -> u32 {
    index * 2 + 1
}

/// x2APIC id reported by processor `index`, always above the 8-bit range.
pub fn x2apic_for(index: u32) -> u32 {
    0x100 + index * 2
}

/// ACPI processor id the test MADT assigns to processor `index`.
pub fn uid_for(index: u32) -> u32 {
    index + 0x10
}

impl Platform for TestPlatform {
    fn yield_now(&self) {
        thread::yield_now();
    }

    fn current_processor(&self) -> u32 {
        CURRENT_PROCESSOR.with(|c| c.get())
    }

    fn run_on(&self, processor: u32, job: Job) -> Result<(), DriverStatus> {
        self.runs.lock().push(processor);
        thread::spawn(move || {
            CURRENT_PROCESSOR.with(|c| c.set(processor));
            job();
        });
        Ok(())
    }

    fn cpuid(&self, leaf: u32, subleaf: u32) -> CpuIdResult {
        match (leaf, subleaf) {
            (0, _) => CpuIdResult {
                eax: if self.x2apic { 0xB } else { 1 },
                ebx: u32::from_le_bytes(*b"Genu"),
                ecx: u32::from_le_bytes(*b"ntel"),
                edx: u32::from_le_bytes(*b"ineI"),
            },
            (1, _) => CpuIdResult {
                eax: 0,
                ebx: (self.apic_id() & 0xFF) << 24,
                ecx: 0,
                edx: 0,
            },
            // one SMT level, then invalid
            (0xB, 0) => CpuIdResult {
                eax: 1,
                ebx: 1,
                ecx: 1 << 8,
                edx: self.apic_id(),
            },
            (0xB, n) => CpuIdResult {
                eax: 0,
                ebx: 0,
                ecx: n,
                edx: self.apic_id(),
            },
            _ => CpuIdResult {
                eax: 0,
                ebx: 0,
                ecx: 0,
                edx: 0,
            },
        }
    }
}

/// Firmware entry for processor `index`; index 0 is the boot processor.
pub fn processor(index: u32) -> Processor {
    Processor {
        processor_uid: uid_for(index),
        local_apic_id: apic_for(index),
        state: if index == 0 {
            ProcessorState::Running
        } else {
            ProcessorState::WaitingForSipi
        },
        is_ap: index != 0,
    }
}

/// Table of `count` processors (at least the boot processor).
pub fn processor_table(count: u32) -> ProcessorTable {
    let application: Vec<Processor> = (1..count).map(processor).collect();
    ProcessorTable::new(processor(0), &application).unwrap()
}

/// Same table with every entry carrying its x2APIC id.
pub fn x2apic_processor_table(count: u32) -> ProcessorTable {
    let with_x2apic = |index| Processor {
        local_apic_id: x2apic_for(index),
        ..processor(index)
    };
    let application: Vec<Processor> = (1..count).map(with_x2apic).collect();
    ProcessorTable::new(with_x2apic(0), &application).unwrap()
}
