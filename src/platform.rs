use alloc::boxed::Box;
use raw_cpuid::CpuIdResult;

use crate::status::DriverStatus;

/// Work item queued onto a specific processor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Services the embedding kernel provides to the bus core.
///
/// Every blocking wait in this crate is expressed as "check, then `yield_now`", so a
/// scheduler-backed implementation parks the caller instead of burning the core.
pub trait Platform: Send + Sync {
    fn yield_now(&self);

    /// OS index of the processor executing the caller.
    fn current_processor(&self) -> u32;

    /// Queue `job` to run on `processor`. Must not run it inline on the caller.
    fn run_on(&self, processor: u32, job: Job) -> Result<(), DriverStatus>;

    /// Execute CPUID on the current processor.
    fn cpuid(&self, leaf: u32, subleaf: u32) -> CpuIdResult;
}

