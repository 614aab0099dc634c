use alloc::string::String;
use alloc::sync::Arc;
use raw_cpuid::{CpuId, CpuIdReader, CpuIdResult};

use crate::platform::Platform;
use crate::status::DriverStatus;

/// Routes CPUID through the platform so probes run wherever the platform says.
#[derive(Clone)]
pub struct PlatformCpuIdReader {
    platform: Arc<dyn Platform>,
}

impl CpuIdReader for PlatformCpuIdReader {
    fn cpuid2(&self, eax: u32, ecx: u32) -> CpuIdResult {
        self.platform.cpuid(eax, ecx)
    }
}

pub fn get_cpu_info(platform: &Arc<dyn Platform>) -> CpuId<PlatformCpuIdReader> {
    CpuId::with_cpuid_reader(PlatformCpuIdReader {
        platform: platform.clone(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuIdentity {
    pub manufacturer: String,
    pub apic_id: u32,
}

/// Vendor string and local APIC id of the processor executing the caller.
pub fn read_identity(platform: &Arc<dyn Platform>) -> Result<CpuIdentity, DriverStatus> {
    let cpuid = get_cpu_info(platform);
    let manufacturer = cpuid
        .get_vendor_info()
        .map(|v| String::from(v.as_str()))
        .ok_or(DriverStatus::NotSupported)?;
    // Leaf 0xB carries the full x2APIC id; leaf 1 only has its low byte.
    let x2apic_id = cpuid
        .get_extended_topology_info()
        .and_then(|mut levels| levels.next())
        .map(|level| level.x2apic_id());
    let apic_id = match x2apic_id {
        Some(id) => id,
        None => cpuid
            .get_feature_info()
            .map(|f| f.initial_local_apic_id() as u32)
            .ok_or(DriverStatus::NotSupported)?,
    };
    Ok(CpuIdentity {
        manufacturer,
        apic_id,
    })
}
