use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use bitflags::bitflags;
use core::sync::atomic::{AtomicU32, Ordering};
use spin::{Mutex, RwLock};
use strum::Display;

use crate::filter::{FilterGate, FilterState};
use crate::pnp::state::{
    DevicePowerState, PnpState, PnpStateMachine, PowerState, SystemPowerState,
};
use crate::status::DriverStatus;
use crate::structs::remove_lock::RemoveLock;

pub const MAX_DEVICE_ID_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    device_id: String,
    instance_id: String,
}

impl DeviceIdentity {
    pub fn new(device_id: &str, instance_id: &str) -> Result<Self, DriverStatus> {
        if device_id.is_empty()
            || device_id.len() >= MAX_DEVICE_ID_LEN
            || instance_id.len() >= MAX_DEVICE_ID_LEN
        {
            return Err(DriverStatus::InvalidParameter);
        }
        Ok(Self {
            device_id: device_id.into(),
            instance_id: instance_id.into(),
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceRole {
    Physical,
    Functional,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceFlags: u32 {
        const INITIALIZING = 1 << 0;
        const POWER_PAGABLE = 1 << 1;
    }
}

#[derive(Debug, Default)]
pub struct PdoExt {
    /// Bus FDO that enumerated this PDO, if it is one of ours.
    pub parent: Option<Weak<DeviceRecord>>,
}

#[derive(Debug)]
pub struct FdoExt {
    pub lower: Arc<DeviceRecord>,
    /// Chosen by the active-device arbiter at creation; never re-evaluated.
    pub active: bool,
    pub filter: Arc<FilterGate>,
    pub children: RwLock<Vec<Arc<DeviceRecord>>>,
}

impl FdoExt {
    pub fn new(lower: Arc<DeviceRecord>, active: bool) -> Self {
        Self {
            lower,
            active,
            filter: Arc::new(FilterGate::new(FilterState::Enabled)),
            children: RwLock::new(Vec::new()),
        }
    }
}

#[derive(Debug)]
pub enum DeviceExt {
    Physical(PdoExt),
    Functional(FdoExt),
}

impl DeviceExt {
    pub fn role(&self) -> DeviceRole {
        match self {
            DeviceExt::Physical(_) => DeviceRole::Physical,
            DeviceExt::Functional(_) => DeviceRole::Functional,
        }
    }
}

#[derive(Debug)]
pub struct DeviceRecord {
    identity: DeviceIdentity,
    ext: DeviceExt,
    pnp: Mutex<PnpStateMachine>,
    power: Mutex<PowerState>,
    flags: AtomicU32,
    remove_lock: RemoveLock,
}

impl DeviceRecord {
    pub fn new(identity: DeviceIdentity, ext: DeviceExt) -> Self {
        Self {
            identity,
            ext,
            pnp: Mutex::new(PnpStateMachine::new()),
            power: Mutex::new(PowerState::working()),
            flags: AtomicU32::new(DeviceFlags::INITIALIZING.bits()),
            remove_lock: RemoveLock::new(),
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn role(&self) -> DeviceRole {
        self.ext.role()
    }

    pub fn ext(&self) -> &DeviceExt {
        &self.ext
    }

    pub fn as_pdo(&self) -> Option<&PdoExt> {
        match &self.ext {
            DeviceExt::Physical(p) => Some(p),
            DeviceExt::Functional(_) => None,
        }
    }

    pub fn as_fdo(&self) -> Option<&FdoExt> {
        match &self.ext {
            DeviceExt::Functional(f) => Some(f),
            DeviceExt::Physical(_) => None,
        }
    }

    pub fn pnp_state(&self) -> PnpState {
        self.pnp.lock().current()
    }

    pub fn pnp_snapshot(&self) -> PnpStateMachine {
        *self.pnp.lock()
    }

    pub fn set_pnp_state(&self, to: PnpState) -> Result<(), DriverStatus> {
        self.pnp.lock().transition(to)
    }

    pub fn restore_pnp_state(&self) -> Result<(), DriverStatus> {
        self.pnp.lock().restore_previous()
    }

    pub fn power(&self) -> PowerState {
        *self.power.lock()
    }

    pub fn set_system_power(&self, state: SystemPowerState) -> Result<(), DriverStatus> {
        let pnp = self.pnp.lock();
        if pnp.current() == PnpState::Deleted {
            return Err(DriverStatus::InvalidState);
        }
        self.power.lock().system = state;
        Ok(())
    }

    pub fn set_device_power(&self, state: DevicePowerState) -> Result<(), DriverStatus> {
        let pnp = self.pnp.lock();
        if pnp.current() == PnpState::Deleted {
            return Err(DriverStatus::InvalidState);
        }
        self.power.lock().device = state;
        Ok(())
    }

    pub fn flags(&self) -> DeviceFlags {
        DeviceFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    pub fn set_flags(&self, flags: DeviceFlags) {
        self.flags.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    pub fn clear_flags(&self, flags: DeviceFlags) {
        self.flags.fetch_and(!flags.bits(), Ordering::AcqRel);
    }

    pub fn remove_lock(&self) -> &RemoveLock {
        &self.remove_lock
    }

    /// Takes a remove-lock reference that keeps this record alive until dropped.
    pub fn acquire(self: &Arc<Self>) -> Result<RemoveLockToken, DriverStatus> {
        self.remove_lock.acquire()?;
        Ok(RemoveLockToken {
            record: self.clone(),
        })
    }
}

#[derive(Debug)]
pub struct RemoveLockToken {
    record: Arc<DeviceRecord>,
}

impl RemoveLockToken {
    pub fn record(&self) -> &Arc<DeviceRecord> {
        &self.record
    }
}

impl Drop for RemoveLockToken {
    fn drop(&mut self) {
        self.record.remove_lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdo() -> Arc<DeviceRecord> {
        let id = DeviceIdentity::new("PCI\\VEN_5853&DEV_0001", "0000").unwrap();
        Arc::new(DeviceRecord::new(id, DeviceExt::Physical(PdoExt::default())))
    }

    #[test]
    fn identity_is_bounded() {
        let long: String = core::iter::repeat('A').take(MAX_DEVICE_ID_LEN).collect();
        assert_eq!(
            DeviceIdentity::new(&long, "0000"),
            Err(DriverStatus::InvalidParameter)
        );
        assert_eq!(
            DeviceIdentity::new("", "0000"),
            Err(DriverStatus::InvalidParameter)
        );
    }

    #[test]
    fn token_releases_on_drop() {
        let record = pdo();
        let token = record.acquire().unwrap();
        assert_eq!(record.remove_lock().outstanding(), 1);
        assert!(Arc::ptr_eq(token.record(), &record));
        drop(token);
        assert_eq!(record.remove_lock().outstanding(), 0);
    }

    #[test]
    fn power_frozen_after_delete() {
        let record = pdo();
        record.set_device_power(DevicePowerState::D3).unwrap();
        assert_eq!(record.power().device, DevicePowerState::D3);
        for s in [PnpState::RemovePending, PnpState::Removed, PnpState::Deleted] {
            record.set_pnp_state(s).unwrap();
        }
        assert_eq!(
            record.set_system_power(SystemPowerState::Sleeping3),
            Err(DriverStatus::InvalidState)
        );
        assert_eq!(
            record.set_device_power(DevicePowerState::D0),
            Err(DriverStatus::InvalidState)
        );
        assert_eq!(record.power().system, SystemPowerState::Working);
    }

    #[test]
    fn initializing_flag_starts_set() {
        let record = pdo();
        assert!(record.flags().contains(DeviceFlags::INITIALIZING));
        record.clear_flags(DeviceFlags::INITIALIZING);
        record.set_flags(DeviceFlags::POWER_PAGABLE);
        assert_eq!(record.flags(), DeviceFlags::POWER_PAGABLE);
    }
}
