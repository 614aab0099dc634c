use alloc::sync::Arc;
use alloc::vec::Vec;
use hashbrown::HashMap;
use log::{error, trace};
use spin::Mutex;

use crate::pnp::device::{DeviceExt, DeviceIdentity, DeviceRecord, DeviceRole};
use crate::status::DriverStatus;

/// Every live device record this driver created, keyed by identity and role.
///
/// A PDO and the FDO attached over it share an identity; the role keeps them apart.
pub struct DeviceRegistry {
    records: Mutex<HashMap<(DeviceIdentity, DeviceRole), Arc<DeviceRecord>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(
        &self,
        identity: DeviceIdentity,
        ext: DeviceExt,
    ) -> Result<Arc<DeviceRecord>, DriverStatus> {
        let key = (identity.clone(), ext.role());
        let mut records = self.records.lock();
        if records.contains_key(&key) {
            return Err(DriverStatus::AlreadyExists);
        }
        records.try_reserve(1).map_err(|_| {
            error!("device registry: out of memory registering {}", identity.device_id());
            DriverStatus::InsufficientResources
        })?;

        let record = Arc::new(DeviceRecord::new(identity, ext));
        trace!(
            "registered {} {}\\{}",
            key.1,
            key.0.device_id(),
            key.0.instance_id()
        );
        records.insert(key, record.clone());
        Ok(record)
    }

    /// Drops the registry's reference. Only records that finished draining may leave.
    pub fn unregister(&self, record: &Arc<DeviceRecord>) -> Result<(), DriverStatus> {
        if !record.remove_lock().is_drained() {
            error!(
                "unregister of {} while references are outstanding",
                record.identity().device_id()
            );
            return Err(DriverStatus::Busy);
        }
        let key = (record.identity().clone(), record.role());
        let mut records = self.records.lock();
        match records.get(&key) {
            Some(existing) if Arc::ptr_eq(existing, record) => {
                records.remove(&key);
                Ok(())
            }
            _ => Err(DriverStatus::NotFound),
        }
    }

    /// Looks an identity up, preferring the functional record over the physical one.
    pub fn find(&self, identity: &DeviceIdentity) -> Option<Arc<DeviceRecord>> {
        self.find_role(identity, DeviceRole::Functional)
            .or_else(|| self.find_role(identity, DeviceRole::Physical))
    }

    pub fn find_role(
        &self,
        identity: &DeviceIdentity,
        role: DeviceRole,
    ) -> Option<Arc<DeviceRecord>> {
        self.records.lock().get(&(identity.clone(), role)).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn records(&self) -> Vec<Arc<DeviceRecord>> {
        self.records.lock().values().cloned().collect()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
