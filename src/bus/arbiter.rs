//! Picks which of several candidate PDOs the bus FDO becomes active on.

use alloc::string::String;
use alloc::sync::Arc;
use core::mem;
use log::{error, trace};

use crate::bus::driver::BusDriver;
use crate::pnp::device::DeviceRecord;
use crate::pnp::dispatch::dispatch;
use crate::pnp::request::{wait_for_completion, Request, RequestInformation};
use crate::pnp::{PnpMinorFunction, QueryIdType};
use crate::registry::ConfigStore;
use crate::status::{Data, DriverStatus, RegError};

pub const ACTIVE_DEVICE_ID: &str = "ActiveDeviceID";
pub const ACTIVE_INSTANCE_ID: &str = "ActiveInstanceID";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSelection {
    pub device_id: String,
    pub instance_id: String,
}

fn read_sz(config: &dyn ConfigStore, key: &str, name: &str) -> Result<Option<String>, DriverStatus> {
    match config.get_value(key, name) {
        Ok(Data::Str(s)) => Ok(Some(s)),
        Ok(other) => {
            error!("{}: expected string, found {:?}", name, other);
            Err(DriverStatus::BadFormat)
        }
        Err(RegError::ValueNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Reads the configured active device. Either half missing means no selection.
pub fn read_active_selection(
    config: &dyn ConfigStore,
    parameters_key: &str,
) -> Result<Option<ActiveSelection>, DriverStatus> {
    let Some(device_id) = read_sz(config, parameters_key, ACTIVE_DEVICE_ID)? else {
        trace!("DeviceID = NOT SET");
        return Ok(None);
    };
    let Some(instance_id) = read_sz(config, parameters_key, ACTIVE_INSTANCE_ID)? else {
        trace!("InstanceID = NOT SET");
        return Ok(None);
    };
    trace!("DeviceID = {}", device_id);
    trace!("InstanceID = {}", instance_id);
    Ok(Some(ActiveSelection {
        device_id,
        instance_id,
    }))
}

pub trait IdentityQuery {
    fn query_id(&self, pdo: &Arc<DeviceRecord>, id_type: QueryIdType) -> Result<String, DriverStatus>;
}

/// Asks the device stack itself, the same way any other driver would.
pub struct StackIdentityQuery<'a> {
    driver: &'a BusDriver,
}

impl<'a> StackIdentityQuery<'a> {
    pub fn new(driver: &'a BusDriver) -> Self {
        Self { driver }
    }
}

impl IdentityQuery for StackIdentityQuery<'_> {
    fn query_id(&self, pdo: &Arc<DeviceRecord>, id_type: QueryIdType) -> Result<String, DriverStatus> {
        let req = Request::new_pnp(PnpMinorFunction::QueryId(id_type)).into_handle();
        let mut status = dispatch(self.driver, pdo, &req);
        if status == DriverStatus::Pending {
            status = wait_for_completion(&req, &**self.driver.platform());
        }
        if !status.is_success() {
            return Err(status);
        }
        let information = mem::take(&mut req.write().information);
        match information {
            RequestInformation::Id(id) => Ok(id),
            _ => Err(DriverStatus::NotSupported),
        }
    }
}

/// Whether `pdo` is the configured active device. Never queries without a selection.
pub fn arbitrate(
    selection: Option<&ActiveSelection>,
    query: &dyn IdentityQuery,
    pdo: &Arc<DeviceRecord>,
) -> Result<bool, DriverStatus> {
    let Some(selection) = selection else {
        return Ok(false);
    };
    let device_id = query.query_id(pdo, QueryIdType::DeviceId)?;
    let instance_id = query.query_id(pdo, QueryIdType::InstanceId)?;
    Ok(device_id.eq_ignore_ascii_case(&selection.device_id)
        && instance_id.eq_ignore_ascii_case(&selection.instance_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pnp::device::{DeviceExt, DeviceIdentity, PdoExt};
    use crate::registry::{parameters_key, Registry};
    use core::cell::Cell;

    struct Canned {
        device_id: &'static str,
        instance_id: &'static str,
        calls: Cell<u32>,
    }

    impl IdentityQuery for Canned {
        fn query_id(&self, _: &Arc<DeviceRecord>, id_type: QueryIdType) -> Result<String, DriverStatus> {
            self.calls.set(self.calls.get() + 1);
            Ok(match id_type {
                QueryIdType::DeviceId => self.device_id.into(),
                _ => self.instance_id.into(),
            })
        }
    }

    fn any_pdo() -> Arc<DeviceRecord> {
        Arc::new(DeviceRecord::new(
            DeviceIdentity::new("X", "0").unwrap(),
            DeviceExt::Physical(PdoExt::default()),
        ))
    }

    fn selection(device_id: &str, instance_id: &str) -> ActiveSelection {
        ActiveSelection {
            device_id: device_id.into(),
            instance_id: instance_id.into(),
        }
    }

    #[test]
    fn match_is_case_insensitive() {
        let canned = Canned {
            device_id: "pci\\ven_5853&dev_0001",
            instance_id: "0000",
            calls: Cell::new(0),
        };
        let sel = selection("PCI\\VEN_5853&DEV_0001", "0000");
        assert_eq!(arbitrate(Some(&sel), &canned, &any_pdo()), Ok(true));
        // Idempotent for the same inputs.
        assert_eq!(arbitrate(Some(&sel), &canned, &any_pdo()), Ok(true));

        let other = selection("PCI\\VEN_5853&DEV_0002", "0000");
        assert_eq!(arbitrate(Some(&other), &canned, &any_pdo()), Ok(false));
    }

    #[test]
    fn no_selection_never_queries() {
        let canned = Canned {
            device_id: "A",
            instance_id: "B",
            calls: Cell::new(0),
        };
        assert_eq!(arbitrate(None, &canned, &any_pdo()), Ok(false));
        assert_eq!(canned.calls.get(), 0);
    }

    #[test]
    fn selection_needs_both_values() {
        let reg = Registry::empty();
        let key = parameters_key("XENBUS");
        reg.create_key(&key).unwrap();
        assert_eq!(read_active_selection(&reg, &key), Ok(None));

        reg.set_value(&key, ACTIVE_DEVICE_ID, Data::Str("PCI\\VEN_5853".into()))
            .unwrap();
        assert_eq!(read_active_selection(&reg, &key), Ok(None));

        reg.set_value(&key, ACTIVE_INSTANCE_ID, Data::Str("0".into()))
            .unwrap();
        assert_eq!(
            read_active_selection(&reg, &key),
            Ok(Some(selection("PCI\\VEN_5853", "0")))
        );

        reg.set_value(&key, ACTIVE_INSTANCE_ID, Data::U32(0)).unwrap();
        assert_eq!(
            read_active_selection(&reg, &key),
            Err(DriverStatus::BadFormat)
        );
    }
}
