use alloc::sync::Arc;
use log::{error, info, trace};

use crate::bus::driver::BusDriver;
use crate::pnp::device::{DeviceRecord, DeviceRole};
use crate::pnp::request::{complete_request, RequestHandle};
use crate::pnp::state::PnpState;
use crate::pnp::{fdo, pdo};
use crate::status::DriverStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Pdo,
    Fdo,
    Reject,
}

/// Pure routing decision from a record's role and a snapshot of its PnP state.
pub fn route(role: DeviceRole, state: PnpState) -> Route {
    if state == PnpState::Deleted {
        return Route::Reject;
    }
    match role {
        DeviceRole::Physical => Route::Pdo,
        DeviceRole::Functional => Route::Fdo,
    }
}

/// Entry point for every request aimed at one of our device records.
///
/// Completes the request unless the handler reports `Pending`, in which case
/// whoever took ownership completes it later.
pub fn dispatch(driver: &BusDriver, record: &Arc<DeviceRecord>, req: &RequestHandle) -> DriverStatus {
    let status = call_driver(driver, record, req);
    if status != DriverStatus::Pending {
        complete_request(req, status);
    }
    status
}

/// Runs the role handler for `record` without completing the request.
///
/// Used by an FDO passing a request down to the PDO it sits on. The remove-lock
/// reference taken here lives in the request until it completes.
pub(crate) fn call_driver(
    driver: &BusDriver,
    record: &Arc<DeviceRecord>,
    req: &RequestHandle,
) -> DriverStatus {
    let kind = req.read().kind;
    let route = route(record.role(), record.pnp_state());
    if route == Route::Reject {
        trace!("{:?} to deleted {}", kind, record.identity().device_id());
        return DriverStatus::NoSuchDevice;
    }

    let token = match record.acquire() {
        Ok(t) => t,
        Err(_) => return DriverStatus::NoSuchDevice,
    };
    req.write().hold(token);

    match route {
        Route::Pdo => pdo::dispatch(driver, record, req),
        Route::Fdo => fdo::dispatch(driver, record, req),
        Route::Reject => DriverStatus::NoSuchDevice,
    }
}

pub(crate) fn status_of(result: Result<(), DriverStatus>) -> DriverStatus {
    match result {
        Ok(()) => DriverStatus::Success,
        Err(e) => e,
    }
}

/// Moves `record` into `RemovePending` unless it is already on a removal path.
pub(crate) fn enter_remove(record: &DeviceRecord) -> Result<(), DriverStatus> {
    match record.pnp_state() {
        PnpState::RemovePending | PnpState::SurpriseRemovePending => Ok(()),
        _ => record.set_pnp_state(PnpState::RemovePending),
    }
}

/// Waits out every in-flight request on `record`, then deletes and unregisters it.
///
/// The caller must already have given back its own reference.
pub(crate) fn drain_and_delete(driver: &BusDriver, record: &Arc<DeviceRecord>) -> Result<(), DriverStatus> {
    record.remove_lock().begin_drain(&**driver.platform());
    finish_remove(driver, record)
}

pub(crate) fn finish_remove(driver: &BusDriver, record: &Arc<DeviceRecord>) -> Result<(), DriverStatus> {
    if record.pnp_state() == PnpState::RemovePending {
        record.set_pnp_state(PnpState::Removed)?;
    }
    record.set_pnp_state(PnpState::Deleted)?;

    if let Some(parent) = record
        .as_pdo()
        .and_then(|p| p.parent.as_ref())
        .and_then(|w| w.upgrade())
    {
        if let Some(fdo) = parent.as_fdo() {
            fdo.children.write().retain(|c| !Arc::ptr_eq(c, record));
        }
    }

    driver.devices().unregister(record).map_err(|e| {
        error!("failed to unregister {}: {}", record.identity().device_id(), e);
        e
    })?;
    info!("{} {} deleted", record.role(), record.identity().device_id());
    Ok(())
}
