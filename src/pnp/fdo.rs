use alloc::sync::Arc;
use alloc::vec::Vec;
use log::{error, info, trace, warn};

use crate::bus::driver::BusDriver;
use crate::pnp::device::{DeviceRecord, FdoExt};
use crate::pnp::dispatch::{call_driver, drain_and_delete, enter_remove, finish_remove, status_of};
use crate::pnp::pdo::{apply_power, cancel};
use crate::pnp::request::{RequestHandle, RequestInformation, RequestKind};
use crate::pnp::state::PnpState;
use crate::pnp::{DeviceRelationType, PnpMinorFunction};
use crate::status::DriverStatus;

pub(crate) fn dispatch(driver: &BusDriver, record: &Arc<DeviceRecord>, req: &RequestHandle) -> DriverStatus {
    let Some(fdo) = record.as_fdo() else {
        return DriverStatus::InvalidParameter;
    };
    let kind = req.read().kind;
    match kind {
        RequestKind::Pnp(minor) => pnp(driver, record, fdo, req, minor),
        RequestKind::Power(p) => {
            if let Err(e) = apply_power(record, p) {
                return e;
            }
            call_driver(driver, &fdo.lower, req)
        }
        _ => io(driver, record, fdo, req),
    }
}

fn io(driver: &BusDriver, record: &Arc<DeviceRecord>, fdo: &FdoExt, req: &RequestHandle) -> DriverStatus {
    if let Some(interceptor) = driver.interceptor() {
        if let Some(ticket) = fdo.filter.admit() {
            req.write().hold_ticket(ticket);
            return interceptor.intercept(driver, record, req);
        }
    }
    call_driver(driver, &fdo.lower, req)
}

/// Forwards to the PDO below, then rolls our own state back if it refused.
fn forward_or_rollback(driver: &BusDriver, record: &DeviceRecord, fdo: &FdoExt, req: &RequestHandle) -> DriverStatus {
    let status = call_driver(driver, &fdo.lower, req);
    if !status.is_success() {
        warn!(
            "FDO {}: lower refused ({}), rolling back from {}",
            record.identity().device_id(),
            status,
            record.pnp_state()
        );
        let _ = record.restore_pnp_state();
    }
    status
}

fn pnp(
    driver: &BusDriver,
    record: &Arc<DeviceRecord>,
    fdo: &FdoExt,
    req: &RequestHandle,
    minor: PnpMinorFunction,
) -> DriverStatus {
    trace!("FDO {} {}", record.identity().device_id(), minor);
    match minor {
        PnpMinorFunction::StartDevice => {
            if let Err(e) = record.set_pnp_state(PnpState::StartPending) {
                return e;
            }
            let status = forward_or_rollback(driver, record, fdo, req);
            if status != DriverStatus::Success {
                return status;
            }
            status_of(record.set_pnp_state(PnpState::Started))
        }
        PnpMinorFunction::QueryStopDevice => {
            if let Err(e) = record.set_pnp_state(PnpState::StopPending) {
                return e;
            }
            forward_or_rollback(driver, record, fdo, req)
        }
        PnpMinorFunction::CancelStopDevice => {
            let status = call_driver(driver, &fdo.lower, req);
            if let Err(e) = cancel(record, PnpState::StopPending) {
                return e;
            }
            status
        }
        PnpMinorFunction::StopDevice => {
            if let Err(e) = record.set_pnp_state(PnpState::Stopped) {
                return e;
            }
            call_driver(driver, &fdo.lower, req)
        }
        PnpMinorFunction::QueryRemoveDevice => {
            if let Err(e) = record.set_pnp_state(PnpState::RemovePending) {
                return e;
            }
            forward_or_rollback(driver, record, fdo, req)
        }
        PnpMinorFunction::CancelRemoveDevice => {
            let status = call_driver(driver, &fdo.lower, req);
            if let Err(e) = cancel(record, PnpState::RemovePending) {
                return e;
            }
            status
        }
        PnpMinorFunction::SurpriseRemoval => {
            if let Err(e) = record.set_pnp_state(PnpState::SurpriseRemovePending) {
                return e;
            }
            call_driver(driver, &fdo.lower, req)
        }
        PnpMinorFunction::RemoveDevice => remove(driver, record, fdo, req),
        PnpMinorFunction::QueryDeviceRelations(DeviceRelationType::BusRelations) => {
            let children = if fdo.active {
                fdo.children.read().clone()
            } else {
                Vec::new()
            };
            trace!("BusRelations: {} child(ren)", children.len());
            req.write().information = RequestInformation::Relations(children);
            DriverStatus::Success
        }
        _ => call_driver(driver, &fdo.lower, req),
    }
}

fn remove(driver: &BusDriver, record: &Arc<DeviceRecord>, fdo: &FdoExt, req: &RequestHandle) -> DriverStatus {
    if let Err(e) = enter_remove(record) {
        return e;
    }

    let children: Vec<_> = fdo.children.write().drain(..).collect();
    for child in children {
        let torn_down = abandon_query(&child)
            .and_then(|_| enter_remove(&child))
            .and_then(|_| drain_and_delete(driver, &child));
        if let Err(e) = torn_down {
            error!("child {} teardown failed: {}", child.identity().device_id(), e);
        }
    }

    req.write().release_lock_for(record);
    record.remove_lock().begin_drain(&**driver.platform());

    let status = call_driver(driver, &fdo.lower, req);
    if !status.is_success() {
        warn!("lower PDO failed remove: {}", status);
    }

    if let Err(e) = finish_remove(driver, record) {
        return e;
    }
    info!("FDO {} removed", record.identity().device_id());
    DriverStatus::Success
}

/// A child caught between a start or stop and its confirmation falls back to
/// where it was, so the parent can remove it from a settled state.
fn abandon_query(child: &DeviceRecord) -> Result<(), DriverStatus> {
    match child.pnp_state() {
        PnpState::StartPending | PnpState::StopPending => {
            warn!("{} abandoned {}", child.identity().device_id(), child.pnp_state());
            child.restore_pnp_state()
        }
        _ => Ok(()),
    }
}
