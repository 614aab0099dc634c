use alloc::sync::Arc;
use alloc::vec;
use log::{info, trace};

use crate::bus::driver::BusDriver;
use crate::pnp::device::DeviceRecord;
use crate::pnp::dispatch::{drain_and_delete, enter_remove, status_of};
use crate::pnp::request::{RequestHandle, RequestInformation, RequestKind};
use crate::pnp::state::PnpState;
use crate::pnp::{DeviceRelationType, PnpMinorFunction, PowerRequest, QueryIdType};
use crate::status::DriverStatus;

pub(crate) fn dispatch(driver: &BusDriver, record: &Arc<DeviceRecord>, req: &RequestHandle) -> DriverStatus {
    let kind = req.read().kind;
    match kind {
        RequestKind::Pnp(minor) => pnp(driver, record, req, minor),
        RequestKind::Power(p) => status_of(apply_power(record, p)),
        _ => DriverStatus::NotSupported,
    }
}

pub(crate) fn apply_power(record: &DeviceRecord, request: PowerRequest) -> Result<(), DriverStatus> {
    match request {
        PowerRequest::SetSystem(s) => record.set_system_power(s),
        PowerRequest::SetDevice(d) => record.set_device_power(d),
    }
}

/// Undo a query-stop or query-remove. Cancels that arrive without a matching
/// query are accepted and ignored.
pub(crate) fn cancel(record: &DeviceRecord, pending: PnpState) -> Result<(), DriverStatus> {
    if record.pnp_state() == pending {
        record.restore_pnp_state()
    } else {
        Ok(())
    }
}

fn pnp(
    driver: &BusDriver,
    record: &Arc<DeviceRecord>,
    req: &RequestHandle,
    minor: PnpMinorFunction,
) -> DriverStatus {
    trace!("PDO {} {}", record.identity().device_id(), minor);
    let result = match minor {
        PnpMinorFunction::StartDevice => record
            .set_pnp_state(PnpState::StartPending)
            .and_then(|_| record.set_pnp_state(PnpState::Started)),
        PnpMinorFunction::QueryStopDevice => record.set_pnp_state(PnpState::StopPending),
        PnpMinorFunction::CancelStopDevice => cancel(record, PnpState::StopPending),
        PnpMinorFunction::StopDevice => record.set_pnp_state(PnpState::Stopped),
        PnpMinorFunction::QueryRemoveDevice => record.set_pnp_state(PnpState::RemovePending),
        PnpMinorFunction::CancelRemoveDevice => cancel(record, PnpState::RemovePending),
        PnpMinorFunction::SurpriseRemoval => record.set_pnp_state(PnpState::SurpriseRemovePending),
        PnpMinorFunction::RemoveDevice => {
            req.write().release_lock_for(record);
            enter_remove(record).and_then(|_| drain_and_delete(driver, record))
        }
        PnpMinorFunction::QueryId(id_type) => {
            let identity = record.identity();
            let info = match id_type {
                QueryIdType::DeviceId => RequestInformation::Id(identity.device_id().into()),
                QueryIdType::InstanceId => RequestInformation::Id(identity.instance_id().into()),
                QueryIdType::HardwareIds | QueryIdType::CompatibleIds => {
                    RequestInformation::Ids(vec![identity.device_id().into()])
                }
            };
            req.write().information = info;
            Ok(())
        }
        PnpMinorFunction::QueryDeviceRelations(DeviceRelationType::TargetDeviceRelation) => {
            req.write().information = RequestInformation::Relations(vec![record.clone()]);
            Ok(())
        }
        other => Err(other.default_status_for_unhandled()),
    };
    if let Err(e) = result {
        info!("PDO {} {} failed: {}", record.identity().device_id(), minor, e);
    }
    status_of(result)
}
