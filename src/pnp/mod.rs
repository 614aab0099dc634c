pub mod device;
pub mod dispatch;
pub mod fdo;
pub mod manager;
pub mod pdo;
pub mod request;
pub mod state;

use strum::{Display, IntoStaticStr};

use crate::pnp::state::{DevicePowerState, SystemPowerState};
use crate::status::DriverStatus;

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DeviceRelationType {
    BusRelations,
    EjectionRelations,
    RemovalRelations,
    TargetDeviceRelation,
    PowerRelations,
}

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QueryIdType {
    DeviceId,
    HardwareIds,
    CompatibleIds,
    InstanceId,
}

#[derive(Display, IntoStaticStr, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PnpMinorFunction {
    StartDevice,
    QueryStopDevice,
    CancelStopDevice,
    StopDevice,
    QueryRemoveDevice,
    CancelRemoveDevice,
    RemoveDevice,
    SurpriseRemoval,
    QueryId(QueryIdType),
    QueryDeviceRelations(DeviceRelationType),
}

impl PnpMinorFunction {
    pub fn default_status_for_unhandled(&self) -> DriverStatus {
        match self {
            Self::QueryId(_) | Self::QueryDeviceRelations(_) => DriverStatus::NotSupported,
            _ => DriverStatus::Success,
        }
    }
}

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerRequest {
    SetSystem(SystemPowerState),
    SetDevice(DevicePowerState),
}
