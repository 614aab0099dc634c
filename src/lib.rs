#![no_std]

extern crate alloc;
#[cfg(test)]
extern crate std;

pub mod bus;
pub mod filter;
pub mod platform;
pub mod pnp;
pub mod registry;
pub mod status;
pub mod structs;
pub mod system;
pub mod version;

#[cfg(test)]
mod testing;

pub use bus::driver::{AttachFlags, BusDriver, DriverMode, Interceptor};
pub use filter::{FilterGate, FilterState};
pub use platform::{Job, Platform};
pub use pnp::device::{DeviceIdentity, DeviceRecord, DeviceRole};
pub use pnp::request::{complete_request, Request, RequestHandle, RequestKind};
pub use pnp::state::PnpState;
pub use registry::{ConfigStore, Registry};
pub use status::DriverStatus;
pub use system::topology::{ProcessorChange, TopologySync};
