use alloc::string::String;
use alloc::sync::Arc;
use bitflags::bitflags;
use core::sync::atomic::{AtomicBool, Ordering};
use log::{error, info, trace, warn};
use spin::{Mutex, Once};
use strum::Display;

use crate::bus::arbiter::{arbitrate, read_active_selection, StackIdentityQuery};
use crate::platform::Platform;
use crate::pnp::device::{
    DeviceExt, DeviceFlags, DeviceIdentity, DeviceRecord, DeviceRole, FdoExt, PdoExt,
};
use crate::pnp::dispatch;
use crate::pnp::manager::DeviceRegistry;
use crate::pnp::request::RequestHandle;
use crate::registry::{parameters_key, status_key, ConfigStore};
use crate::status::DriverStatus;
use crate::system::processors::ProcessorTable;
use crate::system::topology::{ProcessorChange, TopologySync};
use crate::version::{self, Version, VERSION};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AttachFlags: u32 {
        /// The system booted in safe mode; stay completely inert.
        const SAFE_BOOT = 1 << 0;
    }
}

#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverMode {
    Operational,
    /// Peer version mismatch. Loaded, but attaches to nothing until reboot.
    Degraded,
    SafeBoot,
}

/// Takes over non-PnP requests admitted by an FDO's filter gate.
///
/// Returning `Pending` transfers ownership; the interceptor must eventually call
/// `complete_request`.
pub trait Interceptor: Send + Sync {
    fn intercept(&self, driver: &BusDriver, record: &Arc<DeviceRecord>, request: &RequestHandle) -> DriverStatus;
}

/// Driver-wide context. Created once by `entry`, threaded through every call.
pub struct BusDriver {
    service: String,
    platform: Arc<dyn Platform>,
    config: Arc<dyn ConfigStore>,
    mode: DriverMode,
    devices: DeviceRegistry,
    topology: Mutex<Option<Arc<TopologySync>>>,
    interceptor: Once<Arc<dyn Interceptor>>,
    active_claimed: AtomicBool,
}

impl BusDriver {
    pub fn entry(
        platform: Arc<dyn Platform>,
        config: Arc<dyn ConfigStore>,
        service: &str,
        flags: AttachFlags,
        peer: Version,
    ) -> Result<Self, DriverStatus> {
        trace!("====>");
        let mut driver = Self {
            service: service.into(),
            platform,
            config,
            mode: DriverMode::Operational,
            devices: DeviceRegistry::new(),
            topology: Mutex::new(None),
            interceptor: Once::new(),
            active_claimed: AtomicBool::new(false),
        };

        if flags.contains(AttachFlags::SAFE_BOOT) {
            info!("{}: safe boot, not initializing", service);
            driver.mode = DriverMode::SafeBoot;
            trace!("<====");
            return Ok(driver);
        }

        info!("{} {}", service, VERSION);

        let parameters = parameters_key(service);
        if !driver.config.key_exists(&parameters) {
            error!("{}: missing {}", service, parameters);
            return Err(DriverStatus::NotFound);
        }

        let status = status_key(service);
        if !driver.config.key_exists(&status) {
            driver.config.create_key(&status).map_err(DriverStatus::from)?;
        }

        if let Err(e) = version::touch(service, peer, &*driver.config, &status) {
            warn!("{}: running degraded ({})", service, e);
            driver.mode = DriverMode::Degraded;
        }

        trace!("<====");
        Ok(driver)
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn mode(&self) -> DriverMode {
        self.mode
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    pub fn config(&self) -> &Arc<dyn ConfigStore> {
        &self.config
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn needs_reboot(&self) -> bool {
        version::needs_reboot(&*self.config, &status_key(&self.service))
    }

    pub fn set_interceptor(&self, interceptor: Arc<dyn Interceptor>) {
        self.interceptor.call_once(|| interceptor);
    }

    pub fn interceptor(&self) -> Option<&Arc<dyn Interceptor>> {
        self.interceptor.get()
    }

    /// Builds the processor table from the firmware's processor entries and the processors already online.
    pub fn attach_topology(&self, firmware: ProcessorTable, online: u32) -> Result<Arc<TopologySync>, DriverStatus> {
        if self.mode == DriverMode::SafeBoot {
            return Err(DriverStatus::NotSupported);
        }
        let mut slot = self.topology.lock();
        if slot.is_some() {
            return Err(DriverStatus::AlreadyExists);
        }
        let topology = TopologySync::new(self.platform.clone(), firmware);
        topology.register_existing(online)?;
        *slot = Some(topology.clone());
        Ok(topology)
    }

    pub fn topology(&self) -> Option<Arc<TopologySync>> {
        self.topology.lock().clone()
    }

    pub fn processor_change(&self, index: u32, change: ProcessorChange) -> Result<(), DriverStatus> {
        match self.topology() {
            Some(topology) => topology.processor_change(index, change),
            None => Err(DriverStatus::InvalidState),
        }
    }

    /// Registers a PDO handed to us by the parent bus.
    pub fn create_pdo(&self, identity: DeviceIdentity) -> Result<Arc<DeviceRecord>, DriverStatus> {
        let pdo = self
            .devices
            .register(identity, DeviceExt::Physical(PdoExt::default()))?;
        pdo.clear_flags(DeviceFlags::INITIALIZING);
        Ok(pdo)
    }

    /// Attaches an FDO over `pdo`. `Ok(None)` means the driver declined to attach.
    pub fn add_device(&self, pdo: &Arc<DeviceRecord>) -> Result<Option<Arc<DeviceRecord>>, DriverStatus> {
        trace!("====>");
        if self.mode != DriverMode::Operational {
            info!("{}: {}, ignoring {}", self.service, self.mode, pdo.identity().device_id());
            return Ok(None);
        }
        if pdo.role() != DeviceRole::Physical {
            return Err(DriverStatus::InvalidParameter);
        }

        let selection = read_active_selection(&*self.config, &parameters_key(&self.service))?;
        let query = StackIdentityQuery::new(self);
        let matched = arbitrate(selection.as_ref(), &query, pdo)?;

        let active = matched && !self.active_claimed.swap(true, Ordering::AcqRel);
        if matched && !active {
            warn!(
                "{} matches the active selection but an active FDO already exists",
                pdo.identity().device_id()
            );
        }

        let fdo = self.devices.register(
            pdo.identity().clone(),
            DeviceExt::Functional(FdoExt::new(pdo.clone(), active)),
        );
        let fdo = match fdo {
            Ok(fdo) => fdo,
            Err(e) => {
                if active {
                    self.active_claimed.store(false, Ordering::Release);
                }
                return Err(e);
            }
        };
        fdo.clear_flags(DeviceFlags::INITIALIZING);

        info!(
            "{}\\{}: {} FDO",
            pdo.identity().device_id(),
            pdo.identity().instance_id(),
            if active { "ACTIVE" } else { "INACTIVE" }
        );
        trace!("<====");
        Ok(Some(fdo))
    }

    /// Enumerates a child PDO on an active bus FDO.
    pub fn add_child(&self, fdo: &Arc<DeviceRecord>, identity: DeviceIdentity) -> Result<Arc<DeviceRecord>, DriverStatus> {
        let ext = fdo.as_fdo().ok_or(DriverStatus::InvalidParameter)?;
        if !ext.active {
            return Err(DriverStatus::NotSupported);
        }
        let child = self.devices.register(
            identity,
            DeviceExt::Physical(PdoExt {
                parent: Some(Arc::downgrade(fdo)),
            }),
        )?;
        child.clear_flags(DeviceFlags::INITIALIZING);
        ext.children.write().push(child.clone());
        Ok(child)
    }

    pub fn dispatch(&self, record: &Arc<DeviceRecord>, request: &RequestHandle) -> DriverStatus {
        dispatch::dispatch(self, record, request)
    }

    /// Refuses while any device record is still alive.
    pub fn unload(&self) -> Result<(), DriverStatus> {
        trace!("====>");
        if !self.devices.is_empty() {
            error!("{}: {} device(s) still present", self.service, self.devices.len());
            return Err(DriverStatus::Busy);
        }
        self.topology.lock().take();
        trace!("<====");
        Ok(())
    }
}
