use core::fmt;
use log::{error, info};

use crate::registry::ConfigStore;
use crate::status::{Data, DriverStatus};

pub const NEED_REBOOT: &str = "NeedReboot";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
    pub build: u32,
}

const fn parse_u32(s: &str) -> u32 {
    let bytes = s.as_bytes();
    let mut value = 0u32;
    let mut i = 0;
    while i < bytes.len() {
        value = value * 10 + (bytes[i] - b'0') as u32;
        i += 1;
    }
    value
}

/// Version of this bus core; peers built from a different tree must not mix with it.
pub const VERSION: Version = Version {
    major: parse_u32(env!("CARGO_PKG_VERSION_MAJOR")),
    minor: parse_u32(env!("CARGO_PKG_VERSION_MINOR")),
    micro: parse_u32(env!("CARGO_PKG_VERSION_PATCH")),
    build: 0,
};

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.micro, self.build)
    }
}

/// Checks a peer module against our own version.
///
/// On mismatch the reboot flag is written under `status_key` and the caller
/// gets `IncompatibleVersion`.
pub fn touch(
    module: &str,
    peer: Version,
    config: &dyn ConfigStore,
    status_key: &str,
) -> Result<(), DriverStatus> {
    if peer != VERSION {
        info!(
            "MODULE '{}' ({}) NOT COMPATIBLE WITH {} (REBOOT REQUIRED)",
            module, peer, VERSION
        );
        request_reboot(config, status_key);
        return Err(DriverStatus::IncompatibleVersion);
    }
    Ok(())
}

pub fn request_reboot(config: &dyn ConfigStore, status_key: &str) {
    if let Err(e) = config.set_value(status_key, NEED_REBOOT, Data::U32(1)) {
        error!("failed to flag reboot under {}: {:?}", status_key, e);
    }
}

pub fn needs_reboot(config: &dyn ConfigStore, status_key: &str) -> bool {
    matches!(
        config.get_value(status_key, NEED_REBOOT).and_then(|d| d.as_u32()),
        Ok(v) if v != 0
    )
}
