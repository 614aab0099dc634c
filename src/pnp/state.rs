use log::error;
use strum::{Display, IntoStaticStr};

use crate::status::DriverStatus;

#[repr(u8)]
#[derive(Display, IntoStaticStr, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PnpState {
    Added,
    StartPending,
    Started,
    StopPending,
    Stopped,
    RemovePending,
    SurpriseRemovePending,
    Removed,
    Deleted,
}

impl PnpState {
    pub fn can_transition_to(self, to: PnpState) -> bool {
        use PnpState::*;
        matches!(
            (self, to),
            (Added, StartPending)
                | (Added, RemovePending)
                | (StartPending, Started)
                | (Started, StopPending)
                | (Started, RemovePending)
                | (Started, SurpriseRemovePending)
                | (StopPending, Stopped)
                | (StopPending, SurpriseRemovePending)
                | (Stopped, StartPending)
                | (Stopped, RemovePending)
                | (Stopped, SurpriseRemovePending)
                | (RemovePending, Removed)
                | (RemovePending, SurpriseRemovePending)
                | (SurpriseRemovePending, Removed)
                | (SurpriseRemovePending, Deleted)
                | (Removed, Deleted)
        )
    }

    /// States a rollback may leave: the query phases of start, stop and remove.
    pub fn is_revocable(self) -> bool {
        matches!(
            self,
            PnpState::StartPending | PnpState::StopPending | PnpState::RemovePending
        )
    }
}

fn invalid_transition(from: PnpState, to: PnpState) -> DriverStatus {
    error!("illegal PnP transition {} -> {}", from, to);
    if cfg!(all(debug_assertions, not(test))) {
        panic!("illegal PnP transition {} -> {}", from, to);
    }
    DriverStatus::InvalidState
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PnpStateMachine {
    current: PnpState,
    previous: PnpState,
}

impl PnpStateMachine {
    pub const fn new() -> Self {
        Self {
            current: PnpState::Added,
            previous: PnpState::Added,
        }
    }

    #[inline]
    pub fn current(&self) -> PnpState {
        self.current
    }

    #[inline]
    pub fn previous(&self) -> PnpState {
        self.previous
    }

    pub fn transition(&mut self, to: PnpState) -> Result<(), DriverStatus> {
        if !self.current.can_transition_to(to) {
            return Err(invalid_transition(self.current, to));
        }
        self.previous = self.current;
        self.current = to;
        Ok(())
    }

    /// One-step rollback of a failed start or a cancelled stop/remove.
    pub fn restore_previous(&mut self) -> Result<(), DriverStatus> {
        if !self.current.is_revocable() {
            return Err(invalid_transition(self.current, self.previous));
        }
        self.current = self.previous;
        Ok(())
    }
}

impl Default for PnpStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[repr(u8)]
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemPowerState {
    Unspecified,
    Working,
    Sleeping1,
    Sleeping2,
    Sleeping3,
    Hibernate,
    Shutdown,
}

#[repr(u8)]
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePowerState {
    Unspecified,
    D0,
    D1,
    D2,
    D3,
}

/// System and device power, tracked next to (not inside) the PnP state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerState {
    pub system: SystemPowerState,
    pub device: DevicePowerState,
}

impl PowerState {
    pub const fn working() -> Self {
        Self {
            system: SystemPowerState::Working,
            device: DevicePowerState::D0,
        }
    }
}
