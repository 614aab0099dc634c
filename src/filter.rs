//! Per-device gate that decides whether requests are diverted to the interceptor.
//!
//! Disabling is asynchronous: the gate reports `Pending` until every request
//! admitted while it was `Enabled` has completed, then settles on `Disabled`.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, Ordering};
use log::{error, info, warn};
use strum::Display;

use crate::status::DriverStatus;

#[repr(u8)]
#[derive(Display, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    Enabled,
    Pending,
    Disabled,
}

impl FilterState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => FilterState::Enabled,
            1 => FilterState::Pending,
            _ => FilterState::Disabled,
        }
    }
}

const STATE_SHIFT: u32 = 30;
const COUNT_MASK: u32 = (1 << STATE_SHIFT) - 1;

fn pack(state: FilterState, in_flight: u32) -> u32 {
    ((state as u32) << STATE_SHIFT) | in_flight
}

fn unpack(word: u32) -> (FilterState, u32) {
    (
        FilterState::from_raw((word >> STATE_SHIFT) as u8),
        word & COUNT_MASK,
    )
}

/// State and in-flight count share one word, so `Disabled` is only ever stored
/// by the same update that observes the count at zero.
#[derive(Debug)]
pub struct FilterGate {
    word: AtomicU32,
}

impl FilterGate {
    pub const fn new(initial: FilterState) -> Self {
        Self {
            word: AtomicU32::new((initial as u32) << STATE_SHIFT),
        }
    }

    pub fn get_state(&self) -> FilterState {
        unpack(self.word.load(Ordering::SeqCst)).0
    }

    pub fn set_state(&self, new: FilterState) -> Result<(), DriverStatus> {
        let next = |word: u32| {
            let (state, in_flight) = unpack(word);
            let state = match (new, state) {
                (FilterState::Enabled, _) => FilterState::Enabled,
                (_, FilterState::Disabled) => FilterState::Disabled,
                _ if in_flight == 0 => FilterState::Disabled,
                _ => FilterState::Pending,
            };
            Some(pack(state, in_flight))
        };
        match new {
            FilterState::Pending => {
                warn!("filter: Pending cannot be requested directly");
                Err(DriverStatus::InvalidParameter)
            }
            FilterState::Enabled | FilterState::Disabled => {
                let prev = self
                    .word
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, &next)
                    .unwrap_or_else(|w| w);
                let (state, _) = unpack(next(prev).unwrap_or(prev));
                info!("filter: {}", state);
                Ok(())
            }
        }
    }

    /// Admits a request for interception if the gate is enabled.
    ///
    /// The request counts as in flight for as long as the ticket lives.
    pub fn admit(self: &Arc<Self>) -> Option<FilterTicket> {
        self.word
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |word| {
                match unpack(word) {
                    (FilterState::Enabled, n) if n < COUNT_MASK => Some(word + 1),
                    _ => None,
                }
            })
            .ok()
            .map(|_| FilterTicket { gate: self.clone() })
    }

    pub fn in_flight(&self) -> u32 {
        unpack(self.word.load(Ordering::SeqCst)).1
    }

    fn leave(&self) {
        let left = self
            .word
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |word| {
                match unpack(word) {
                    (_, 0) => None,
                    (FilterState::Pending, 1) => Some(pack(FilterState::Disabled, 0)),
                    (state, n) => Some(pack(state, n - 1)),
                }
            });
        if left.is_err() {
            error!("filter: ticket released with nothing in flight");
        }
    }
}

impl Default for FilterGate {
    fn default() -> Self {
        Self::new(FilterState::Enabled)
    }
}

#[derive(Debug)]
pub struct FilterTicket {
    gate: Arc<FilterGate>,
}

impl Drop for FilterTicket {
    fn drop(&mut self) {
        self.gate.leave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use std::thread;

    #[test]
    fn disable_with_nothing_in_flight_is_immediate() {
        let gate = FilterGate::new(FilterState::Enabled);
        gate.set_state(FilterState::Disabled).unwrap();
        assert_eq!(gate.get_state(), FilterState::Disabled);
    }

    #[test]
    fn disable_waits_for_all_admitted_requests() {
        let gate = Arc::new(FilterGate::new(FilterState::Enabled));
        let mut tickets: Vec<_> = (0..3).map(|_| gate.admit().unwrap()).collect();

        gate.set_state(FilterState::Disabled).unwrap();
        assert_eq!(gate.get_state(), FilterState::Pending);
        assert!(gate.admit().is_none());

        tickets.pop();
        tickets.pop();
        assert_eq!(gate.get_state(), FilterState::Pending);
        tickets.pop();
        assert_eq!(gate.get_state(), FilterState::Disabled);
    }

    #[test]
    fn enable_cancels_pending_disable() {
        let gate = Arc::new(FilterGate::new(FilterState::Enabled));
        let ticket = gate.admit().unwrap();
        gate.set_state(FilterState::Disabled).unwrap();
        gate.set_state(FilterState::Enabled).unwrap();
        drop(ticket);
        assert_eq!(gate.get_state(), FilterState::Enabled);
        assert!(gate.admit().is_some());
    }

    #[test]
    fn pending_is_not_a_request() {
        let gate = FilterGate::new(FilterState::Disabled);
        assert_eq!(
            gate.set_state(FilterState::Pending),
            Err(DriverStatus::InvalidParameter)
        );
        assert_eq!(gate.get_state(), FilterState::Disabled);
    }

    #[test]
    fn concurrent_admission_settles_disabled() {
        let gate = Arc::new(FilterGate::new(FilterState::Enabled));
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let gate = gate.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        drop(gate.admit());
                    }
                })
            })
            .collect();
        gate.set_state(FilterState::Disabled).unwrap();
        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(gate.in_flight(), 0);
        assert_eq!(gate.get_state(), FilterState::Disabled);
    }
    #[test]
    fn held_ticket_never_sees_disabled() {
        let gate = Arc::new(FilterGate::new(FilterState::Enabled));
        let togglers: Vec<_> = (0..2)
            .map(|_| {
                let gate = gate.clone();
                thread::spawn(move || {
                    for _ in 0..2000 {
                        gate.set_state(FilterState::Disabled).unwrap();
                        gate.set_state(FilterState::Enabled).unwrap();
                    }
                })
            })
            .collect();
        let admitters: Vec<_> = (0..4)
            .map(|_| {
                let gate = gate.clone();
                thread::spawn(move || {
                    for _ in 0..5000 {
                        if let Some(ticket) = gate.admit() {
                            assert_ne!(gate.get_state(), FilterState::Disabled);
                            thread::yield_now();
                            assert_ne!(gate.get_state(), FilterState::Disabled);
                            drop(ticket);
                        }
                    }
                })
            })
            .collect();
        for t in togglers.into_iter().chain(admitters) {
            t.join().unwrap();
        }
        gate.set_state(FilterState::Disabled).unwrap();
        assert_eq!(gate.in_flight(), 0);
        assert_eq!(gate.get_state(), FilterState::Disabled);
    }
}
