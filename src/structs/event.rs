//! Notification event used for every blocking rendezvous in the bus core.
//!
//! Once set, the event stays signaled until `reset`, so a waiter that arrives
//! after the signal returns immediately and a signal can never be lost.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::platform::Platform;

#[derive(Debug)]
pub struct Event {
    signaled: AtomicBool,
}

impl Event {
    pub const fn new() -> Self {
        Self {
            signaled: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn set(&self) {
        self.signaled.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.signaled.store(false, Ordering::Release);
    }

    /// Blocks the caller until the event is signaled, yielding between checks.
    pub fn wait(&self, platform: &dyn Platform) {
        while !self.is_set() {
            platform.yield_now();
        }
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestPlatform;
    use alloc::sync::Arc;
    use std::thread;

    #[test]
    fn late_waiter_sees_signal() {
        let platform = TestPlatform::new();
        let ev = Event::new();
        ev.set();
        ev.wait(&*platform);
        assert!(ev.is_set());
        ev.reset();
        assert!(!ev.is_set());
    }

    #[test]
    fn wait_returns_after_cross_thread_set() {
        let platform = TestPlatform::new();
        let ev = Arc::new(Event::new());
        let setter = {
            let ev = ev.clone();
            thread::spawn(move || ev.set())
        };
        ev.wait(&*platform);
        setter.join().unwrap();
    }
}
