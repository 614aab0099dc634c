//! Drain-then-destroy guard for device records.
//!
//! The count starts with a construction bias of one. `begin_drain` marks the lock
//! as removing and drops the bias, so the count can only reach zero once draining
//! has started and every acquired reference has been released.

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use log::error;

use crate::platform::Platform;
use crate::status::DriverStatus;
use crate::structs::event::Event;

const BIAS: u32 = 1;

pub struct RemoveLock {
    count: AtomicU32,
    removing: AtomicBool,
    drained: Event,
}

impl RemoveLock {
    pub const fn new() -> Self {
        Self {
            count: AtomicU32::new(BIAS),
            removing: AtomicBool::new(false),
            drained: Event::new(),
        }
    }

    /// Takes a reference. Fails once draining has started.
    pub fn acquire(&self) -> Result<(), DriverStatus> {
        if self.removing.load(Ordering::Acquire) {
            return Err(DriverStatus::DeletePending);
        }
        self.count.fetch_add(1, Ordering::AcqRel);
        if self.removing.load(Ordering::Acquire) {
            self.release();
            return Err(DriverStatus::DeletePending);
        }
        Ok(())
    }

    pub fn release(&self) {
        match self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1))
        {
            Ok(1) => self.drained.set(),
            Ok(_) => {}
            Err(_) => {
                error!("remove lock released more times than acquired");
                debug_assert!(false, "remove lock underflow");
            }
        }
    }

    /// Sets the draining flag and blocks until every outstanding reference is released.
    ///
    /// The caller must not hold a reference of its own. A second caller simply waits.
    pub fn begin_drain(&self, platform: &dyn Platform) {
        if !self.removing.swap(true, Ordering::AcqRel) {
            self.release();
        }
        self.drained.wait(platform);
    }

    pub fn is_draining(&self) -> bool {
        self.removing.load(Ordering::Acquire)
    }

    /// Latched: a late `acquire` that backs out never makes a drained lock look busy.
    pub fn is_drained(&self) -> bool {
        self.is_draining() && self.drained.is_set()
    }

    /// References currently held, not counting the construction bias.
    pub fn outstanding(&self) -> u32 {
        let count = self.count.load(Ordering::Acquire);
        if self.is_draining() {
            count
        } else {
            count.saturating_sub(BIAS)
        }
    }
}

impl fmt::Debug for RemoveLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoveLock")
            .field("outstanding", &self.outstanding())
            .field("draining", &self.is_draining())
            .finish()
    }
}

impl Default for RemoveLock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestPlatform;
    use alloc::sync::Arc;
    use core::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn acquire_fails_once_draining() {
        let platform = TestPlatform::new();
        let lock = RemoveLock::new();
        lock.acquire().unwrap();
        lock.acquire().unwrap();
        assert_eq!(lock.outstanding(), 2);
        lock.release();
        lock.release();
        lock.begin_drain(&*platform);
        assert!(lock.is_drained());
        assert_eq!(lock.acquire(), Err(DriverStatus::DeletePending));
        assert!(lock.is_drained());
    }

    #[test]
    fn drain_waits_for_in_flight_release() {
        let platform = TestPlatform::new();
        let lock = Arc::new(RemoveLock::new());
        let released = Arc::new(AtomicBool::new(false));
        lock.acquire().unwrap();

        let worker = {
            let lock = lock.clone();
            let released = released.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                released.store(true, Ordering::SeqCst);
                lock.release();
            })
        };

        lock.begin_drain(&*platform);
        assert!(released.load(Ordering::SeqCst));
        assert!(lock.is_drained());
        worker.join().unwrap();
    }

    #[test]
    fn many_contexts_never_go_negative() {
        let platform = TestPlatform::new();
        let lock = Arc::new(RemoveLock::new());
        let workers: alloc::vec::Vec<_> = (0..8)
            .map(|_| {
                let lock = lock.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        if lock.acquire().is_ok() {
                            lock.release();
                        }
                    }
                })
            })
            .collect();
        lock.begin_drain(&*platform);
        for w in workers {
            w.join().unwrap();
        }
        assert!(lock.is_drained());
        assert_eq!(lock.outstanding(), 0);
    }
}
