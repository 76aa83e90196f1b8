//! Host-side test platform.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::config::HART_CNT;
use crate::platform::{Hart, Platform};

/// A manually driven clock. Idling a hart advances time by one tick.
pub struct MockPlatform {
    time: AtomicU64,
    timeouts: [AtomicU64; HART_CNT],
    forced: [AtomicBool; HART_CNT],
}

impl MockPlatform {
    /// Time zero, no deadlines programmed.
    pub fn new() -> Self {
        Self {
            time: AtomicU64::new(0),
            timeouts: core::array::from_fn(|_| AtomicU64::new(u64::MAX)),
            forced: core::array::from_fn(|_| AtomicBool::new(false)),
        }
    }

    pub fn set_time(&self, time: u64) {
        self.time.store(time, Ordering::SeqCst);
    }

    /// Raise (or clear) a pending timer interrupt on `hart` regardless of
    /// its deadline.
    pub fn force_preempt(&self, hart: Hart, pending: bool) {
        self.forced[hart].store(pending, Ordering::SeqCst);
    }
}

impl Platform for MockPlatform {
    fn time(&self) -> u64 {
        self.time.load(Ordering::SeqCst)
    }

    fn timeout(&self, hart: Hart) -> u64 {
        self.timeouts[hart].load(Ordering::SeqCst)
    }

    fn set_timeout(&self, hart: Hart, deadline: u64) {
        self.timeouts[hart].store(deadline, Ordering::SeqCst);
    }

    fn preempt_pending(&self, hart: Hart) -> bool {
        self.forced[hart].load(Ordering::SeqCst) || self.time() >= self.timeout(hart)
    }

    fn wait_for_interrupt(&self, _hart: Hart) {
        self.time.fetch_add(1, Ordering::SeqCst);
    }
}
