//! Process State Machine
//!
//! The state word packs three flags in its low bits and, while blocked, the
//! channel number in bits 32 and up:
//!
//! ```text
//! Ready            0
//! Busy             BUSY
//! Blocked(c)       BLOCKED | c << 32          (| BUSY while still running)
//! Suspended        SUSPENDED                  (| BUSY while a monitor holds it)
//! ```
//!
//! Every transition is a single atomic read-modify-write or compare-and-swap
//! so it is safe from any hart without the kernel lock. `suspend` only sets a
//! flag; unblocking a suspended waiter is finished by whichever hart next
//! observes it.

use core::sync::atomic::Ordering;

use bitflags::bitflags;

use super::{Proc, Reg};
use crate::error::Error;

bitflags! {
    /// Low bits of the state word.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct StateFlags: u64 {
        /// Held by a hart (running, or being edited).
        const BUSY = 1 << 0;
        /// Waiting on an IPC channel.
        const BLOCKED = 1 << 1;
        /// Stopped by a monitor.
        const SUSPENDED = 1 << 2;
    }
}

const FLAG_MASK: u64 = 0xFF;
const CHAN_SHIFT: u32 = 32;

/// Channel number of a process blocked in `sleep`. No socket can name it.
pub const SLEEP_CHAN: u64 = u32::MAX as u64;

/// Decoded view of a state word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcState {
    Ready,
    Busy,
    Blocked { chan: u64, busy: bool },
    Suspended { busy: bool },
}

impl ProcState {
    pub fn from_word(word: u64) -> Self {
        let flags = StateFlags::from_bits_truncate(word & FLAG_MASK);
        let busy = flags.contains(StateFlags::BUSY);
        if flags.contains(StateFlags::SUSPENDED) {
            Self::Suspended { busy }
        } else if flags.contains(StateFlags::BLOCKED) {
            Self::Blocked {
                chan: word >> CHAN_SHIFT,
                busy,
            }
        } else if busy {
            Self::Busy
        } else {
            Self::Ready
        }
    }
}

#[inline]
const fn blocked_word(chan: u64) -> u64 {
    StateFlags::BLOCKED.bits() | chan << CHAN_SHIFT
}

impl Proc {
    /// Take the process for running.
    ///
    /// Succeeds from `Ready`, or from `Blocked` once `now` has reached the
    /// process's timeout; the latter leaves `Timeout` in `t0`.
    pub fn acquire(&self, now: u64) -> bool {
        let expected = self.state.load(Ordering::Acquire);
        let is_ready = expected == 0;
        let is_timeout =
            expected & FLAG_MASK == StateFlags::BLOCKED.bits() && now >= self.timeout();
        if !is_ready && !is_timeout {
            return false;
        }
        let acquired = self
            .state
            .compare_exchange(
                expected,
                StateFlags::BUSY.bits(),
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_ok();
        if acquired && is_timeout && expected >> CHAN_SHIFT != SLEEP_CHAN {
            self.set_reg(Reg::T0, Error::Timeout.code());
        }
        acquired
    }

    /// Give the process back.
    ///
    /// Clears only the busy bit. A process that was suspended while it
    /// blocked becomes plainly suspended here, with `Suspended` in `t0`.
    pub fn release(&self) {
        let prev = self
            .state
            .fetch_and(!StateFlags::BUSY.bits(), Ordering::Release);
        debug_assert!(prev & StateFlags::BUSY.bits() != 0);
        let state = prev & !StateFlags::BUSY.bits();
        if state & FLAG_MASK == (StateFlags::BLOCKED | StateFlags::SUSPENDED).bits() {
            self.cancel_wait(state);
        }
    }

    /// Stop the process. Always succeeds; a blocked waiter is cancelled.
    pub fn suspend(&self) {
        let prev = self
            .state
            .fetch_or(StateFlags::SUSPENDED.bits(), Ordering::Acquire);
        if prev & FLAG_MASK == StateFlags::BLOCKED.bits() {
            self.cancel_wait(prev | StateFlags::SUSPENDED.bits());
        }
    }

    fn cancel_wait(&self, expected: u64) {
        let cancelled = self
            .state
            .compare_exchange(
                expected,
                StateFlags::SUSPENDED.bits(),
                Ordering::AcqRel,
                Ordering::Relaxed,
            )
            .is_ok();
        if cancelled {
            self.set_reg(Reg::T0, Error::Suspended.code());
        }
    }

    /// Clear the suspension and make the process immediately schedulable.
    pub fn resume(&self) {
        self.state
            .fetch_and(!StateFlags::SUSPENDED.bits(), Ordering::Release);
        self.set_timeout(0);
    }

    /// Whether the process is suspended and idle.
    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.state_word() == StateFlags::SUSPENDED.bits()
    }

    /// Take a suspended process for editing (`Suspended -> Suspended|Busy`).
    /// Undo with [`Proc::release`].
    pub fn acquire_suspended(&self) -> bool {
        self.state
            .compare_exchange(
                StateFlags::SUSPENDED.bits(),
                (StateFlags::SUSPENDED | StateFlags::BUSY).bits(),
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// Mark the running process as waiting on `chan`. It stays busy until
    /// the hart releases it.
    pub fn ipc_wait(&self, chan: u64) {
        debug_assert!(self.state_word() & StateFlags::BUSY.bits() != 0);
        self.state.fetch_or(blocked_word(chan), Ordering::AcqRel);
    }

    /// Block the running process until `until`. It stays busy until the
    /// hart releases it.
    pub fn sleep(&self, until: u64) {
        self.set_timeout(until);
        self.ipc_wait(SLEEP_CHAN);
    }

    /// Take a process blocked on exactly `chan` to deliver a message.
    ///
    /// Refused when the receiver's deadline has passed, or when its declared
    /// service time does not fit before `deadline`.
    pub fn ipc_acquire(&self, chan: u64, now: u64, deadline: u64) -> bool {
        let servtime = self.reg(Reg::Servtime);
        if servtime > 0 && now.saturating_add(servtime) >= deadline {
            return false;
        }
        if now >= self.timeout() {
            return false;
        }
        self.state
            .compare_exchange(
                blocked_word(chan),
                StateFlags::BUSY.bits(),
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// Force the state word. Boot only.
    pub(crate) fn reset(&self, state: StateFlags) {
        self.state.store(state.bits(), Ordering::Release);
        self.set_timeout(0);
    }
}
