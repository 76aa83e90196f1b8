//! Time-Slot Scheduler
//!
//! Each hart owns a table mapping every slot of the major frame to the
//! process that may run in it and the remaining length of that process's
//! contiguous run. The table is a cached projection of the Time capabilities:
//! only capability operations on Time capabilities call [`Schedule::update`]
//! and [`Schedule::delete`].
//!
//! # Choosing the next process
//! The current slot is derived from the real-time clock. If the slot is
//! owned and its process can be acquired, that process runs until the end of
//! its run; otherwise the hart tries the next slot, idling until it begins.
//!
//! When one process owns the same slot on several harts, only one of them
//! runs it: the hart with the longest remaining run, ties going to the lowest
//! hart id.

use log::trace;
use spin::RwLock;

use crate::config::{HART_CNT, SCHED_TIME, SLOT_CNT, SLOT_LEN};
use crate::platform::{Hart, Platform};
use crate::proc::{Pid, ProcTable};

/// Owner and remaining run length of one slot. `len == 0` means unowned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SlotInfo {
    pub pid: u8,
    pub len: u8,
}

impl SlotInfo {
    const EMPTY: Self = Self { pid: 0, len: 0 };
}

/// Per-hart slot tables.
///
/// Time capability edits take the write lock; harts picking a process take
/// the read lock.
#[derive(Debug)]
pub struct Schedule {
    slots: RwLock<[[SlotInfo; SLOT_CNT]; HART_CNT]>,
}

impl Schedule {
    /// A schedule with every slot unowned.
    pub const fn new() -> Self {
        Self {
            slots: RwLock::new([[SlotInfo::EMPTY; SLOT_CNT]; HART_CNT]),
        }
    }

    /// Let `pid` run on `hart` in slots `[from, to)`, as part of a run ending
    /// at `end`.
    pub fn update(&self, pid: Pid, end: usize, hart: Hart, from: usize, to: usize) {
        trace!("sched update pid={pid} end={end} hart={hart} from={from} to={to}");
        debug_assert!(from <= to && to <= end && end <= SLOT_CNT);
        let mut slots = self.slots.write();
        for (i, slot) in slots[hart][from..to].iter_mut().enumerate() {
            *slot = SlotInfo {
                pid: pid as u8,
                len: (end - from - i) as u8,
            };
        }
    }

    /// Clear `hart`'s slots `[from, to)`.
    pub fn delete(&self, hart: Hart, from: usize, to: usize) {
        trace!("sched delete hart={hart} from={from} to={to}");
        debug_assert!(from <= to && to <= SLOT_CNT);
        let mut slots = self.slots.write();
        slots[hart][from..to].fill(SlotInfo::EMPTY);
    }

    /// Slot info of `hart` at absolute slot number `slot`.
    #[inline]
    pub fn slot_info(&self, hart: Hart, slot: u64) -> SlotInfo {
        self.slots.read()[hart][(slot % SLOT_CNT as u64) as usize]
    }

    /// Process that `hart` should run in absolute slot `slot`, if any and if
    /// it can be acquired. On success the process's timeout is set to the end
    /// of its run.
    pub fn fetch(&self, procs: &ProcTable, hart: Hart, slot: u64, now: u64) -> Option<Pid> {
        let slots = self.slots.read();
        let column = (slot % SLOT_CNT as u64) as usize;
        let info = slots[hart][column];
        if info.len == 0 {
            return None;
        }

        let shadowed = (0..HART_CNT).filter(|&other| other != hart).any(|other| {
            let other_info = slots[other][column];
            other_info.pid == info.pid
                && if other < hart {
                    info.len <= other_info.len
                } else {
                    info.len < other_info.len
                }
        });
        if shadowed {
            return None;
        }

        let pid = info.pid as Pid;
        let proc = procs.get(pid);
        if !proc.acquire(now) {
            return None;
        }
        proc.set_timeout((slot + info.len as u64) * SLOT_LEN);
        trace!("sched hart={hart} pid={pid} slot={column}");
        Some(pid)
    }

    /// Pick the next process for `hart`, idling until one is runnable.
    ///
    /// Programs the hart's deadline to leave `SCHED_TIME` ticks before the
    /// end of the chosen run for the next scheduling decision.
    pub fn next<P: Platform>(&self, platform: &P, procs: &ProcTable, hart: Hart) -> Pid {
        let mut slot = (platform.time() + SCHED_TIME) / SLOT_LEN;
        let pid = loop {
            while platform.time() < slot * SLOT_LEN {
                platform.wait_for_interrupt(hart);
            }
            if let Some(pid) = self.fetch(procs, hart, slot, platform.time()) {
                break pid;
            }
            slot += 1;
        };
        platform.set_timeout(hart, procs.get(pid).timeout() - SCHED_TIME);
        pid
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}
