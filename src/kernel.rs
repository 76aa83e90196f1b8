//! Kernel Instance
//!
//! [`Kernel`] owns every kernel-global table. The embedding creates one,
//! usually in a `static`, and every hart calls into it.
//!
//! # Locking
//! - The capability table and the channel registry sit behind one spin lock.
//!   All capability, IPC and monitor operations run on a [`KernelGuard`]
//! - Taking the lock is preemption-checked: a hart whose timer fires while
//!   it waits gives up with [`Error::Preempted`]
//! - Process states are atomics and the schedule has its own reader/writer
//!   lock, so the scheduler never needs the kernel lock

use core::hint::spin_loop;

use log::{debug, info};
use spin::{Mutex, MutexGuard};

use crate::cap::{CapSlot, CapTable, Capability};
use crate::config::{CAP_CNT, CHAN_CNT, HART_CNT, PROC_CNT, SLOT_CNT};
use crate::error::{Error, Result};
use crate::ipc::Channels;
use crate::platform::{Hart, Platform};
use crate::proc::{Pid, Proc, ProcTable, StateFlags};
use crate::sched::Schedule;

/// State guarded by the kernel lock.
#[derive(Debug)]
pub struct CapState {
    pub(crate) table: CapTable,
    pub(crate) channels: Channels,
}

impl CapState {
    const fn new() -> Self {
        Self {
            table: CapTable::new(),
            channels: Channels::new(),
        }
    }
}

/// The kernel: process table, schedule and the locked capability state.
pub struct Kernel<P: Platform> {
    platform: P,
    procs: ProcTable,
    schedule: Schedule,
    state: Mutex<CapState>,
}

impl<P: Platform> Kernel<P> {
    /// A kernel with empty tables and every process suspended.
    pub const fn new(platform: P) -> Self {
        Self {
            platform,
            procs: ProcTable::new(),
            schedule: Schedule::new(),
            state: Mutex::new(CapState::new()),
        }
    }

    #[inline]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    #[inline]
    pub fn procs(&self) -> &ProcTable {
        &self.procs
    }

    #[inline]
    pub fn proc(&self, pid: Pid) -> &Proc {
        self.procs.get(pid)
    }

    #[inline]
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Install the boot capabilities in process 0's slots `0..` and make
    /// process 0 the only runnable process.
    ///
    /// Each boot capability is the root of its own lineage. Time
    /// capabilities are entered into the schedule.
    pub fn init(&self, boot_caps: &[Capability]) -> Result<()> {
        if boot_caps.len() > CAP_CNT {
            return Err(Error::InvalidIndex);
        }
        if !boot_caps.iter().all(is_sane_root) {
            return Err(Error::InvalidCapability);
        }

        let mut state = self.state.lock();
        for (idx, cap) in boot_caps.iter().enumerate() {
            let slot = CapSlot::new(0, idx).ok_or(Error::InvalidIndex)?;
            state.table.insert_root(slot, *cap);
            if let Capability::Time(time) = cap {
                self.schedule.update(
                    0,
                    time.end as usize,
                    time.hart as usize,
                    time.mark as usize,
                    time.end as usize,
                );
            }
            debug!("boot cap {idx}: {cap}");
        }

        for (pid, proc) in self.procs.iter() {
            if pid == 0 {
                proc.reset(StateFlags::empty());
            } else {
                proc.reset(StateFlags::SUSPENDED);
            }
        }
        info!(
            "kernel initialised: {} boot capabilities, {PROC_CNT} processes",
            boot_caps.len()
        );
        Ok(())
    }

    /// Take the kernel lock on behalf of `hart`.
    ///
    /// Fails with `Preempted` if the hart's timer interrupt becomes pending
    /// while waiting.
    pub fn lock(&self, hart: Hart) -> Result<KernelGuard<'_, P>> {
        loop {
            if let Some(state) = self.state.try_lock() {
                return Ok(KernelGuard {
                    kernel: self,
                    hart,
                    state,
                });
            }
            if self.platform.preempt_pending(hart) {
                return Err(Error::Preempted);
            }
            spin_loop();
        }
    }

    /// Pick the next process for `hart`, idling until one is runnable.
    pub fn next_process(&self, hart: Hart) -> Pid {
        self.schedule.next(&self.platform, &self.procs, hart)
    }
}

fn is_sane_root(cap: &Capability) -> bool {
    match cap {
        Capability::None => false,
        Capability::Time(c) => {
            (c.hart as usize) < HART_CNT
                && c.begin <= c.mark
                && c.mark <= c.end
                && c.end as usize <= SLOT_CNT
        }
        Capability::Memory(c) => c.begin <= c.mark && c.mark <= c.end,
        Capability::Pmp(c) => !c.used,
        Capability::Monitor(c) => {
            c.begin <= c.mark && c.mark <= c.end && c.end as usize <= PROC_CNT
        }
        Capability::Channel(c) => {
            c.begin <= c.mark && c.mark <= c.end && c.end as usize <= CHAN_CNT
        }
        Capability::Socket(c) => (c.chan as usize) < CHAN_CNT,
    }
}

/// Exclusive access to the capability table and channel registry.
pub struct KernelGuard<'a, P: Platform> {
    pub(crate) kernel: &'a Kernel<P>,
    pub(crate) hart: Hart,
    pub(crate) state: MutexGuard<'a, CapState>,
}

impl<'a, P: Platform> KernelGuard<'a, P> {
    /// The hart holding the lock.
    #[inline]
    pub fn hart(&self) -> Hart {
        self.hart
    }

    #[inline]
    pub fn kernel(&self) -> &'a Kernel<P> {
        self.kernel
    }

    #[inline]
    pub fn table(&self) -> &CapTable {
        &self.state.table
    }

    #[inline]
    pub fn channels(&self) -> &Channels {
        &self.state.channels
    }

    /// Whether the holding hart should give up the lock soon.
    #[inline]
    pub(crate) fn preempted(&self) -> bool {
        self.kernel.platform.preempt_pending(self.hart)
    }
}
