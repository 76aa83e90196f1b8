//! Process Table
//!
//! A fixed array of process control blocks, allocated once and never
//! destroyed. A process only cycles between ready, busy, blocked and
//! suspended (see [`state`]).
//!
//! # Design
//! - The state word and timeout are atomics so the scheduler can acquire a
//!   process without taking the kernel lock
//! - Registers and the PMP shadow live behind a per-process spin lock that is
//!   only held while copying in or out
//! - Only the hart that holds a process busy (or a monitor holding it
//!   suspended and busy) mutates its registers

pub mod regs;
pub mod state;

use core::sync::atomic::{AtomicU64, Ordering};

use spin::{Mutex, MutexGuard};

use crate::config::PROC_CNT;
use crate::pmp::PmpShadow;

pub use regs::{Reg, RegFile, REG_CNT};
pub use state::{ProcState, StateFlags};

/// Process identifier, `0..PROC_CNT`.
pub type Pid = usize;

/// Saved user context of a process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Context {
    pub regs: RegFile,
    pub pmp: PmpShadow,
}

impl Context {
    pub const fn new() -> Self {
        Self {
            regs: RegFile::new(),
            pmp: PmpShadow::new(),
        }
    }
}

/// Process control block.
#[derive(Debug)]
pub struct Proc {
    state: AtomicU64,
    timeout: AtomicU64,
    context: Mutex<Context>,
}

impl Proc {
    /// A suspended process with an empty context.
    pub const fn new() -> Self {
        Self {
            state: AtomicU64::new(StateFlags::SUSPENDED.bits()),
            timeout: AtomicU64::new(0),
            context: Mutex::new(Context::new()),
        }
    }

    /// Raw state word.
    #[inline]
    pub fn state_word(&self) -> u64 {
        self.state.load(Ordering::Acquire)
    }

    /// Decoded state.
    #[inline]
    pub fn state(&self) -> ProcState {
        ProcState::from_word(self.state_word())
    }

    /// Absolute deadline of the current quantum or blocking wait.
    #[inline]
    pub fn timeout(&self) -> u64 {
        self.timeout.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_timeout(&self, deadline: u64) {
        self.timeout.store(deadline, Ordering::Release);
    }

    /// Lock the register file and PMP shadow.
    #[inline]
    pub fn context(&self) -> MutexGuard<'_, Context> {
        self.context.lock()
    }

    /// Read one register.
    #[inline]
    pub fn reg(&self, reg: Reg) -> u64 {
        self.context.lock().regs[reg]
    }

    /// Write one register.
    #[inline]
    pub fn set_reg(&self, reg: Reg, value: u64) {
        self.context.lock().regs[reg] = value;
    }
}

impl Default for Proc {
    fn default() -> Self {
        Self::new()
    }
}

/// All process control blocks.
#[derive(Debug)]
pub struct ProcTable {
    procs: [Proc; PROC_CNT],
}

impl ProcTable {
    pub const fn new() -> Self {
        const INIT: Proc = Proc::new();
        Self {
            procs: [INIT; PROC_CNT],
        }
    }

    /// Process `pid`. Callers validate `pid` first.
    #[inline]
    pub fn get(&self, pid: Pid) -> &Proc {
        debug_assert!(pid < PROC_CNT);
        &self.procs[pid]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Pid, &Proc)> {
        self.procs.iter().enumerate()
    }
}

impl Default for ProcTable {
    fn default() -> Self {
        Self::new()
    }
}
