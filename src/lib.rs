//! s3k - Separation Kernel Core for Multi-Hart RISC-V
//!
//! A fixed-size, allocation-free kernel core that partitions time, memory,
//! PMP regions and IPC channels among a static set of processes using
//! capabilities.
//!
//! # Architecture
//! - [`cap`]: capability values, the derivation algebra and the capability
//!   table, with derive/move/delete/revoke on [`kernel::KernelGuard`]
//! - [`proc`]: process control blocks and their lock-free state machine
//! - [`sched`]: per-hart time-slot tables projected from Time capabilities
//! - [`ipc`]: synchronous rendezvous over channels
//! - [`monitor`]: control of other processes through Monitor capabilities
//! - [`syscall`] and [`exception`]: the trap boundary
//!
//! # Embedding
//! The board support code provides a [`platform::Platform`], builds one
//! [`kernel::Kernel`] (usually in a `static`), calls [`kernel::Kernel::init`]
//! with the boot capabilities and then, on every hart, loops over
//! [`kernel::Kernel::next_process`], running the returned process and
//! feeding its traps to [`kernel::Kernel::handle_syscall`] and
//! [`kernel::Kernel::handle_exception`].

#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]

pub mod cap;
pub mod config;
pub mod error;
pub mod exception;
pub mod ipc;
pub mod kernel;
pub mod logger;
pub mod monitor;
pub mod platform;
pub mod pmp;
pub mod proc;
pub mod sched;
pub mod syscall;

#[cfg(test)]
mod testing;

pub use cap::{CapSlot, Capability};
pub use error::{Error, Result};
pub use ipc::{Msg, Next};
pub use kernel::{Kernel, KernelGuard};
pub use platform::{Hart, Platform};
pub use proc::{Pid, Reg};
