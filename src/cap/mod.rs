//! Capability System
//!
//! Every kernel resource a process may use is named by a capability in its
//! slice of the capability table: time slots, memory, PMP regions, monitor
//! rights over other processes, IPC channels and sockets.
//!
//! # Design
//! - Capabilities are plain 64-bit values ([`Capability::to_raw`]); holding
//!   one in your table is the only way to use the resource
//! - Children are carved out of a parent's free range `[mark, end)` and can
//!   only shrink rights ([`derivable`])
//! - Revocation reclaims every descendant into the revoked capability
//!   ([`revocable`]) and is preemptible
//!
//! The operations themselves live on [`crate::kernel::KernelGuard`].

pub mod algebra;
pub mod capability;
mod ops;
pub mod table;

pub use algebra::{derivable, revocable, valid};
pub use capability::{
    tag_block_to_addr, CapType, Capability, ChannelCap, IpcMode, IpcPerm, MemoryCap, MonitorCap,
    PmpCap, Rwx, SocketCap, TimeCap,
};
pub use table::{CapSlot, CapTable};
