//! Kernel Error Codes
//!
//! Every core operation returns a [`Result`]; the syscall layer stores the
//! numeric code in the caller's `t0` register. Code `0` means success and is
//! deliberately not an [`Error`] variant.
//!
//! # Propagation
//! - Nothing in the core panics on user input
//! - [`Error::Preempted`] means "no invariant broken, call again"

use core::fmt;

/// Kernel error codes (part of the syscall ABI).
#[repr(u64)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    /// The operand slot holds no capability.
    Empty = 1,
    /// Move/derive source slot is empty.
    SrcEmpty = 2,
    /// Move/derive destination slot is occupied.
    DstOccupied = 3,
    /// The requested child is not derivable from the parent.
    InvalidDerivation = 4,
    /// Capability index out of range.
    InvalidIndex = 5,
    /// Monitor capability missing or pid outside its range.
    InvalidMonitor = 6,
    /// Process id out of range.
    InvalidPid = 7,
    /// Not a PMP capability, or wrong load state.
    InvalidPmp = 8,
    /// PMP slot out of range.
    InvalidSlot = 9,
    /// Socket lacks the permission or role for the operation.
    InvalidSocket = 10,
    /// Target process is not in the required state.
    InvalidState = 11,
    /// Unknown system call number.
    InvalidSyscall = 12,
    /// Register number out of range.
    InvalidRegister = 13,
    /// Capability has the wrong type for the operation.
    InvalidCapability = 14,
    /// No peer waiting on the channel.
    NoReceiver = 15,
    /// Operation stopped early and must be retried.
    Preempted = 16,
    /// IPC target (or caller) is suspended.
    Suspended = 17,
    /// A blocking wait ran past its deadline.
    Timeout = 18,
}

impl Error {
    /// Register value for this error.
    #[inline]
    pub const fn code(self) -> u64 {
        self as u64
    }

    /// Decode a register value. `0` and unknown values yield `None`.
    pub const fn from_code(code: u64) -> Option<Self> {
        Some(match code {
            1 => Self::Empty,
            2 => Self::SrcEmpty,
            3 => Self::DstOccupied,
            4 => Self::InvalidDerivation,
            5 => Self::InvalidIndex,
            6 => Self::InvalidMonitor,
            7 => Self::InvalidPid,
            8 => Self::InvalidPmp,
            9 => Self::InvalidSlot,
            10 => Self::InvalidSocket,
            11 => Self::InvalidState,
            12 => Self::InvalidSyscall,
            13 => Self::InvalidRegister,
            14 => Self::InvalidCapability,
            15 => Self::NoReceiver,
            16 => Self::Preempted,
            17 => Self::Suspended,
            18 => Self::Timeout,
            _ => return None,
        })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::Empty => "capability slot is empty",
            Self::SrcEmpty => "source slot is empty",
            Self::DstOccupied => "destination slot is occupied",
            Self::InvalidDerivation => "invalid derivation",
            Self::InvalidIndex => "invalid capability index",
            Self::InvalidMonitor => "invalid monitor capability",
            Self::InvalidPid => "invalid process id",
            Self::InvalidPmp => "invalid pmp capability",
            Self::InvalidSlot => "invalid pmp slot",
            Self::InvalidSocket => "invalid socket",
            Self::InvalidState => "invalid process state",
            Self::InvalidSyscall => "invalid system call",
            Self::InvalidRegister => "invalid register",
            Self::InvalidCapability => "invalid capability type",
            Self::NoReceiver => "no receiver",
            Self::Preempted => "preempted",
            Self::Suspended => "suspended",
            Self::Timeout => "timeout",
        };
        f.write_str(msg)
    }
}

/// Result type used throughout the kernel core.
pub type Result<T> = core::result::Result<T, Error>;

/// Register value for a unit result: `0` on success.
#[inline]
pub fn code_of(result: Result<()>) -> u64 {
    match result {
        Ok(()) => 0,
        Err(e) => e.code(),
    }
}
