//! Build-time Kernel Configuration
//!
//! Every kernel table is a fixed-size array sized by the constants below.
//! Nothing grows at runtime and nothing is persisted across reboot.

/// Number of processes.
pub const PROC_CNT: usize = 8;

/// Number of capability slots per process.
pub const CAP_CNT: usize = 32;

/// Number of IPC channels.
pub const CHAN_CNT: usize = 16;

/// Number of harts running the kernel.
pub const HART_CNT: usize = 4;

/// Number of PMP entries per process.
pub const PMP_CNT: usize = 8;

/// Number of scheduling slots per period (one major frame).
pub const SLOT_CNT: usize = 64;

/// Real-time clock frequency in ticks per second.
pub const RTC_HZ: u64 = 1_000_000;

/// Length of one scheduling slot in clock ticks.
pub const SLOT_LEN: u64 = RTC_HZ / SLOT_CNT as u64 / 100;

/// Ticks reserved at the start of every slot for the scheduler itself.
pub const SCHED_TIME: u64 = SLOT_LEN / 10;

/// Log2 of the smallest memory block a Memory capability can describe (4 KiB).
pub const MIN_BLOCK_SIZE: u32 = 12;

/// Log2 of the span covered by one Memory capability tag (128 MiB).
pub const MAX_BLOCK_SIZE: u32 = 27;

/// Total number of capability table entries.
pub const CTABLE_SIZE: usize = PROC_CNT * CAP_CNT;

const _: () = assert!(CTABLE_SIZE <= u16::MAX as usize);
const _: () = assert!(SLOT_CNT <= u16::MAX as usize);
const _: () = assert!(PROC_CNT <= u8::MAX as usize);
const _: () = assert!(SCHED_TIME < SLOT_LEN);
