//! Platform Boundary
//!
//! The kernel core never touches timer or interrupt hardware directly. The
//! embedding provides a [`Platform`] that exposes the monotonic clock, the
//! per-hart deadline register and the machine-timer-pending bit.

/// Hart (hardware thread) index, `0..HART_CNT`.
pub type Hart = usize;

/// Clock and timer services consumed by the kernel core.
pub trait Platform: Sync {
    /// Current value of the monotonic real-time clock.
    fn time(&self) -> u64;

    /// Deadline currently programmed for `hart`.
    fn timeout(&self, hart: Hart) -> u64;

    /// Program the deadline for `hart`.
    fn set_timeout(&self, hart: Hart, deadline: u64);

    /// True when `hart` has a timer interrupt pending (`mip.MTIP`), i.e. its
    /// deadline has passed.
    fn preempt_pending(&self, hart: Hart) -> bool;

    /// Idle `hart` until the next interrupt.
    fn wait_for_interrupt(&self, _hart: Hart) {
        core::hint::spin_loop();
    }
}
