//! Physical Memory Protection
//!
//! NAPOT address arithmetic and the per-process shadow of the hardware PMP
//! registers. The shadow is what gets written to `pmpcfg`/`pmpaddr` when a
//! process is dispatched; the kernel core only ever edits the shadow.
//!
//! # NAPOT
//! A naturally aligned power-of-two region `[base, base + size)` is stored in
//! a single word as `(base | (size / 2 - 1)) >> 2`. The number of trailing
//! ones gives the size.

use crate::cap::Rwx;
use crate::config::PMP_CNT;

/// Address-matching mode bits selecting NAPOT in a `pmpcfg` byte.
pub const PMP_NAPOT: u8 = 0x18;

/// PMP register slot index, `0..PMP_CNT`.
pub type PmpSlot = usize;

/// Encode `[base, base + size)` as a NAPOT address word.
///
/// `size` must be a power of two of at least 8 bytes and `base` must be
/// aligned to it.
#[inline]
pub const fn napot_encode(base: u64, size: u64) -> u64 {
    debug_assert!(size.is_power_of_two() && size >= 8);
    debug_assert!(base & (size - 1) == 0);
    (base | (size / 2 - 1)) >> 2
}

/// Decode a NAPOT address word into `(base, size)`.
#[inline]
pub const fn napot_decode(addr: u64) -> (u64, u64) {
    let base = ((addr.wrapping_add(1)) & addr) << 2;
    let size = (((addr.wrapping_add(1)) ^ addr).wrapping_add(1)) << 2;
    (base, size)
}

/// Decode a NAPOT address word into a half-open range `(begin, end)`.
#[inline]
pub const fn napot_range(addr: u64) -> (u64, u64) {
    let (base, size) = napot_decode(addr);
    (base, base.wrapping_add(size))
}

/// Shadow copy of a process's PMP configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PmpShadow {
    cfg: [u8; PMP_CNT],
    addr: [u64; PMP_CNT],
}

impl PmpShadow {
    /// A shadow with every entry disabled.
    pub const fn new() -> Self {
        Self {
            cfg: [0; PMP_CNT],
            addr: [0; PMP_CNT],
        }
    }

    /// Whether `slot` is unused.
    #[inline]
    pub fn is_free(&self, slot: PmpSlot) -> bool {
        self.cfg[slot] == 0
    }

    /// Enable `slot` as a NAPOT region with permissions `rwx`.
    pub fn load(&mut self, slot: PmpSlot, rwx: Rwx, addr: u64) {
        self.cfg[slot] = rwx.bits() | PMP_NAPOT;
        self.addr[slot] = addr;
    }

    /// Disable `slot`.
    pub fn unload(&mut self, slot: PmpSlot) {
        self.cfg[slot] = 0;
    }

    /// `(cfg, addr)` of `slot`.
    #[inline]
    pub fn entry(&self, slot: PmpSlot) -> (u8, u64) {
        (self.cfg[slot], self.addr[slot])
    }

    /// The eight `cfg` bytes packed as the `pmpcfg0` register value.
    pub fn cfg_word(&self) -> u64 {
        u64::from_le_bytes(self.cfg)
    }
}

impl Default for PmpShadow {
    fn default() -> Self {
        Self::new()
    }
}
