//! Process Register File
//!
//! The saved user registers plus the kernel's virtual registers, indexed by
//! [`Reg`]. The numbering is part of the syscall ABI (`reg_read`/`reg_write`
//! take a register number).

use core::ops::{Index, IndexMut};

/// Register numbers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Reg {
    Pc,
    Ra,
    Sp,
    Gp,
    Tp,
    T0,
    T1,
    T2,
    S0,
    S1,
    A0,
    A1,
    A2,
    A3,
    A4,
    A5,
    A6,
    A7,
    S2,
    S3,
    S4,
    S5,
    S6,
    S7,
    S8,
    S9,
    S10,
    S11,
    T3,
    T4,
    T5,
    T6,
    /// Trap handler entry point.
    Tpc,
    /// Trap handler stack pointer.
    Tsp,
    /// Pc at the last exception.
    Epc,
    /// Sp at the last exception.
    Esp,
    /// `mcause` of the last exception.
    Ecause,
    /// `mtval` of the last exception.
    Eval,
    /// Minimum remaining time required to accept an IPC request.
    Servtime,
    /// Worst-case execution time, informational.
    Wcet,
}

/// Number of registers in a [`RegFile`].
pub const REG_CNT: usize = Reg::Wcet as usize + 1;

const ALL_REGS: [Reg; REG_CNT] = [
    Reg::Pc,
    Reg::Ra,
    Reg::Sp,
    Reg::Gp,
    Reg::Tp,
    Reg::T0,
    Reg::T1,
    Reg::T2,
    Reg::S0,
    Reg::S1,
    Reg::A0,
    Reg::A1,
    Reg::A2,
    Reg::A3,
    Reg::A4,
    Reg::A5,
    Reg::A6,
    Reg::A7,
    Reg::S2,
    Reg::S3,
    Reg::S4,
    Reg::S5,
    Reg::S6,
    Reg::S7,
    Reg::S8,
    Reg::S9,
    Reg::S10,
    Reg::S11,
    Reg::T3,
    Reg::T4,
    Reg::T5,
    Reg::T6,
    Reg::Tpc,
    Reg::Tsp,
    Reg::Epc,
    Reg::Esp,
    Reg::Ecause,
    Reg::Eval,
    Reg::Servtime,
    Reg::Wcet,
];

impl Reg {
    /// Look up a register by number.
    #[inline]
    pub fn from_index(index: u64) -> Option<Self> {
        ALL_REGS.get(usize::try_from(index).ok()?).copied()
    }

    /// The `n`th argument register (`a0..a7`).
    #[inline]
    pub fn arg(n: usize) -> Self {
        debug_assert!(n < 8);
        ALL_REGS[Reg::A0 as usize + n]
    }
}

/// Saved registers of one process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegFile([u64; REG_CNT]);

impl RegFile {
    pub const fn new() -> Self {
        Self([0; REG_CNT])
    }

    /// Argument registers `a0..a7`.
    pub fn args(&self) -> [u64; 8] {
        let mut args = [0; 8];
        args.copy_from_slice(&self.0[Reg::A0 as usize..=Reg::A7 as usize]);
        args
    }
}

impl Default for RegFile {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<Reg> for RegFile {
    type Output = u64;

    #[inline]
    fn index(&self, reg: Reg) -> &u64 {
        &self.0[reg as usize]
    }
}

impl IndexMut<Reg> for RegFile {
    #[inline]
    fn index_mut(&mut self, reg: Reg) -> &mut u64 {
        &mut self.0[reg as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_numbering() {
        assert_eq!(REG_CNT, 40);
        assert_eq!(Reg::T0 as usize, 5);
        assert_eq!(Reg::A0 as usize, 10);
        assert_eq!(Reg::S2 as usize, 18);
        assert_eq!(Reg::Tpc as usize, 32);
        for (i, reg) in ALL_REGS.iter().enumerate() {
            assert_eq!(*reg as usize, i);
        }
        assert_eq!(Reg::from_index(38), Some(Reg::Servtime));
        assert_eq!(Reg::from_index(40), None);
    }

    #[test]
    fn test_args() {
        let mut regs = RegFile::new();
        for n in 0..8 {
            regs[Reg::arg(n)] = n as u64 + 1;
        }
        assert_eq!(regs.args(), [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(regs[Reg::A7], 8);
    }
}
