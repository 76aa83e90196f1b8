//! RISC-V Exception Delegation
//!
//! Exceptions raised by a process (other than `ecall`, which is a syscall)
//! are handed back to the process itself: the kernel records the trap in
//! the virtual registers and redirects the process to its own trap handler.
//!
//! # Registers
//! - `tpc`/`tsp`: the handler entry point and stack, set by the process
//! - `epc`/`esp`: pc and sp at the time of the exception
//! - `ecause`/`eval`: `mcause` and `mtval`
//!
//! The handler returns by executing an `mret`/`sret`/`uret`, which traps as
//! an illegal instruction in user mode and is emulated here.

use log::trace;

use crate::kernel::Kernel;
use crate::platform::Platform;
use crate::proc::{Pid, Reg, RegFile};

/// `mret` instruction encoding.
pub const MRET: u64 = 0x3020_0073;
/// `sret` instruction encoding.
pub const SRET: u64 = 0x1020_0073;
/// `uret` instruction encoding.
pub const URET: u64 = 0x0020_0073;

/// Synchronous exception causes (`mcause` with the interrupt bit clear).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum Cause {
    InstructionAddressMisaligned = 0,
    InstructionAccessFault = 1,
    IllegalInstruction = 2,
    Breakpoint = 3,
    LoadAddressMisaligned = 4,
    LoadAccessFault = 5,
    StoreAddressMisaligned = 6,
    StoreAccessFault = 7,
    EcallU = 8,
    EcallS = 9,
    EcallM = 11,
    InstructionPageFault = 12,
    LoadPageFault = 13,
    StorePageFault = 15,
    Other = u64::MAX,
}

impl From<u64> for Cause {
    fn from(mcause: u64) -> Self {
        match mcause {
            0 => Cause::InstructionAddressMisaligned,
            1 => Cause::InstructionAccessFault,
            2 => Cause::IllegalInstruction,
            3 => Cause::Breakpoint,
            4 => Cause::LoadAddressMisaligned,
            5 => Cause::LoadAccessFault,
            6 => Cause::StoreAddressMisaligned,
            7 => Cause::StoreAccessFault,
            8 => Cause::EcallU,
            9 => Cause::EcallS,
            11 => Cause::EcallM,
            12 => Cause::InstructionPageFault,
            13 => Cause::LoadPageFault,
            15 => Cause::StorePageFault,
            _ => Cause::Other,
        }
    }
}

/// Whether the exception is a trap handler returning.
#[inline]
pub fn is_trap_return(mcause: u64, mtval: u64) -> bool {
    Cause::from(mcause) == Cause::IllegalInstruction && matches!(mtval, MRET | SRET | URET)
}

/// Deliver an exception to the process owning `regs`.
pub fn handle_exception(regs: &mut RegFile, mcause: u64, mtval: u64) {
    if is_trap_return(mcause, mtval) {
        handle_trap_return(regs);
        return;
    }
    regs[Reg::Ecause] = mcause;
    regs[Reg::Eval] = mtval;
    regs[Reg::Epc] = regs[Reg::Pc];
    regs[Reg::Esp] = regs[Reg::Sp];
    regs[Reg::Pc] = regs[Reg::Tpc];
    regs[Reg::Sp] = regs[Reg::Tsp];
}

/// Resume where the last exception struck and clear the trap record.
pub fn handle_trap_return(regs: &mut RegFile) {
    regs[Reg::Pc] = regs[Reg::Epc];
    regs[Reg::Sp] = regs[Reg::Esp];
    regs[Reg::Ecause] = 0;
    regs[Reg::Eval] = 0;
    regs[Reg::Epc] = 0;
    regs[Reg::Esp] = 0;
}

impl<P: Platform> Kernel<P> {
    /// Handle an exception of the running process `pid`. The process
    /// continues in its trap handler.
    pub fn handle_exception(&self, pid: Pid, mcause: u64, mtval: u64) -> Pid {
        trace!(
            "exception pid={pid} cause={:?} tval={mtval:#x}",
            Cause::from(mcause)
        );
        handle_exception(&mut self.proc(pid).context().regs, mcause, mtval);
        pid
    }
}
