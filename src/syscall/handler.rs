//! System Call Handler
//!
//! Runs one decoded system call for the process that trapped and decides
//! which process the hart continues with.
//!
//! # Result registers
//! - `t0`: `0` or the error code
//! - `a0`: the returned value, for calls that return one
//!
//! Calls that block leave `t0` alone: the IPC layer has already stored the
//! code the caller sees if nobody delivers a message.

use log::{debug, trace};

use super::validate::{Info, Syscall};
use crate::cap::CapSlot;
use crate::error::{Error, Result};
use crate::ipc::Next;
use crate::kernel::{Kernel, KernelGuard};
use crate::platform::{Hart, Platform};
use crate::proc::{Pid, ProcState, Reg};

/// What a system call leaves for the dispatcher to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// Succeeded, resume the caller.
    Done,
    /// Succeeded with a value for `a0`.
    Value(u64),
    /// Succeeded, let the scheduler pick.
    Schedule,
    /// IPC or monitor hand-off.
    Next(Next),
}

fn slot(pid: Pid, idx: usize) -> Result<CapSlot> {
    CapSlot::new(pid, idx).ok_or(Error::InvalidIndex)
}

impl<P: Platform> Kernel<P> {
    /// Handle an `ecall` by the running process `pid` on `hart` and return
    /// the process to run next.
    ///
    /// The caller is released whenever another process, or the scheduler,
    /// takes over the hart.
    pub fn handle_syscall(&self, hart: Hart, pid: Pid) -> Pid {
        let proc = self.proc(pid);
        let (call, args) = {
            let mut ctx = proc.context();
            ctx.regs[Reg::Pc] = ctx.regs[Reg::Pc].wrapping_add(4);
            (ctx.regs[Reg::T0], ctx.regs.args())
        };

        let outcome = Syscall::decode(call, args).and_then(|syscall| {
            trace!("syscall pid={pid} {syscall:?}");
            if syscall.is_lock_free() {
                self.run_lock_free(hart, pid, syscall)
            } else {
                let mut guard = self.lock(hart)?;
                run_locked(&mut guard, pid, syscall)
            }
        });

        let next = match outcome {
            Ok(Outcome::Done) | Ok(Outcome::Next(Next::Caller)) => {
                proc.set_reg(Reg::T0, 0);
                Some(pid)
            }
            Ok(Outcome::Value(value)) => {
                proc.set_reg(Reg::T0, 0);
                proc.set_reg(Reg::A0, value);
                Some(pid)
            }
            Ok(Outcome::Schedule) => None,
            Ok(Outcome::Next(Next::Yield(next))) => {
                proc.set_reg(Reg::T0, 0);
                Some(next)
            }
            Ok(Outcome::Next(Next::Blocked(next))) => next,
            Err(Error::Preempted) => {
                proc.set_reg(Reg::T0, Error::Preempted.code());
                None
            }
            // Suspended while running: the suspension takes effect here.
            Err(Error::Suspended) if matches!(proc.state(), ProcState::Suspended { .. }) => {
                proc.set_reg(Reg::T0, Error::Suspended.code());
                None
            }
            Err(err) => {
                debug!("syscall pid={pid} call={call} failed: {err}");
                proc.set_reg(Reg::T0, err.code());
                Some(pid)
            }
        };

        match next {
            Some(next) if next == pid => pid,
            Some(next) => {
                proc.release();
                next
            }
            None => {
                proc.release();
                self.next_process(hart)
            }
        }
    }

    fn run_lock_free(&self, hart: Hart, pid: Pid, syscall: Syscall) -> Result<Outcome> {
        let proc = self.proc(pid);
        let outcome = match syscall {
            Syscall::GetInfo(Info::Pid) => Outcome::Value(pid as u64),
            Syscall::GetInfo(Info::Time) => Outcome::Value(self.platform().time()),
            Syscall::GetInfo(Info::Timeout) => Outcome::Value(self.platform().timeout(hart)),
            Syscall::RegRead { reg } => Outcome::Value(proc.reg(reg)),
            Syscall::RegWrite { reg, value } => {
                proc.set_reg(reg, value);
                Outcome::Done
            }
            Syscall::Sync { full: false } => Outcome::Done,
            Syscall::Sync { full: true } => {
                proc.set_reg(Reg::T0, 0);
                proc.set_timeout(0);
                Outcome::Schedule
            }
            Syscall::Sleep { until } => {
                proc.set_reg(Reg::T0, 0);
                if until > self.platform().time() {
                    proc.sleep(until);
                }
                Outcome::Schedule
            }
            _ => return Err(Error::InvalidSyscall),
        };
        Ok(outcome)
    }
}

fn run_locked<P: Platform>(
    guard: &mut KernelGuard<'_, P>,
    pid: Pid,
    syscall: Syscall,
) -> Result<Outcome> {
    let outcome = match syscall {
        Syscall::CapRead { idx } => Outcome::Value(guard.cap_read(slot(pid, idx)?)?.to_raw()),
        Syscall::CapMove { src, dst } => {
            guard.cap_move(slot(pid, src)?, slot(pid, dst)?)?;
            Outcome::Done
        }
        Syscall::CapDelete { idx } => {
            guard.cap_delete(slot(pid, idx)?)?;
            Outcome::Done
        }
        Syscall::CapRevoke { idx } => {
            guard.cap_revoke(slot(pid, idx)?)?;
            Outcome::Done
        }
        Syscall::CapDerive { src, dst, cap } => {
            guard.cap_derive(slot(pid, src)?, slot(pid, dst)?, cap)?;
            Outcome::Done
        }
        Syscall::PmpLoad { idx, slot: pmp_slot } => {
            guard.pmp_load(slot(pid, idx)?, pmp_slot)?;
            Outcome::Done
        }
        Syscall::PmpUnload { idx } => {
            guard.pmp_unload(slot(pid, idx)?)?;
            Outcome::Done
        }
        Syscall::MonSuspend { mon, pid: target } => {
            guard.mon_suspend(slot(pid, mon)?, target)?;
            Outcome::Done
        }
        Syscall::MonResume { mon, pid: target } => {
            guard.mon_resume(slot(pid, mon)?, target)?;
            Outcome::Done
        }
        Syscall::MonStateGet { mon, pid: target } => {
            Outcome::Value(guard.mon_state_get(slot(pid, mon)?, target)?)
        }
        Syscall::MonYield { mon, pid: target } => {
            Outcome::Next(guard.mon_yield(slot(pid, mon)?, target)?)
        }
        Syscall::MonRegRead { mon, pid: target, reg } => {
            Outcome::Value(guard.mon_reg_read(slot(pid, mon)?, target, reg)?)
        }
        Syscall::MonRegWrite {
            mon,
            pid: target,
            reg,
            value,
        } => {
            guard.mon_reg_write(slot(pid, mon)?, target, reg, value)?;
            Outcome::Done
        }
        Syscall::MonCapRead { mon, pid: target, idx } => {
            Outcome::Value(guard.mon_cap_read(slot(pid, mon)?, target, idx)?.to_raw())
        }
        Syscall::MonCapMove { mon, src, dst } => {
            guard.mon_cap_move(slot(pid, mon)?, slot(src.0, src.1)?, slot(dst.0, dst.1)?)?;
            Outcome::Done
        }
        Syscall::MonPmpLoad {
            mon,
            pid: target,
            idx,
            slot: pmp_slot,
        } => {
            guard.mon_pmp_load(slot(pid, mon)?, target, idx, pmp_slot)?;
            Outcome::Done
        }
        Syscall::MonPmpUnload { mon, pid: target, idx } => {
            guard.mon_pmp_unload(slot(pid, mon)?, target, idx)?;
            Outcome::Done
        }
        Syscall::SockSend { sock, msg } => Outcome::Next(guard.send(slot(pid, sock)?, &msg)?),
        Syscall::SockRecv { sock, cap_buf } => {
            Outcome::Next(guard.recv(slot(pid, sock)?, cap_buf)?)
        }
        Syscall::SockSendRecv { sock, msg } => {
            Outcome::Next(guard.sendrecv(slot(pid, sock)?, &msg)?)
        }
        _ => return Err(Error::InvalidSyscall),
    };
    Ok(outcome)
}
