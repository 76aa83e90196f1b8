//! System Call Decoding and Validation
//!
//! Turns the raw trap registers into a typed [`Syscall`]. Every index, pid,
//! register number and PMP slot is bounds-checked here, so the kernel
//! operations behind the dispatcher never see an out-of-range value.
//!
//! # Errors
//! - Unknown call number: `InvalidSyscall`
//! - Capability index `>= CAP_CNT`: `InvalidIndex`
//! - Pid `>= PROC_CNT`: `InvalidPid`
//! - Register number out of range: `InvalidRegister`
//! - PMP slot `>= PMP_CNT`: `InvalidSlot`
//! - Undecodable capability in `cap_derive`: `InvalidDerivation`

use crate::cap::Capability;
use crate::config::{CAP_CNT, PMP_CNT, PROC_CNT};
use crate::error::{Error, Result};
use crate::ipc::Msg;
use crate::proc::{Pid, Reg};

/// System call numbers, passed in `t0`.
pub mod numbers {
    pub const GET_INFO: u64 = 0;
    pub const REG_READ: u64 = 1;
    pub const REG_WRITE: u64 = 2;
    pub const SYNC: u64 = 3;
    pub const SLEEP: u64 = 4;
    pub const CAP_READ: u64 = 5;
    pub const CAP_MOVE: u64 = 6;
    pub const CAP_DELETE: u64 = 7;
    pub const CAP_REVOKE: u64 = 8;
    pub const CAP_DERIVE: u64 = 9;
    pub const PMP_LOAD: u64 = 10;
    pub const PMP_UNLOAD: u64 = 11;
    pub const MON_SUSPEND: u64 = 12;
    pub const MON_RESUME: u64 = 13;
    pub const MON_STATE_GET: u64 = 14;
    pub const MON_YIELD: u64 = 15;
    pub const MON_REG_READ: u64 = 16;
    pub const MON_REG_WRITE: u64 = 17;
    pub const MON_CAP_READ: u64 = 18;
    pub const MON_CAP_MOVE: u64 = 19;
    pub const MON_PMP_LOAD: u64 = 20;
    pub const MON_PMP_UNLOAD: u64 = 21;
    pub const SOCK_SEND: u64 = 22;
    pub const SOCK_RECV: u64 = 23;
    pub const SOCK_SENDRECV: u64 = 24;
}

/// `get_info` selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Info {
    Pid,
    Time,
    Timeout,
}

/// A decoded system call. Indices are slots in the caller's table unless
/// paired with a pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    GetInfo(Info),
    RegRead { reg: Reg },
    RegWrite { reg: Reg, value: u64 },
    /// `full` also ends the caller's slot and reschedules; otherwise only
    /// memory protection is refreshed.
    Sync { full: bool },
    Sleep { until: u64 },
    CapRead { idx: usize },
    CapMove { src: usize, dst: usize },
    CapDelete { idx: usize },
    CapRevoke { idx: usize },
    CapDerive { src: usize, dst: usize, cap: Capability },
    PmpLoad { idx: usize, slot: usize },
    PmpUnload { idx: usize },
    MonSuspend { mon: usize, pid: Pid },
    MonResume { mon: usize, pid: Pid },
    MonStateGet { mon: usize, pid: Pid },
    MonYield { mon: usize, pid: Pid },
    MonRegRead { mon: usize, pid: Pid, reg: Reg },
    MonRegWrite { mon: usize, pid: Pid, reg: Reg, value: u64 },
    MonCapRead { mon: usize, pid: Pid, idx: usize },
    MonCapMove { mon: usize, src: (Pid, usize), dst: (Pid, usize) },
    MonPmpLoad { mon: usize, pid: Pid, idx: usize, slot: usize },
    MonPmpUnload { mon: usize, pid: Pid, idx: usize },
    SockSend { sock: usize, msg: Msg },
    SockRecv { sock: usize, cap_buf: usize },
    SockSendRecv { sock: usize, msg: Msg },
}

fn index(arg: u64) -> Result<usize> {
    match usize::try_from(arg) {
        Ok(idx) if idx < CAP_CNT => Ok(idx),
        _ => Err(Error::InvalidIndex),
    }
}

fn pid(arg: u64) -> Result<Pid> {
    match usize::try_from(arg) {
        Ok(pid) if pid < PROC_CNT => Ok(pid),
        _ => Err(Error::InvalidPid),
    }
}

fn reg(arg: u64) -> Result<Reg> {
    Reg::from_index(arg).ok_or(Error::InvalidRegister)
}

fn pmp_slot(arg: u64) -> Result<usize> {
    match usize::try_from(arg) {
        Ok(slot) if slot < PMP_CNT => Ok(slot),
        _ => Err(Error::InvalidSlot),
    }
}

/// Socket message from `a1..a6`: capability index, send flag, data.
fn msg(args: &[u64; 8]) -> Result<Msg> {
    Ok(Msg {
        cap_buf: index(args[1])?,
        send_cap: args[2] != 0,
        data: [args[3], args[4], args[5], args[6]],
    })
}

impl Syscall {
    /// Decode call number `call` with arguments `a0..a7`.
    pub fn decode(call: u64, args: [u64; 8]) -> Result<Self> {
        use numbers::*;
        let a = &args;
        let syscall = match call {
            GET_INFO => Syscall::GetInfo(match a[0] {
                0 => Info::Pid,
                1 => Info::Time,
                2 => Info::Timeout,
                _ => return Err(Error::InvalidSyscall),
            }),
            REG_READ => Syscall::RegRead { reg: reg(a[0])? },
            REG_WRITE => Syscall::RegWrite {
                reg: reg(a[0])?,
                value: a[1],
            },
            SYNC => Syscall::Sync { full: a[0] != 0 },
            SLEEP => Syscall::Sleep { until: a[0] },
            CAP_READ => Syscall::CapRead { idx: index(a[0])? },
            CAP_MOVE => Syscall::CapMove {
                src: index(a[0])?,
                dst: index(a[1])?,
            },
            CAP_DELETE => Syscall::CapDelete { idx: index(a[0])? },
            CAP_REVOKE => Syscall::CapRevoke { idx: index(a[0])? },
            CAP_DERIVE => Syscall::CapDerive {
                src: index(a[0])?,
                dst: index(a[1])?,
                cap: Capability::from_raw(a[2]).ok_or(Error::InvalidDerivation)?,
            },
            PMP_LOAD => Syscall::PmpLoad {
                idx: index(a[0])?,
                slot: pmp_slot(a[1])?,
            },
            PMP_UNLOAD => Syscall::PmpUnload { idx: index(a[0])? },
            MON_SUSPEND => Syscall::MonSuspend {
                mon: index(a[0])?,
                pid: pid(a[1])?,
            },
            MON_RESUME => Syscall::MonResume {
                mon: index(a[0])?,
                pid: pid(a[1])?,
            },
            MON_STATE_GET => Syscall::MonStateGet {
                mon: index(a[0])?,
                pid: pid(a[1])?,
            },
            MON_YIELD => Syscall::MonYield {
                mon: index(a[0])?,
                pid: pid(a[1])?,
            },
            MON_REG_READ => Syscall::MonRegRead {
                mon: index(a[0])?,
                pid: pid(a[1])?,
                reg: reg(a[2])?,
            },
            MON_REG_WRITE => Syscall::MonRegWrite {
                mon: index(a[0])?,
                pid: pid(a[1])?,
                reg: reg(a[2])?,
                value: a[3],
            },
            MON_CAP_READ => Syscall::MonCapRead {
                mon: index(a[0])?,
                pid: pid(a[1])?,
                idx: index(a[2])?,
            },
            MON_CAP_MOVE => Syscall::MonCapMove {
                mon: index(a[0])?,
                src: (pid(a[1])?, index(a[2])?),
                dst: (pid(a[3])?, index(a[4])?),
            },
            MON_PMP_LOAD => Syscall::MonPmpLoad {
                mon: index(a[0])?,
                pid: pid(a[1])?,
                idx: index(a[2])?,
                slot: pmp_slot(a[3])?,
            },
            MON_PMP_UNLOAD => Syscall::MonPmpUnload {
                mon: index(a[0])?,
                pid: pid(a[1])?,
                idx: index(a[2])?,
            },
            SOCK_SEND => Syscall::SockSend {
                sock: index(a[0])?,
                msg: msg(a)?,
            },
            SOCK_RECV => Syscall::SockRecv {
                sock: index(a[0])?,
                cap_buf: index(a[1])?,
            },
            SOCK_SENDRECV => Syscall::SockSendRecv {
                sock: index(a[0])?,
                msg: msg(a)?,
            },
            _ => return Err(Error::InvalidSyscall),
        };
        Ok(syscall)
    }

    /// Whether the call runs without the kernel lock.
    pub fn is_lock_free(&self) -> bool {
        matches!(
            self,
            Syscall::GetInfo(_)
                | Syscall::RegRead { .. }
                | Syscall::RegWrite { .. }
                | Syscall::Sync { .. }
                | Syscall::Sleep { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::numbers::*;
    use super::*;
    use crate::cap::{IpcMode, IpcPerm};

    fn args(a: &[u64]) -> [u64; 8] {
        let mut args = [0; 8];
        args[..a.len()].copy_from_slice(a);
        args
    }

    #[test]
    fn test_unknown_call() {
        assert_eq!(Syscall::decode(25, [0; 8]), Err(Error::InvalidSyscall));
        assert_eq!(Syscall::decode(u64::MAX, [0; 8]), Err(Error::InvalidSyscall));
        assert_eq!(
            Syscall::decode(GET_INFO, args(&[3])),
            Err(Error::InvalidSyscall)
        );
    }

    #[test]
    fn test_bounds() {
        assert_eq!(
            Syscall::decode(CAP_READ, args(&[CAP_CNT as u64])),
            Err(Error::InvalidIndex)
        );
        assert_eq!(
            Syscall::decode(MON_SUSPEND, args(&[0, PROC_CNT as u64])),
            Err(Error::InvalidPid)
        );
        assert_eq!(
            Syscall::decode(REG_READ, args(&[40])),
            Err(Error::InvalidRegister)
        );
        assert_eq!(
            Syscall::decode(PMP_LOAD, args(&[0, PMP_CNT as u64])),
            Err(Error::InvalidSlot)
        );
        assert_eq!(
            Syscall::decode(CAP_DERIVE, args(&[0, 1, 0xF])),
            Err(Error::InvalidDerivation)
        );
    }

    #[test]
    fn test_decode() {
        assert_eq!(
            Syscall::decode(REG_WRITE, args(&[0, 0x1000])),
            Ok(Syscall::RegWrite {
                reg: Reg::Pc,
                value: 0x1000
            })
        );
        let cap = Capability::socket(2, IpcMode::Yield, IpcPerm::all(), 0);
        assert_eq!(
            Syscall::decode(CAP_DERIVE, args(&[3, 4, cap.to_raw()])),
            Ok(Syscall::CapDerive { src: 3, dst: 4, cap })
        );
        assert_eq!(
            Syscall::decode(MON_CAP_MOVE, args(&[0, 1, 2, 3, 4])),
            Ok(Syscall::MonCapMove {
                mon: 0,
                src: (1, 2),
                dst: (3, 4)
            })
        );
        assert_eq!(
            Syscall::decode(SOCK_SEND, args(&[1, 2, 1, 10, 11, 12, 13])),
            Ok(Syscall::SockSend {
                sock: 1,
                msg: Msg {
                    cap_buf: 2,
                    send_cap: true,
                    data: [10, 11, 12, 13]
                }
            })
        );
    }

    #[test]
    fn test_lock_free_calls() {
        assert!(Syscall::Sync { full: true }.is_lock_free());
        assert!(Syscall::GetInfo(Info::Pid).is_lock_free());
        assert!(!Syscall::CapRead { idx: 0 }.is_lock_free());
    }
}
