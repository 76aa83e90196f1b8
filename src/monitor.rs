//! Monitor Operations
//!
//! A Monitor capability over `[mark, end)` lets its holder control those
//! processes: suspend and resume them, inspect their state, lend them its
//! hart, and edit their registers, capabilities and PMP configuration.
//!
//! Edits require the target to be suspended and idle, so they never race
//! with the target running on another hart.

use log::{debug, trace};

use crate::cap::{CapSlot, Capability};
use crate::config::PMP_CNT;
use crate::error::{Error, Result};
use crate::ipc::Next;
use crate::kernel::KernelGuard;
use crate::platform::Platform;
use crate::proc::{Pid, Proc, Reg};

impl<'a, P: Platform> KernelGuard<'a, P> {
    /// The process `pid`, if the capability at `mon` monitors it.
    fn monitored(&self, mon: CapSlot, pid: Pid) -> Result<&'a Proc> {
        match self.state.table.get(mon) {
            Capability::Monitor(m) if (m.mark as usize) <= pid && pid < m.end as usize => {
                Ok(self.kernel.proc(pid))
            }
            _ => {
                debug!("monitor {mon:?} does not cover pid={pid}");
                Err(Error::InvalidMonitor)
            }
        }
    }

    fn monitored_suspended(&self, mon: CapSlot, pid: Pid) -> Result<&'a Proc> {
        let proc = self.monitored(mon, pid)?;
        if proc.is_suspended() {
            Ok(proc)
        } else {
            Err(Error::InvalidState)
        }
    }

    pub fn mon_suspend(&mut self, mon: CapSlot, pid: Pid) -> Result<()> {
        self.monitored(mon, pid)?.suspend();
        trace!("monitor {mon:?} suspended pid={pid}");
        Ok(())
    }

    pub fn mon_resume(&mut self, mon: CapSlot, pid: Pid) -> Result<()> {
        self.monitored(mon, pid)?.resume();
        trace!("monitor {mon:?} resumed pid={pid}");
        Ok(())
    }

    /// Raw state word of `pid`.
    pub fn mon_state_get(&self, mon: CapSlot, pid: Pid) -> Result<u64> {
        Ok(self.monitored(mon, pid)?.state_word())
    }

    /// Hand the calling hart to `pid` for the rest of the caller's run.
    ///
    /// Fails with `InvalidState` unless `pid` is ready.
    pub fn mon_yield(&mut self, mon: CapSlot, pid: Pid) -> Result<Next> {
        let proc = self.monitored(mon, pid)?;
        if !proc.acquire(self.kernel.platform().time()) {
            return Err(Error::InvalidState);
        }
        proc.set_timeout(self.kernel.proc(mon.pid()).timeout());
        Ok(Next::Yield(pid))
    }

    pub fn mon_reg_read(&self, mon: CapSlot, pid: Pid, reg: Reg) -> Result<u64> {
        Ok(self.monitored_suspended(mon, pid)?.reg(reg))
    }

    pub fn mon_reg_write(&mut self, mon: CapSlot, pid: Pid, reg: Reg, value: u64) -> Result<()> {
        let proc = self.monitored(mon, pid)?;
        if !proc.acquire_suspended() {
            return Err(Error::InvalidState);
        }
        proc.set_reg(reg, value);
        proc.release();
        Ok(())
    }

    pub fn mon_cap_read(&self, mon: CapSlot, pid: Pid, idx: usize) -> Result<Capability> {
        self.monitored_suspended(mon, pid)?;
        let slot = CapSlot::new(pid, idx).ok_or(Error::InvalidIndex)?;
        self.cap_read(slot)
    }

    /// Move a capability between the monitor's own table and the tables of
    /// suspended monitored processes, in any combination.
    pub fn mon_cap_move(&mut self, mon: CapSlot, src: CapSlot, dst: CapSlot) -> Result<()> {
        for pid in [src.pid(), dst.pid()] {
            if pid != mon.pid() {
                self.monitored_suspended(mon, pid)?;
            }
        }
        self.cap_move(src, dst)
    }

    pub fn mon_pmp_load(
        &mut self,
        mon: CapSlot,
        pid: Pid,
        idx: usize,
        pmp_slot: usize,
    ) -> Result<()> {
        self.monitored_suspended(mon, pid)?;
        if pmp_slot >= PMP_CNT {
            return Err(Error::InvalidSlot);
        }
        let slot = CapSlot::new(pid, idx).ok_or(Error::InvalidIndex)?;
        self.pmp_load(slot, pmp_slot)
    }

    pub fn mon_pmp_unload(&mut self, mon: CapSlot, pid: Pid, idx: usize) -> Result<()> {
        self.monitored_suspended(mon, pid)?;
        let slot = CapSlot::new(pid, idx).ok_or(Error::InvalidIndex)?;
        self.pmp_unload(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cap::Rwx;
    use crate::config::PROC_CNT;
    use crate::kernel::Kernel;
    use crate::pmp::napot_encode;
    use crate::proc::{ProcState, StateFlags};
    use crate::testing::MockPlatform;

    const RAM: u64 = 0x8000_0000;

    fn slot(pid: Pid, idx: usize) -> CapSlot {
        CapSlot::new(pid, idx).unwrap()
    }

    /// Pid 0 holds a monitor over `[1, 4)` in slot 0 and memory in slot 1.
    fn boot() -> Kernel<MockPlatform> {
        let kernel = Kernel::new(MockPlatform::new());
        kernel
            .init(&[
                Capability::monitor(1, 4),
                Capability::memory(RAM, RAM + 0x10000, Rwx::all()),
            ])
            .unwrap();
        kernel.proc(0).reset(StateFlags::BUSY);
        kernel
    }

    #[test]
    fn test_range_check() {
        let kernel = boot();
        let mut guard = kernel.lock(0).unwrap();
        let mon = slot(0, 0);
        assert_eq!(guard.mon_suspend(mon, 0), Err(Error::InvalidMonitor));
        assert_eq!(guard.mon_suspend(mon, 4), Err(Error::InvalidMonitor));
        assert_eq!(guard.mon_suspend(slot(0, 1), 1), Err(Error::InvalidMonitor));
        assert_eq!(guard.mon_suspend(slot(0, 5), 1), Err(Error::InvalidMonitor));
        assert!(guard.mon_suspend(mon, 3).is_ok());

        // The handed-out part of the range is no longer covered.
        guard.cap_derive(mon, slot(0, 2), Capability::monitor(1, 3)).unwrap();
        assert_eq!(guard.mon_resume(mon, 2), Err(Error::InvalidMonitor));
        assert!(guard.mon_resume(slot(0, 2), 2).is_ok());
    }

    #[test]
    fn test_suspend_resume_state() {
        let kernel = boot();
        let mut guard = kernel.lock(0).unwrap();
        let mon = slot(0, 0);
        assert_eq!(
            guard.mon_state_get(mon, 1),
            Ok(StateFlags::SUSPENDED.bits())
        );
        guard.mon_resume(mon, 1).unwrap();
        assert_eq!(guard.mon_state_get(mon, 1), Ok(0));
        assert_eq!(kernel.proc(1).timeout(), 0);
        guard.mon_suspend(mon, 1).unwrap();
        assert!(kernel.proc(1).is_suspended());
    }

    #[test]
    fn test_registers_need_suspension() {
        let kernel = boot();
        let mut guard = kernel.lock(0).unwrap();
        let mon = slot(0, 0);
        guard.mon_reg_write(mon, 1, Reg::Pc, 0x8000_1000).unwrap();
        assert_eq!(guard.mon_reg_read(mon, 1, Reg::Pc), Ok(0x8000_1000));
        assert!(kernel.proc(1).is_suspended());

        guard.mon_resume(mon, 1).unwrap();
        assert_eq!(guard.mon_reg_read(mon, 1, Reg::Pc), Err(Error::InvalidState));
        assert_eq!(
            guard.mon_reg_write(mon, 1, Reg::Pc, 0),
            Err(Error::InvalidState)
        );
    }

    #[test]
    fn test_yield() {
        let kernel = boot();
        kernel.proc(0).set_timeout(777);
        let mut guard = kernel.lock(0).unwrap();
        let mon = slot(0, 0);
        assert_eq!(guard.mon_yield(mon, 1), Err(Error::InvalidState));
        guard.mon_resume(mon, 1).unwrap();
        assert_eq!(guard.mon_yield(mon, 1), Ok(Next::Yield(1)));
        assert_eq!(kernel.proc(1).state(), ProcState::Busy);
        assert_eq!(kernel.proc(1).timeout(), 777);
    }

    #[test]
    fn test_capabilities_and_pmp() {
        let kernel = boot();
        let mut guard = kernel.lock(0).unwrap();
        let mon = slot(0, 0);
        let pmp = Capability::pmp(napot_encode(RAM, 0x1000), Rwx::R | Rwx::X);
        guard.cap_derive(slot(0, 1), slot(0, 3), pmp).unwrap();

        guard.mon_cap_move(mon, slot(0, 3), slot(2, 0)).unwrap();
        assert_eq!(guard.mon_cap_read(mon, 2, 0), Ok(pmp));
        assert_eq!(guard.mon_cap_read(mon, 2, 1), Err(Error::Empty));

        assert_eq!(guard.mon_pmp_load(mon, 2, 0, PMP_CNT), Err(Error::InvalidSlot));
        guard.mon_pmp_load(mon, 2, 0, 4).unwrap();
        assert_eq!(kernel.proc(2).context().pmp.entry(4).0, 0x1D);
        guard.mon_pmp_unload(mon, 2, 0).unwrap();
        assert!(kernel.proc(2).context().pmp.is_free(4));

        // Moving between two monitored processes needs both suspended.
        guard.mon_resume(mon, 3).unwrap();
        assert_eq!(
            guard.mon_cap_move(mon, slot(2, 0), slot(3, 0)),
            Err(Error::InvalidState)
        );
        assert_eq!(
            guard.mon_cap_move(mon, slot(2, 0), slot(PROC_CNT - 1, 0)),
            Err(Error::InvalidMonitor)
        );
        guard.mon_cap_move(mon, slot(2, 0), slot(1, 0)).unwrap();
        assert_eq!(guard.mon_cap_read(mon, 1, 0), Ok(pmp));
    }
}
