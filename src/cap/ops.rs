//! Capability Operations
//!
//! Read, move, delete, derive and revoke, plus loading PMP capabilities into
//! a process's PMP shadow. These are the only mutations of the capability
//! table, and they keep the schedule, the PMP shadows and the channel
//! registry in step with it:
//!
//! | capability | derive            | move (to another pid) | delete / revoke        |
//! |------------|-------------------|-----------------------|------------------------|
//! | Time       | schedule child    | reschedule to new pid | unschedule / give back |
//! | Pmp        | lock parent       | unload if loaded      | unload if loaded       |
//! | Socket     |                   | clear waiters         | clear waiters          |
//!
//! # Revocation
//! A revoke walks forward from the revoked entry deleting while the next
//! entry lies inside its resource. After each deletion the parent's `mark`
//! drops to the deleted child's `mark`, so a revoke stopped early by a
//! pending timer interrupt leaves a valid, smaller subtree and can simply be
//! repeated.

use log::{debug, trace};

use super::algebra::{derivable, revocable};
use super::capability::Capability;
use super::table::CapSlot;
use crate::config::PMP_CNT;
use crate::error::{Error, Result};
use crate::kernel::KernelGuard;
use crate::platform::Platform;

impl<'a, P: Platform> KernelGuard<'a, P> {
    /// Read the capability at `slot`.
    pub fn cap_read(&self, slot: CapSlot) -> Result<Capability> {
        self.state.table.read(slot)
    }

    /// Move the capability at `src` to the empty `dst`.
    pub fn cap_move(&mut self, src: CapSlot, dst: CapSlot) -> Result<()> {
        self.move_cap(src, dst).map(|_| ())
    }

    /// Move and return the capability as stored at `dst`.
    pub(crate) fn move_cap(&mut self, src: CapSlot, dst: CapSlot) -> Result<Capability> {
        let mut cap = self.state.table.get(src);
        if cap.is_none() {
            return Err(Error::SrcEmpty);
        }
        if self.state.table.get(dst).is_some() {
            return Err(Error::DstOccupied);
        }
        if src.pid() != dst.pid() {
            cap = self.move_hook(src, dst, cap);
        }
        self.state.table.relink(src, dst, cap);
        trace!("cap move {src:?} -> {dst:?}: {cap}");
        Ok(cap)
    }

    fn move_hook(&mut self, src: CapSlot, dst: CapSlot, cap: Capability) -> Capability {
        match cap {
            Capability::Time(time) => {
                self.kernel.schedule().update(
                    dst.pid(),
                    time.end as usize,
                    time.hart as usize,
                    time.mark as usize,
                    time.end as usize,
                );
                cap
            }
            Capability::Pmp(mut pmp) if pmp.used => {
                self.kernel
                    .proc(src.pid())
                    .context()
                    .pmp
                    .unload(pmp.slot as usize);
                pmp.used = false;
                pmp.slot = 0;
                Capability::Pmp(pmp)
            }
            Capability::Socket(sock) => {
                self.state.channels.clear(&sock, src.pid());
                cap
            }
            _ => cap,
        }
    }

    /// Delete the capability at `slot`.
    ///
    /// Descendants stay where they are; only the resource still held by
    /// this capability (`[mark, end)` for Time) is released.
    pub fn cap_delete(&mut self, slot: CapSlot) -> Result<()> {
        let cap = self.state.table.read(slot)?;
        self.state.table.unlink(slot);
        self.delete_hook(slot, cap);
        trace!("cap delete {slot:?}: {cap}");
        Ok(())
    }

    fn delete_hook(&mut self, slot: CapSlot, cap: Capability) {
        match cap {
            Capability::Time(time) => self.kernel.schedule().delete(
                time.hart as usize,
                time.mark as usize,
                time.end as usize,
            ),
            Capability::Pmp(pmp) if pmp.used => self
                .kernel
                .proc(slot.pid())
                .context()
                .pmp
                .unload(pmp.slot as usize),
            Capability::Socket(sock) => self.state.channels.clear(&sock, slot.pid()),
            _ => {}
        }
    }

    /// Derive `new_cap` from the capability at `src` into the empty `dst`.
    ///
    /// The parent's `mark` advances past the child (deriving a PMP
    /// capability locks the parent instead) and the child is linked
    /// directly after its parent.
    pub fn cap_derive(&mut self, src: CapSlot, dst: CapSlot, new_cap: Capability) -> Result<()> {
        let mut parent = self.state.table.get(src);
        if parent.is_none() {
            return Err(Error::SrcEmpty);
        }
        if self.state.table.get(dst).is_some() {
            return Err(Error::DstOccupied);
        }
        if !derivable(&parent, &new_cap) {
            debug!("cap derive rejected: {parent} -> {new_cap}");
            return Err(Error::InvalidDerivation);
        }

        match (&mut parent, &new_cap) {
            (Capability::Time(p), Capability::Time(c)) => {
                p.mark = c.end;
                self.kernel.schedule().update(
                    dst.pid(),
                    c.end as usize,
                    c.hart as usize,
                    c.begin as usize,
                    c.end as usize,
                );
            }
            (Capability::Memory(p), Capability::Memory(c)) => p.mark = c.end,
            (Capability::Memory(p), Capability::Pmp(_)) => p.lock = true,
            (Capability::Monitor(p), Capability::Monitor(c)) => p.mark = c.end,
            (Capability::Channel(p), Capability::Channel(c)) => p.mark = c.end,
            (Capability::Channel(p), Capability::Socket(c)) => p.mark = c.chan + 1,
            _ => {}
        }
        self.state.table.set(src, parent);
        self.state.table.insert_after(src, dst, new_cap);
        trace!("cap derive {src:?} -> {dst:?}: {new_cap}");
        Ok(())
    }

    /// Delete every descendant of the capability at `slot` and restore its
    /// `mark` (and clear its lock). The capability itself stays.
    ///
    /// Returns `Preempted` if the hart's timer fires part-way; calling again
    /// finishes the job.
    pub fn cap_revoke(&mut self, slot: CapSlot) -> Result<()> {
        let mut parent = self.state.table.read(slot)?;
        while let Some(next) = self.state.table.next(slot) {
            let child = self.state.table.get(next);
            if !revocable(&parent, &child) {
                break;
            }
            self.state.table.unlink(next);
            self.reclaim(slot, &mut parent, next, child);
            self.state.table.set(slot, parent);
            trace!("cap revoke {slot:?}: deleted {next:?} {child}");
            if self.preempted() {
                debug!("cap revoke {slot:?} preempted");
                return Err(Error::Preempted);
            }
        }
        self.reset(slot, parent);
        Ok(())
    }

    /// Fold a deleted child's resource back into its ancestor.
    fn reclaim(
        &mut self,
        slot: CapSlot,
        parent: &mut Capability,
        child_slot: CapSlot,
        child: Capability,
    ) {
        match (parent, child) {
            (Capability::Time(p), Capability::Time(c)) => {
                if c.mark < p.mark {
                    self.kernel.schedule().update(
                        slot.pid(),
                        p.end as usize,
                        p.hart as usize,
                        c.mark as usize,
                        p.mark as usize,
                    );
                    p.mark = c.mark;
                }
            }
            (Capability::Memory(p), Capability::Memory(c)) => {
                p.mark = p.mark.min(c.mark);
                p.lock = c.lock;
            }
            (Capability::Monitor(p), Capability::Monitor(c)) => p.mark = p.mark.min(c.mark),
            (Capability::Channel(p), Capability::Channel(c)) => p.mark = p.mark.min(c.mark),
            (Capability::Channel(p), Capability::Socket(c)) => {
                if c.is_server() {
                    p.mark = p.mark.min(c.chan);
                }
                self.delete_hook(child_slot, child);
            }
            _ => self.delete_hook(child_slot, child),
        }
    }

    /// Hand everything below `mark` back to the capability at `slot`.
    fn reset(&mut self, slot: CapSlot, mut cap: Capability) {
        match &mut cap {
            Capability::Time(t) => {
                if t.begin < t.mark {
                    self.kernel.schedule().update(
                        slot.pid(),
                        t.end as usize,
                        t.hart as usize,
                        t.begin as usize,
                        t.mark as usize,
                    );
                }
                t.mark = t.begin;
            }
            Capability::Memory(m) => {
                m.mark = m.begin;
                m.lock = false;
            }
            Capability::Monitor(m) => m.mark = m.begin,
            Capability::Channel(c) => c.mark = c.begin,
            _ => return,
        }
        self.state.table.set(slot, cap);
    }

    /// Load the PMP capability at `slot` into PMP slot `pmp_slot` of its
    /// owner.
    pub fn pmp_load(&mut self, slot: CapSlot, pmp_slot: usize) -> Result<()> {
        let Capability::Pmp(mut pmp) = self.state.table.read(slot)? else {
            return Err(Error::InvalidPmp);
        };
        if pmp.used {
            return Err(Error::InvalidPmp);
        }
        if pmp_slot >= PMP_CNT {
            return Err(Error::InvalidSlot);
        }
        {
            let mut ctx = self.kernel.proc(slot.pid()).context();
            if !ctx.pmp.is_free(pmp_slot) {
                return Err(Error::DstOccupied);
            }
            ctx.pmp.load(pmp_slot, pmp.rwx, pmp.addr);
        }
        pmp.used = true;
        pmp.slot = pmp_slot as u8;
        self.state.table.set(slot, Capability::Pmp(pmp));
        trace!("pmp load {slot:?} into slot {pmp_slot}");
        Ok(())
    }

    /// Unload the loaded PMP capability at `slot`.
    pub fn pmp_unload(&mut self, slot: CapSlot) -> Result<()> {
        let Capability::Pmp(mut pmp) = self.state.table.read(slot)? else {
            return Err(Error::InvalidPmp);
        };
        if !pmp.used {
            return Err(Error::InvalidPmp);
        }
        self.kernel
            .proc(slot.pid())
            .context()
            .pmp
            .unload(pmp.slot as usize);
        pmp.used = false;
        pmp.slot = 0;
        self.state.table.set(slot, Capability::Pmp(pmp));
        trace!("pmp unload {slot:?}");
        Ok(())
    }
}
