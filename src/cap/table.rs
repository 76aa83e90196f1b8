//! Capability Table
//!
//! One flat array of capability table entries (CTEs), `CAP_CNT` per process.
//! Besides its capability, each entry carries `prev`/`next` links that chain
//! a capability to its ancestors and descendants regardless of which process
//! holds them (the lineage list).
//!
//! # Design
//! - Entries are addressed by [`CapSlot`] handles, never by pointer
//! - A derived child is linked directly after its parent, so the descendants
//!   of any entry form a contiguous forward run
//! - Lists are terminated at both ends; boot capabilities are separate roots
//! - Moving a capability relinks the destination in place of the source, so
//!   its position in the lineage is unchanged

use super::capability::Capability;
use crate::config::{CAP_CNT, CTABLE_SIZE, PROC_CNT};
use crate::error::{Error, Result};
use crate::proc::Pid;

/// Handle to one capability table entry.
///
/// Newtype so an arbitrary integer cannot be used as an index.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
#[repr(transparent)]
pub struct CapSlot(u16);

impl CapSlot {
    /// Slot `idx` of process `pid`, or `None` if either is out of range.
    #[inline]
    pub const fn new(pid: Pid, idx: usize) -> Option<Self> {
        if pid < PROC_CNT && idx < CAP_CNT {
            Some(Self((pid * CAP_CNT + idx) as u16))
        } else {
            None
        }
    }

    /// Slot for a flat table index.
    #[inline]
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < CTABLE_SIZE {
            Some(Self(index as u16))
        } else {
            None
        }
    }

    /// Flat table index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Owning process.
    #[inline]
    pub const fn pid(self) -> Pid {
        self.index() / CAP_CNT
    }

    /// Index within the owning process.
    #[inline]
    pub const fn idx(self) -> usize {
        self.index() % CAP_CNT
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Cte {
    cap: Capability,
    prev: Option<CapSlot>,
    next: Option<CapSlot>,
}

impl Cte {
    const EMPTY: Self = Self {
        cap: Capability::None,
        prev: None,
        next: None,
    };
}

/// The capability table.
#[derive(Debug)]
pub struct CapTable {
    entries: [Cte; CTABLE_SIZE],
}

impl CapTable {
    /// An empty table.
    pub const fn new() -> Self {
        Self {
            entries: [Cte::EMPTY; CTABLE_SIZE],
        }
    }

    /// Capability stored at `slot` (`None` if empty).
    #[inline]
    pub fn get(&self, slot: CapSlot) -> Capability {
        self.entries[slot.index()].cap
    }

    /// Capability stored at `slot`, failing with `Empty` if there is none.
    #[inline]
    pub fn read(&self, slot: CapSlot) -> Result<Capability> {
        match self.get(slot) {
            Capability::None => Err(Error::Empty),
            cap => Ok(cap),
        }
    }

    /// Overwrite the capability at an occupied `slot`, keeping its links.
    #[inline]
    pub fn set(&mut self, slot: CapSlot, cap: Capability) {
        debug_assert!(self.get(slot).is_some() && cap.is_some());
        self.entries[slot.index()].cap = cap;
    }

    #[inline]
    pub fn next(&self, slot: CapSlot) -> Option<CapSlot> {
        self.entries[slot.index()].next
    }

    #[inline]
    pub fn prev(&self, slot: CapSlot) -> Option<CapSlot> {
        self.entries[slot.index()].prev
    }

    /// Place `cap` at the empty `slot` as the root of a new lineage.
    pub fn insert_root(&mut self, slot: CapSlot, cap: Capability) {
        debug_assert!(self.get(slot).is_none());
        self.entries[slot.index()] = Cte {
            cap,
            prev: None,
            next: None,
        };
    }

    /// Place `cap` at the empty `slot`, linked directly after `parent`.
    pub fn insert_after(&mut self, parent: CapSlot, slot: CapSlot, cap: Capability) {
        debug_assert!(self.get(parent).is_some());
        debug_assert!(self.get(slot).is_none());
        let next = self.next(parent);
        self.entries[slot.index()] = Cte {
            cap,
            prev: Some(parent),
            next,
        };
        self.entries[parent.index()].next = Some(slot);
        if let Some(next) = next {
            self.entries[next.index()].prev = Some(slot);
        }
    }

    /// Clear `slot` and splice it out of its lineage. Returns the old value.
    pub fn unlink(&mut self, slot: CapSlot) -> Capability {
        let Cte { cap, prev, next } = self.entries[slot.index()];
        if let Some(prev) = prev {
            debug_assert_eq!(self.next(prev), Some(slot));
            self.entries[prev.index()].next = next;
        }
        if let Some(next) = next {
            debug_assert_eq!(self.prev(next), Some(slot));
            self.entries[next.index()].prev = prev;
        }
        self.entries[slot.index()] = Cte::EMPTY;
        cap
    }

    /// Move the entry at `src` to the empty `dst`, storing `cap` there.
    /// `dst` takes `src`'s place in the lineage and `src` is cleared.
    pub fn relink(&mut self, src: CapSlot, dst: CapSlot, cap: Capability) {
        debug_assert!(src != dst);
        debug_assert!(self.get(src).is_some());
        debug_assert!(self.get(dst).is_none());
        let Cte { prev, next, .. } = self.entries[src.index()];
        self.entries[dst.index()] = Cte { cap, prev, next };
        if let Some(prev) = prev {
            self.entries[prev.index()].next = Some(dst);
        }
        if let Some(next) = next {
            self.entries[next.index()].prev = Some(dst);
        }
        self.entries[src.index()] = Cte::EMPTY;
    }

    /// Occupied slots of `pid` with their capabilities.
    pub fn iter_pid(&self, pid: Pid) -> impl Iterator<Item = (CapSlot, Capability)> + '_ {
        (0..CAP_CNT)
            .filter_map(move |idx| CapSlot::new(pid, idx))
            .map(move |slot| (slot, self.get(slot)))
            .filter(|(_, cap)| cap.is_some())
    }

    /// Check the link structure: every link is mirrored by its neighbour and
    /// empty slots are unlinked.
    pub fn is_consistent(&self) -> bool {
        self.entries.iter().enumerate().all(|(i, cte)| {
            let this = CapSlot::from_index(i);
            if cte.cap.is_none() {
                return cte.prev.is_none() && cte.next.is_none();
            }
            let prev_ok = cte
                .prev
                .map_or(true, |p| self.entries[p.index()].next == this);
            let next_ok = cte
                .next
                .map_or(true, |n| self.entries[n.index()].prev == this);
            prev_ok && next_ok
        })
    }
}

impl Default for CapTable {
    fn default() -> Self {
        Self::new()
    }
}
