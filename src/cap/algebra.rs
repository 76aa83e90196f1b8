//! Capability Algebra
//!
//! Pure predicates over capability values. These decide what may be carved
//! out of what (`derivable`) and what a revoke may reclaim (`revocable`).
//! None of them touch kernel state.
//!
//! # Derivation
//! | parent  | child   | rule                                                  |
//! |---------|---------|-------------------------------------------------------|
//! | Time    | Time    | same hart, `child.begin == mark`, `child.end <= end`  |
//! | Memory  | Memory  | same tag, mark-anchored, `rwx` subset, parent unlocked |
//! | Memory  | Pmp     | NAPOT range within `[mark, end)`, `rwx` subset        |
//! | Monitor | Monitor | mark-anchored sub-range                               |
//! | Channel | Channel | mark-anchored sub-range                               |
//! | Channel | Socket  | server (`tag == 0`) on a channel in `[mark, end)`     |
//! | Socket  | Socket  | server to client on the same channel, mode and perm   |
//!
//! Pmp capabilities and client sockets are leaves.

use super::capability::{Capability, IpcPerm};

#[inline]
const fn is_range_subset(a_begin: u64, a_end: u64, b_begin: u64, b_end: u64) -> bool {
    a_begin <= b_begin && b_end <= a_end
}

#[inline]
const fn is_mark_anchored(mark: u16, end: u16, c_begin: u16, c_end: u16) -> bool {
    c_begin == mark && c_end <= end
}

/// Whether `cap` is a well-formed fresh capability, fit to be a derivation
/// target.
pub fn valid(cap: &Capability) -> bool {
    match cap {
        Capability::None => false,
        Capability::Time(c) => c.begin == c.mark && c.begin < c.end,
        Capability::Memory(c) => !c.lock && c.begin == c.mark && c.begin < c.end,
        Capability::Pmp(c) => !c.used && c.slot == 0,
        Capability::Monitor(c) => c.begin == c.mark && c.begin < c.end,
        Capability::Channel(c) => c.begin == c.mark && c.begin < c.end,
        // Mode and permission bits are checked when decoding.
        Capability::Socket(c) => IpcPerm::all().contains(c.perm),
    }
}

/// Whether `child` may be derived from `parent` in its current state.
pub fn derivable(parent: &Capability, child: &Capability) -> bool {
    if !valid(child) {
        return false;
    }
    match (parent, child) {
        (Capability::Time(p), Capability::Time(c)) => {
            p.hart == c.hart && is_mark_anchored(p.mark, p.end, c.begin, c.end)
        }
        (Capability::Memory(p), Capability::Memory(c)) => {
            !p.lock
                && p.tag == c.tag
                && is_mark_anchored(p.mark, p.end, c.begin, c.end)
                && p.rwx.contains(c.rwx)
        }
        (Capability::Memory(p), Capability::Pmp(c)) => {
            let (begin, end) = c.range();
            begin < end
                && is_range_subset(p.mark_addr(), p.end_addr(), begin, end)
                && p.rwx.contains(c.rwx)
        }
        (Capability::Monitor(p), Capability::Monitor(c)) => {
            is_mark_anchored(p.mark, p.end, c.begin, c.end)
        }
        (Capability::Channel(p), Capability::Channel(c)) => {
            is_mark_anchored(p.mark, p.end, c.begin, c.end)
        }
        (Capability::Channel(p), Capability::Socket(c)) => {
            c.is_server() && p.mark <= c.chan && c.chan < p.end
        }
        (Capability::Socket(p), Capability::Socket(c)) => {
            p.is_server()
                && !c.is_server()
                && p.chan == c.chan
                && p.mode == c.mode
                && p.perm == c.perm
        }
        _ => false,
    }
}

/// Whether `child` lies inside the resource of `parent`, i.e. a revoke of
/// `parent` reclaims it.
///
/// Unlike [`derivable`] this ignores `mark`, since the child may already be
/// one of several handed out.
pub fn revocable(parent: &Capability, child: &Capability) -> bool {
    match (parent, child) {
        (Capability::Time(p), Capability::Time(c)) => {
            p.hart == c.hart
                && is_range_subset(p.begin as u64, p.end as u64, c.begin as u64, c.end as u64)
        }
        (Capability::Memory(p), Capability::Memory(c)) => {
            p.tag == c.tag
                && is_range_subset(p.begin as u64, p.end as u64, c.begin as u64, c.end as u64)
        }
        (Capability::Memory(p), Capability::Pmp(c)) => {
            let (begin, end) = c.range();
            is_range_subset(p.begin_addr(), p.end_addr(), begin, end)
        }
        (Capability::Monitor(p), Capability::Monitor(c)) => {
            is_range_subset(p.begin as u64, p.end as u64, c.begin as u64, c.end as u64)
        }
        (Capability::Channel(p), Capability::Channel(c)) => {
            is_range_subset(p.begin as u64, p.end as u64, c.begin as u64, c.end as u64)
        }
        (Capability::Channel(p), Capability::Socket(c)) => p.begin <= c.chan && c.chan < p.end,
        (Capability::Socket(p), Capability::Socket(c)) => {
            p.is_server() && !c.is_server() && p.chan == c.chan
        }
        _ => false,
    }
}
