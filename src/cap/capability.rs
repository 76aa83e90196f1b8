//! Capability Values
//!
//! A capability is an 8-byte tagged value. The in-memory form is the
//! [`Capability`] enum; the 64-bit form is part of the syscall ABI and is
//! produced by [`Capability::to_raw`] / [`Capability::from_raw`].
//!
//! # Layout (bit ranges, little-endian numbering)
//! ```text
//! Time     type[0..4]              hart[8..16]  bgn[16..32] mrk[32..48] end[48..64]
//! Memory   type[0..4] rwx[4..7] lck[7] tag[8..16]  bgn[16..32] mrk[32..48] end[48..64]
//! Pmp      type[0..4] rwx[4..7] used[7] slot[8..16] addr[16..64]
//! Monitor  type[0..4]                           bgn[16..32] mrk[32..48] end[48..64]
//! Channel  type[0..4]                           bgn[16..32] mrk[32..48] end[48..64]
//! Socket   type[0..4] mode[4..8] perm[8..16] chan[16..32] tag[32..64]
//! ```
//!
//! # Range Capabilities
//! Time, Memory, Monitor and Channel capabilities describe `[begin, end)`
//! with a free boundary `mark`: `[begin, mark)` is handed out to children and
//! `[mark, end)` is still available. `begin <= mark <= end` always holds.

use core::fmt;

use bitflags::bitflags;

use crate::config::{MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
use crate::pmp::napot_range;

bitflags! {
    /// Memory access permissions.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Rwx: u8 {
        const R = 1 << 0;
        const W = 1 << 1;
        const X = 1 << 2;
    }
}

bitflags! {
    /// What each side of a channel may transfer.
    ///
    /// `S*` bits govern what the server sends, `C*` bits what the client
    /// sends.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct IpcPerm: u8 {
        const SDATA = 1 << 0;
        const SCAP = 1 << 1;
        const CDATA = 1 << 2;
        const CCAP = 1 << 3;
    }
}

/// Hand-off behaviour of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IpcMode {
    /// Deliver and keep running the sender.
    NoYield = 0,
    /// Deliver and hand the hart (and the sender's deadline) to the receiver.
    Yield = 1,
}

impl IpcMode {
    /// Decode a mode field.
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::NoYield),
            1 => Some(Self::Yield),
            _ => None,
        }
    }
}

/// Capability type codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CapType {
    None = 0,
    Time = 1,
    Memory = 2,
    Pmp = 3,
    Monitor = 4,
    Channel = 5,
    Socket = 6,
}

/// A slice of schedule slots on one hart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimeCap {
    pub hart: u8,
    pub begin: u16,
    pub mark: u16,
    pub end: u16,
}

/// A range of physical memory, in 4 KiB blocks relative to `tag << 27`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemoryCap {
    pub tag: u8,
    pub rwx: Rwx,
    /// Set while a PMP capability derived from this one exists.
    pub lock: bool,
    pub begin: u16,
    pub mark: u16,
    pub end: u16,
}

impl MemoryCap {
    /// Physical address of `begin`.
    #[inline]
    pub const fn begin_addr(&self) -> u64 {
        tag_block_to_addr(self.tag, self.begin)
    }

    /// Physical address of `mark`.
    #[inline]
    pub const fn mark_addr(&self) -> u64 {
        tag_block_to_addr(self.tag, self.mark)
    }

    /// Physical address of `end`.
    #[inline]
    pub const fn end_addr(&self) -> u64 {
        tag_block_to_addr(self.tag, self.end)
    }
}

/// A NAPOT region that can be loaded into a PMP slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PmpCap {
    /// NAPOT-encoded address (48 bits).
    pub addr: u64,
    pub rwx: Rwx,
    /// Loaded into the owner's PMP shadow.
    pub used: bool,
    /// Shadow slot when `used`.
    pub slot: u8,
}

impl PmpCap {
    /// Decoded `[begin, end)` address range.
    #[inline]
    pub const fn range(&self) -> (u64, u64) {
        napot_range(self.addr)
    }
}

/// Authority over the processes `[begin, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MonitorCap {
    pub begin: u16,
    pub mark: u16,
    pub end: u16,
}

/// Authority over the IPC channels `[begin, end)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelCap {
    pub begin: u16,
    pub mark: u16,
    pub end: u16,
}

/// One end of an IPC channel: the server when `tag == 0`, a client otherwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SocketCap {
    pub chan: u16,
    pub mode: IpcMode,
    pub perm: IpcPerm,
    pub tag: u32,
}

impl SocketCap {
    /// Whether this is the server end.
    #[inline]
    pub const fn is_server(&self) -> bool {
        self.tag == 0
    }
}

/// A capability value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Capability {
    #[default]
    None,
    Time(TimeCap),
    Memory(MemoryCap),
    Pmp(PmpCap),
    Monitor(MonitorCap),
    Channel(ChannelCap),
    Socket(SocketCap),
}

/// Physical address of memory block `block` under `tag`.
#[inline]
pub const fn tag_block_to_addr(tag: u8, block: u16) -> u64 {
    ((tag as u64) << MAX_BLOCK_SIZE) + ((block as u64) << MIN_BLOCK_SIZE)
}

#[inline]
const fn field(raw: u64, lo: u32, width: u32) -> u64 {
    (raw >> lo) & ((1u64 << width) - 1)
}

const PMP_ADDR_MASK: u64 = (1 << 48) - 1;

impl Capability {
    /// A fresh Time capability over slots `[begin, end)` of `hart`.
    pub const fn time(hart: u8, begin: u16, end: u16) -> Self {
        debug_assert!(begin < end);
        Self::Time(TimeCap {
            hart,
            begin,
            mark: begin,
            end,
        })
    }

    /// A fresh Memory capability over the physical range `[begin, end)`.
    ///
    /// Both bounds must be 4 KiB aligned and lie under the same tag.
    pub const fn memory(begin: u64, end: u64, rwx: Rwx) -> Self {
        let tag = begin >> MAX_BLOCK_SIZE;
        debug_assert!(begin < end);
        debug_assert!(end <= (tag + 1) << MAX_BLOCK_SIZE);
        let offset = tag << MAX_BLOCK_SIZE;
        let begin = ((begin - offset) >> MIN_BLOCK_SIZE) as u16;
        Self::Memory(MemoryCap {
            tag: tag as u8,
            rwx,
            lock: false,
            begin,
            mark: begin,
            end: ((end - offset) >> MIN_BLOCK_SIZE) as u16,
        })
    }

    /// An unloaded PMP capability for the NAPOT address `addr`.
    pub const fn pmp(addr: u64, rwx: Rwx) -> Self {
        Self::Pmp(PmpCap {
            addr: addr & PMP_ADDR_MASK,
            rwx,
            used: false,
            slot: 0,
        })
    }

    /// A fresh Monitor capability over processes `[begin, end)`.
    pub const fn monitor(begin: u16, end: u16) -> Self {
        debug_assert!(begin < end);
        Self::Monitor(MonitorCap {
            begin,
            mark: begin,
            end,
        })
    }

    /// A fresh Channel capability over channels `[begin, end)`.
    pub const fn channel(begin: u16, end: u16) -> Self {
        debug_assert!(begin < end);
        Self::Channel(ChannelCap {
            begin,
            mark: begin,
            end,
        })
    }

    /// A socket on `chan`.
    pub const fn socket(chan: u16, mode: IpcMode, perm: IpcPerm, tag: u32) -> Self {
        Self::Socket(SocketCap {
            chan,
            mode,
            perm,
            tag,
        })
    }

    /// Type code of this capability.
    pub const fn cap_type(&self) -> CapType {
        match self {
            Self::None => CapType::None,
            Self::Time(_) => CapType::Time,
            Self::Memory(_) => CapType::Memory,
            Self::Pmp(_) => CapType::Pmp,
            Self::Monitor(_) => CapType::Monitor,
            Self::Channel(_) => CapType::Channel,
            Self::Socket(_) => CapType::Socket,
        }
    }

    #[inline]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    #[inline]
    pub const fn is_some(&self) -> bool {
        !self.is_none()
    }

    /// Encode to the 64-bit ABI form.
    pub const fn to_raw(&self) -> u64 {
        let ty = self.cap_type() as u64;
        match self {
            Self::None => 0,
            Self::Time(c) => {
                ty | (c.hart as u64) << 8
                    | (c.begin as u64) << 16
                    | (c.mark as u64) << 32
                    | (c.end as u64) << 48
            }
            Self::Memory(c) => {
                ty | (c.rwx.bits() as u64) << 4
                    | (c.lock as u64) << 7
                    | (c.tag as u64) << 8
                    | (c.begin as u64) << 16
                    | (c.mark as u64) << 32
                    | (c.end as u64) << 48
            }
            Self::Pmp(c) => {
                ty | (c.rwx.bits() as u64) << 4
                    | (c.used as u64) << 7
                    | (c.slot as u64) << 8
                    | (c.addr & PMP_ADDR_MASK) << 16
            }
            Self::Monitor(c) => {
                ty | (c.begin as u64) << 16 | (c.mark as u64) << 32 | (c.end as u64) << 48
            }
            Self::Channel(c) => {
                ty | (c.begin as u64) << 16 | (c.mark as u64) << 32 | (c.end as u64) << 48
            }
            Self::Socket(c) => {
                ty | (c.mode as u64) << 4
                    | (c.perm.bits() as u64) << 8
                    | (c.chan as u64) << 16
                    | (c.tag as u64) << 32
            }
        }
    }

    /// Decode the 64-bit ABI form.
    ///
    /// Returns `None` for unknown type codes, unknown IPC modes and
    /// permission bits outside `SDATA | SCAP | CDATA | CCAP`.
    pub const fn from_raw(raw: u64) -> Option<Self> {
        let begin = field(raw, 16, 16) as u16;
        let mark = field(raw, 32, 16) as u16;
        let end = field(raw, 48, 16) as u16;
        let cap = match field(raw, 0, 4) {
            0 => Self::None,
            1 => Self::Time(TimeCap {
                hart: field(raw, 8, 8) as u8,
                begin,
                mark,
                end,
            }),
            2 => Self::Memory(MemoryCap {
                tag: field(raw, 8, 8) as u8,
                rwx: Rwx::from_bits_truncate(field(raw, 4, 3) as u8),
                lock: field(raw, 7, 1) != 0,
                begin,
                mark,
                end,
            }),
            3 => Self::Pmp(PmpCap {
                addr: field(raw, 16, 48),
                rwx: Rwx::from_bits_truncate(field(raw, 4, 3) as u8),
                used: field(raw, 7, 1) != 0,
                slot: field(raw, 8, 8) as u8,
            }),
            4 => Self::Monitor(MonitorCap { begin, mark, end }),
            5 => Self::Channel(ChannelCap { begin, mark, end }),
            6 => {
                let mode = match IpcMode::from_bits(field(raw, 4, 4) as u8) {
                    Some(mode) => mode,
                    None => return None,
                };
                let perm = match IpcPerm::from_bits(field(raw, 8, 8) as u8) {
                    Some(perm) => perm,
                    None => return None,
                };
                Self::Socket(SocketCap {
                    chan: field(raw, 16, 16) as u16,
                    mode,
                    perm,
                    tag: field(raw, 32, 32) as u32,
                })
            }
            _ => return None,
        };
        Some(cap)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "NONE{{}}"),
            Self::Time(c) => write!(
                f,
                "TIME{{hart={},bgn={},end={},mrk={}}}",
                c.hart, c.begin, c.end, c.mark
            ),
            Self::Memory(c) => write!(
                f,
                "MEMORY{{bgn={:#x},end={:#x},mrk={:#x},rwx={},lck={}}}",
                c.begin_addr(),
                c.end_addr(),
                c.mark_addr(),
                c.rwx.bits(),
                c.lock as u8
            ),
            Self::Pmp(c) => {
                let (begin, end) = c.range();
                write!(
                    f,
                    "PMP{{bgn={:#x},end={:#x},rwx={},used={},slot={}}}",
                    begin,
                    end,
                    c.rwx.bits(),
                    c.used as u8,
                    c.slot
                )
            }
            Self::Monitor(c) => {
                write!(f, "MONITOR{{bgn={},end={},mrk={}}}", c.begin, c.end, c.mark)
            }
            Self::Channel(c) => {
                write!(f, "CHANNEL{{bgn={},end={},mrk={}}}", c.begin, c.end, c.mark)
            }
            Self::Socket(c) => write!(
                f,
                "SOCKET{{chan={},tag={},perm={},mode={}}}",
                c.chan,
                c.tag,
                c.perm.bits(),
                c.mode as u8
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pmp::napot_encode;

    #[test]
    fn test_time_layout() {
        let cap = Capability::time(2, 4, 64);
        assert_eq!(cap.to_raw(), 0x0040_0004_0004_0201);
    }

    #[test]
    fn test_memory_from_addresses() {
        let cap = Capability::memory(0x8000_0000, 0x8010_0000, Rwx::R | Rwx::W);
        let Capability::Memory(mem) = cap else {
            panic!("expected memory capability");
        };
        assert_eq!(mem.tag, 0x10);
        assert_eq!(mem.begin, 0);
        assert_eq!(mem.end, 0x100);
        assert_eq!(mem.begin_addr(), 0x8000_0000);
        assert_eq!(mem.end_addr(), 0x8010_0000);
        assert_eq!(cap.to_raw() & 0xFF, 0x32);
        assert_eq!(Capability::from_raw(cap.to_raw()), Some(cap));
    }

    #[test]
    fn test_pmp_fields() {
        let addr = napot_encode(0x8000_0000, 0x1000);
        let mut pmp = PmpCap {
            addr,
            rwx: Rwx::R | Rwx::X,
            used: true,
            slot: 5,
        };
        let raw = Capability::Pmp(pmp).to_raw();
        assert_eq!(raw & 0xF, 3);
        assert_eq!((raw >> 4) & 0x7, 5);
        assert_eq!((raw >> 7) & 1, 1);
        assert_eq!((raw >> 8) & 0xFF, 5);
        assert_eq!(raw >> 16, addr);
        pmp.used = false;
        pmp.slot = 0;
        assert_eq!(Capability::pmp(addr, Rwx::R | Rwx::X), Capability::Pmp(pmp));
    }

    #[test]
    fn test_socket_layout() {
        let cap = Capability::socket(3, IpcMode::Yield, IpcPerm::SDATA | IpcPerm::CDATA, 5);
        assert_eq!(cap.to_raw(), 0x0000_0005_0003_0516);
        assert_eq!(Capability::from_raw(cap.to_raw()), Some(cap));
    }

    #[test]
    fn test_from_raw_rejects_garbage() {
        // Unknown type code.
        assert_eq!(Capability::from_raw(0xF), None);
        // Socket with mode 2.
        assert_eq!(Capability::from_raw(0x26), None);
        // Socket with permission bit 4.
        assert_eq!(Capability::from_raw(0x1006), None);
        assert_eq!(Capability::from_raw(0), Some(Capability::None));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Capability::time(0, 0, 64).to_string(),
            "TIME{hart=0,bgn=0,end=64,mrk=0}"
        );
        assert_eq!(
            Capability::socket(3, IpcMode::NoYield, IpcPerm::empty(), 5).to_string(),
            "SOCKET{chan=3,tag=5,perm=0,mode=0}"
        );
    }
}
