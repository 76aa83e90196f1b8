//! Synchronous IPC
//!
//! Rendezvous message passing over channels. A channel has at most one
//! waiting server and one waiting client; the registry below records who is
//! waiting and where an incoming capability should land. Processes move
//! through the [`crate::proc`] state machine to block and to be handed
//! messages.
//!
//! # Roles
//! - The server end of a channel is a socket with `tag == 0`; it `recv`s,
//!   `reply`s and `replyrecv`s
//! - Client ends carry a non-zero tag that the server sees in `a0`; they
//!   `send` and `call`
//!
//! # Delivery
//! A delivered message overwrites the receiver's `t0..` registers:
//! `t0 = 0`, `a0 = tag`, `a1 = capability (raw, 0 if none)`, `a2..a5 = data`.

mod socket;

use crate::cap::{CapSlot, SocketCap};
use crate::config::CHAN_CNT;
use crate::proc::Pid;

/// A message to send.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Msg {
    /// Capability index in the caller's table: the capability to send, and
    /// where a capability received in return is placed.
    pub cap_buf: usize,
    /// Whether to transfer the capability at `cap_buf`.
    pub send_cap: bool,
    pub data: [u64; 4],
}

/// What the calling hart should run after an IPC operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Next {
    /// Resume the caller.
    Caller,
    /// The caller stays runnable; hand the hart to this (already acquired)
    /// process.
    Yield(Pid),
    /// The caller is now blocked. Run the given (already acquired) process,
    /// or ask the scheduler when `None`.
    Blocked(Option<Pid>),
}

/// A process waiting on a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Waiter {
    pub pid: Pid,
    /// Where a capability sent to the waiter goes.
    pub cap_buf: CapSlot,
}

/// Registry entry of one channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Channel {
    pub server: Option<Waiter>,
    pub client: Option<Waiter>,
}

/// The channel registry. Only touched under the kernel lock.
#[derive(Debug)]
pub struct Channels {
    channels: [Channel; CHAN_CNT],
}

impl Channels {
    pub const fn new() -> Self {
        const EMPTY: Channel = Channel {
            server: None,
            client: None,
        };
        Self {
            channels: [EMPTY; CHAN_CNT],
        }
    }

    #[inline]
    pub fn get(&self, chan: u16) -> &Channel {
        &self.channels[chan as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, chan: u16) -> &mut Channel {
        &mut self.channels[chan as usize]
    }

    /// Forget waiters bound to `sock`, which `owner` is giving up.
    ///
    /// A server socket leaving its owner clears the whole channel; a client
    /// socket only clears the client entry if `owner` is the one waiting.
    pub fn clear(&mut self, sock: &SocketCap, owner: Pid) {
        let channel = self.get_mut(sock.chan);
        if sock.is_server() {
            *channel = Channel::default();
        } else if channel.client.is_some_and(|w| w.pid == owner) {
            channel.client = None;
        }
    }
}

impl Default for Channels {
    fn default() -> Self {
        Self::new()
    }
}
