//! Socket operations: send, receive and their combinations.
//!
//! Every operation runs under the kernel lock and is called on behalf of the
//! process holding the socket capability at `sock`, which must be running on
//! the calling hart.

use log::{debug, trace};

use super::{Msg, Next, Waiter};
use crate::cap::{CapSlot, Capability, IpcMode, IpcPerm, SocketCap};
use crate::error::{Error, Result};
use crate::kernel::KernelGuard;
use crate::platform::Platform;
use crate::proc::{Pid, Reg, StateFlags};

impl<'a, P: Platform> KernelGuard<'a, P> {
    fn socket(&self, sock: CapSlot) -> Result<SocketCap> {
        match self.state.table.read(sock)? {
            Capability::Socket(s) => Ok(s),
            _ => Err(Error::InvalidSocket),
        }
    }

    fn is_flagged(&self, pid: Pid, flag: StateFlags) -> bool {
        self.kernel.proc(pid).state_word() & flag.bits() != 0
    }

    /// Send a message on `sock`: a client sends to the waiting server, a
    /// server replies to the waiting client.
    pub fn send(&mut self, sock: CapSlot, msg: &Msg) -> Result<Next> {
        let socket = self.socket(sock)?;
        let cap_buf = CapSlot::new(sock.pid(), msg.cap_buf).ok_or(Error::InvalidIndex)?;
        self.do_send(sock.pid(), &socket, msg, cap_buf)
    }

    /// Reply to the client waiting on the server socket `sock`.
    pub fn reply(&mut self, sock: CapSlot, msg: &Msg) -> Result<Next> {
        if !self.socket(sock)?.is_server() {
            return Err(Error::InvalidSocket);
        }
        self.send(sock, msg)
    }

    /// Wait for a client on the server socket `sock`. A capability sent
    /// along lands in slot `cap_buf` of the caller.
    pub fn recv(&mut self, sock: CapSlot, cap_buf: usize) -> Result<Next> {
        let socket = self.socket(sock)?;
        if !socket.is_server() {
            return Err(Error::InvalidSocket);
        }
        let caller = sock.pid();
        if self.is_flagged(caller, StateFlags::SUSPENDED) {
            return Err(Error::Suspended);
        }
        let cap_buf = CapSlot::new(caller, cap_buf).ok_or(Error::InvalidIndex)?;
        if socket.perm.contains(IpcPerm::CCAP) && self.state.table.get(cap_buf).is_some() {
            return Err(Error::DstOccupied);
        }
        self.wait_server(&socket, caller, cap_buf);
        Ok(Next::Blocked(None))
    }

    /// Send on the client socket `sock` and wait for the reply.
    ///
    /// In `Yield` mode the hart goes straight to the server.
    pub fn call(&mut self, sock: CapSlot, msg: &Msg) -> Result<Next> {
        let socket = self.socket(sock)?;
        if socket.is_server() {
            return Err(Error::InvalidSocket);
        }
        let caller = sock.pid();
        let cap_buf = CapSlot::new(caller, msg.cap_buf).ok_or(Error::InvalidIndex)?;
        if msg.send_cap && !socket.perm.contains(IpcPerm::CCAP) {
            return Err(Error::InvalidSocket);
        }
        if socket.perm.contains(IpcPerm::SCAP)
            && !msg.send_cap
            && self.state.table.get(cap_buf).is_some()
        {
            return Err(Error::DstOccupied);
        }

        let next = self.do_send(caller, &socket, msg, cap_buf)?;
        self.state.channels.get_mut(socket.chan).client = Some(Waiter {
            pid: caller,
            cap_buf,
        });
        let proc = self.kernel.proc(caller);
        proc.ipc_wait(socket.chan as u64);
        proc.set_reg(Reg::T0, Error::Timeout.code());
        match next {
            Next::Yield(server) => Ok(Next::Blocked(Some(server))),
            _ => {
                proc.set_timeout(u64::MAX);
                Ok(Next::Blocked(None))
            }
        }
    }

    /// Reply on the server socket `sock`, then wait for the next client.
    ///
    /// A reply nobody is waiting for is dropped, together with the
    /// capability it would have carried.
    pub fn replyrecv(&mut self, sock: CapSlot, msg: &Msg) -> Result<Next> {
        let socket = self.socket(sock)?;
        if !socket.is_server() {
            return Err(Error::InvalidSocket);
        }
        let caller = sock.pid();
        let cap_buf = CapSlot::new(caller, msg.cap_buf).ok_or(Error::InvalidIndex)?;
        if msg.send_cap && !socket.perm.contains(IpcPerm::SCAP) {
            return Err(Error::InvalidSocket);
        }
        if socket.perm.contains(IpcPerm::CCAP)
            && !msg.send_cap
            && self.state.table.get(cap_buf).is_some()
        {
            return Err(Error::DstOccupied);
        }

        let next = match self.do_send(caller, &socket, msg, cap_buf) {
            Ok(next) => next,
            Err(Error::NoReceiver) => {
                if msg.send_cap && self.state.table.get(cap_buf).is_some() {
                    self.cap_delete(cap_buf)?;
                }
                Next::Caller
            }
            Err(err) => return Err(err),
        };
        self.wait_server(&socket, caller, cap_buf);
        match next {
            Next::Yield(client) => Ok(Next::Blocked(Some(client))),
            _ => Ok(Next::Blocked(None)),
        }
    }

    /// `replyrecv` for servers, `call` for clients.
    pub fn sendrecv(&mut self, sock: CapSlot, msg: &Msg) -> Result<Next> {
        if self.socket(sock)?.is_server() {
            self.replyrecv(sock, msg)
        } else {
            self.call(sock, msg)
        }
    }

    fn wait_server(&mut self, socket: &SocketCap, caller: Pid, cap_buf: CapSlot) {
        self.state.channels.get_mut(socket.chan).server = Some(Waiter {
            pid: caller,
            cap_buf,
        });
        let proc = self.kernel.proc(caller);
        proc.set_timeout(u64::MAX);
        proc.ipc_wait(socket.chan as u64);
        proc.set_reg(Reg::T0, Error::Timeout.code());
        trace!("ipc pid={caller} waiting on channel {}", socket.chan);
    }

    /// Deliver `msg` to the process waiting at the other end of `socket`.
    ///
    /// Nothing is written unless the whole message, capability included,
    /// can be delivered.
    fn do_send(
        &mut self,
        caller: Pid,
        socket: &SocketCap,
        msg: &Msg,
        cap_buf: CapSlot,
    ) -> Result<Next> {
        let (cap_perm, data_perm) = if socket.is_server() {
            (IpcPerm::SCAP, IpcPerm::SDATA)
        } else {
            (IpcPerm::CCAP, IpcPerm::CDATA)
        };
        if msg.send_cap && !socket.perm.contains(cap_perm) {
            return Err(Error::InvalidSocket);
        }
        if self.is_flagged(caller, StateFlags::SUSPENDED) {
            return Err(Error::Suspended);
        }

        let channel = self.state.channels.get(socket.chan);
        let target = if socket.is_server() {
            channel.client
        } else {
            channel.server
        };
        let Some(target) = target else {
            return Err(Error::NoReceiver);
        };
        if socket.mode == IpcMode::Yield && self.is_flagged(target.pid, StateFlags::SUSPENDED) {
            return Err(Error::Suspended);
        }
        if msg.send_cap {
            if self.state.table.get(cap_buf).is_none() {
                return Err(Error::SrcEmpty);
            }
            if self.state.table.get(target.cap_buf).is_some() {
                return Err(Error::DstOccupied);
            }
        }

        let deadline = self.kernel.platform().timeout(self.hart);
        let now = self.kernel.platform().time();
        let receiver = self.kernel.proc(target.pid);
        if !receiver.ipc_acquire(socket.chan as u64, now, deadline) {
            debug!("ipc channel {}: pid={} not receiving", socket.chan, target.pid);
            return Err(Error::NoReceiver);
        }

        let cap = if msg.send_cap {
            self.move_cap(cap_buf, target.cap_buf)?
        } else {
            Capability::None
        };
        let data = if socket.perm.contains(data_perm) {
            msg.data
        } else {
            [0; 4]
        };
        {
            let mut ctx = receiver.context();
            ctx.regs[Reg::T0] = 0;
            ctx.regs[Reg::A0] = socket.tag as u64;
            ctx.regs[Reg::A1] = cap.to_raw();
            for (i, word) in data.iter().enumerate() {
                ctx.regs[Reg::arg(2 + i)] = *word;
            }
        }

        let channel = self.state.channels.get_mut(socket.chan);
        if socket.is_server() {
            channel.client = None;
        } else {
            channel.server = None;
        }
        trace!(
            "ipc channel {}: pid={caller} -> pid={}",
            socket.chan,
            target.pid
        );

        match socket.mode {
            IpcMode::Yield => {
                receiver.set_timeout(self.kernel.proc(caller).timeout());
                Ok(Next::Yield(target.pid))
            }
            IpcMode::NoYield => {
                receiver.release();
                Ok(Next::Caller)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CHAN_CNT, PROC_CNT, SLOT_CNT};
    use crate::kernel::Kernel;
    use crate::proc::ProcState;
    use crate::testing::MockPlatform;

    const SERVER: Pid = 1;
    const CLIENT: Pid = 2;

    fn slot(pid: Pid, idx: usize) -> CapSlot {
        CapSlot::new(pid, idx).unwrap()
    }

    /// Server socket on channel 3 in pid 1 slot 0, client with tag 5 in
    /// pid 2 slot 0. Both processes are running.
    fn setup(mode: IpcMode, perm: IpcPerm) -> Kernel<MockPlatform> {
        let kernel = Kernel::new(MockPlatform::new());
        kernel
            .init(&[
                Capability::time(0, 0, SLOT_CNT as u16),
                Capability::monitor(0, PROC_CNT as u16),
                Capability::channel(0, CHAN_CNT as u16),
            ])
            .unwrap();
        {
            let mut guard = kernel.lock(0).unwrap();
            guard
                .cap_derive(slot(0, 2), slot(SERVER, 0), Capability::socket(3, mode, perm, 0))
                .unwrap();
            guard
                .cap_derive(slot(SERVER, 0), slot(CLIENT, 0), Capability::socket(3, mode, perm, 5))
                .unwrap();
        }
        kernel.proc(SERVER).reset(StateFlags::BUSY);
        kernel.proc(CLIENT).reset(StateFlags::BUSY);
        kernel
    }

    fn msg(cap_buf: usize, send_cap: bool, data: [u64; 4]) -> Msg {
        Msg {
            cap_buf,
            send_cap,
            data,
        }
    }

    fn server_waits(kernel: &Kernel<MockPlatform>) {
        let mut guard = kernel.lock(0).unwrap();
        assert_eq!(guard.recv(slot(SERVER, 0), 1), Ok(Next::Blocked(None)));
        drop(guard);
        kernel.proc(SERVER).release();
        assert_eq!(
            kernel.proc(SERVER).state(),
            ProcState::Blocked {
                chan: 3,
                busy: false
            }
        );
    }

    #[test]
    fn test_recv_then_send_delivers() {
        let kernel = setup(IpcMode::Yield, IpcPerm::all());
        server_waits(&kernel);
        assert_eq!(kernel.proc(SERVER).reg(Reg::T0), Error::Timeout.code());

        kernel.proc(CLIENT).set_timeout(1234);
        let mut guard = kernel.lock(0).unwrap();
        let next = guard.send(slot(CLIENT, 0), &msg(1, false, [1, 2, 3, 4]));
        assert_eq!(next, Ok(Next::Yield(SERVER)));

        let server = kernel.proc(SERVER);
        assert_eq!(server.state(), ProcState::Busy);
        assert_eq!(server.reg(Reg::T0), 0);
        assert_eq!(server.reg(Reg::A0), 5);
        assert_eq!(server.reg(Reg::A1), 0);
        assert_eq!(
            [server.reg(Reg::A2), server.reg(Reg::A3), server.reg(Reg::A4), server.reg(Reg::A5)],
            [1, 2, 3, 4]
        );
        assert_eq!(server.timeout(), 1234);
        assert!(guard.channels().get(3).server.is_none());
    }

    #[test]
    fn test_send_without_receiver() {
        let kernel = setup(IpcMode::Yield, IpcPerm::all());
        let mut guard = kernel.lock(0).unwrap();
        assert_eq!(
            guard.send(slot(CLIENT, 0), &msg(1, false, [0; 4])),
            Err(Error::NoReceiver)
        );
        // Registered but still running: not yet receiving.
        assert_eq!(guard.recv(slot(SERVER, 0), 1), Ok(Next::Blocked(None)));
        assert_eq!(
            guard.send(slot(CLIENT, 0), &msg(1, false, [0; 4])),
            Err(Error::NoReceiver)
        );
    }

    #[test]
    fn test_suspended_server() {
        let kernel = setup(IpcMode::Yield, IpcPerm::all());
        server_waits(&kernel);
        kernel.proc(SERVER).suspend();
        assert_eq!(kernel.proc(SERVER).reg(Reg::T0), Error::Suspended.code());
        let mut guard = kernel.lock(0).unwrap();
        assert_eq!(
            guard.send(slot(CLIENT, 0), &msg(1, false, [0; 4])),
            Err(Error::Suspended)
        );
    }

    #[test]
    fn test_capability_transfer_is_atomic() {
        let kernel = setup(IpcMode::NoYield, IpcPerm::all());
        server_waits(&kernel);
        let mut guard = kernel.lock(0).unwrap();
        guard
            .cap_derive(slot(0, 1), slot(CLIENT, 1), Capability::monitor(0, 2))
            .unwrap();
        // Occupy the server's buffer behind its back.
        guard
            .cap_derive(slot(0, 1), slot(SERVER, 1), Capability::monitor(2, 3))
            .unwrap();

        assert_eq!(
            guard.send(slot(CLIENT, 0), &msg(1, true, [7; 4])),
            Err(Error::DstOccupied)
        );
        assert_eq!(
            kernel.proc(SERVER).state(),
            ProcState::Blocked {
                chan: 3,
                busy: false
            }
        );
        assert_eq!(kernel.proc(SERVER).reg(Reg::A2), 0);
        assert!(guard.cap_read(slot(CLIENT, 1)).is_ok());

        guard.cap_delete(slot(SERVER, 1)).unwrap();
        assert_eq!(
            guard.send(slot(CLIENT, 0), &msg(1, true, [7; 4])),
            Ok(Next::Caller)
        );
        assert_eq!(guard.cap_read(slot(CLIENT, 1)), Err(Error::Empty));
        let moved = guard.cap_read(slot(SERVER, 1)).unwrap();
        assert_eq!(moved, Capability::monitor(0, 2));
        assert_eq!(kernel.proc(SERVER).reg(Reg::A1), moved.to_raw());
        assert_eq!(kernel.proc(SERVER).state(), ProcState::Ready);
    }

    #[test]
    fn test_permissions() {
        let kernel = setup(IpcMode::Yield, IpcPerm::SDATA);
        server_waits(&kernel);
        let mut guard = kernel.lock(0).unwrap();
        assert_eq!(
            guard.recv(slot(CLIENT, 0), 1),
            Err(Error::InvalidSocket)
        );
        assert_eq!(
            guard.send(slot(CLIENT, 0), &msg(1, true, [0; 4])),
            Err(Error::InvalidSocket)
        );
        // Clients without CDATA send no data.
        assert_eq!(
            guard.send(slot(CLIENT, 0), &msg(1, false, [9; 4])),
            Ok(Next::Yield(SERVER))
        );
        assert_eq!(kernel.proc(SERVER).reg(Reg::A0), 5);
        assert_eq!(kernel.proc(SERVER).reg(Reg::A2), 0);
        assert_eq!(guard.reply(slot(CLIENT, 0), &msg(1, false, [0; 4])), Err(Error::InvalidSocket));
    }

    #[test]
    fn test_call_and_replyrecv() {
        let kernel = setup(IpcMode::Yield, IpcPerm::all());
        server_waits(&kernel);
        kernel.proc(CLIENT).set_timeout(5000);

        let mut guard = kernel.lock(0).unwrap();
        let next = guard.call(slot(CLIENT, 0), &msg(1, false, [1, 1, 1, 1]));
        assert_eq!(next, Ok(Next::Blocked(Some(SERVER))));
        assert_eq!(kernel.proc(CLIENT).reg(Reg::T0), Error::Timeout.code());
        assert_eq!(kernel.proc(SERVER).timeout(), 5000);
        drop(guard);
        kernel.proc(CLIENT).release();
        assert_eq!(
            kernel.proc(CLIENT).state(),
            ProcState::Blocked {
                chan: 3,
                busy: false
            }
        );

        let mut guard = kernel.lock(0).unwrap();
        let next = guard.replyrecv(slot(SERVER, 0), &msg(1, false, [2, 2, 2, 2]));
        assert_eq!(next, Ok(Next::Blocked(Some(CLIENT))));
        let client = kernel.proc(CLIENT);
        assert_eq!(client.state(), ProcState::Busy);
        assert_eq!(client.reg(Reg::T0), 0);
        assert_eq!(client.reg(Reg::A0), 0);
        assert_eq!(client.reg(Reg::A5), 2);
        assert_eq!(
            guard.channels().get(3).server.map(|w| w.pid),
            Some(SERVER)
        );
        assert!(guard.channels().get(3).client.is_none());
        assert_eq!(kernel.proc(SERVER).timeout(), u64::MAX);
    }

    #[test]
    fn test_replyrecv_drops_unclaimed_capability() {
        let kernel = setup(IpcMode::Yield, IpcPerm::all());
        let mut guard = kernel.lock(0).unwrap();
        guard
            .cap_derive(slot(0, 1), slot(SERVER, 1), Capability::monitor(0, 2))
            .unwrap();
        let next = guard.replyrecv(slot(SERVER, 0), &msg(1, true, [0; 4]));
        assert_eq!(next, Ok(Next::Blocked(None)));
        assert_eq!(guard.cap_read(slot(SERVER, 1)), Err(Error::Empty));
        assert!(guard.channels().get(3).server.is_some());
    }

    #[test]
    fn test_replyrecv_with_empty_buffer_still_waits() {
        let kernel = setup(IpcMode::Yield, IpcPerm::all());
        let mut guard = kernel.lock(0).unwrap();
        let next = guard.replyrecv(slot(SERVER, 0), &msg(1, true, [0; 4]));
        assert_eq!(next, Ok(Next::Blocked(None)));
        assert_eq!(
            guard.channels().get(3).server.map(|w| w.pid),
            Some(SERVER)
        );
        assert_eq!(kernel.proc(SERVER).reg(Reg::T0), Error::Timeout.code());
    }

    #[test]
    fn test_noyield_send_checks_service_time() {
        let kernel = setup(IpcMode::NoYield, IpcPerm::all());
        server_waits(&kernel);
        kernel.proc(SERVER).set_reg(Reg::Servtime, 1000);
        kernel.platform().set_time(100);
        kernel.platform().set_timeout(0, 200);
        let mut guard = kernel.lock(0).unwrap();
        assert_eq!(
            guard.send(slot(CLIENT, 0), &msg(1, false, [0; 4])),
            Err(Error::NoReceiver)
        );
        assert_eq!(
            kernel.proc(SERVER).state(),
            ProcState::Blocked {
                chan: 3,
                busy: false
            }
        );

        kernel.platform().set_timeout(0, 2000);
        assert_eq!(
            guard.send(slot(CLIENT, 0), &msg(1, false, [0; 4])),
            Ok(Next::Caller)
        );
    }

    #[test]
    fn test_sendrecv_dispatches_on_role() {
        let kernel = setup(IpcMode::NoYield, IpcPerm::all());
        server_waits(&kernel);
        let mut guard = kernel.lock(0).unwrap();
        // NoYield call: the server is released and the client waits
        // without a deadline.
        let next = guard.sendrecv(slot(CLIENT, 0), &msg(1, false, [0; 4]));
        assert_eq!(next, Ok(Next::Blocked(None)));
        assert_eq!(kernel.proc(SERVER).state(), ProcState::Ready);
        assert_eq!(kernel.proc(CLIENT).timeout(), u64::MAX);
        assert_eq!(
            guard.channels().get(3).client.map(|w| w.pid),
            Some(CLIENT)
        );
    }
}
