//! The `Sockets` multiplexer: BSD-shaped operations plus four-tuple/
//! listen-port segment routing, built on top of `tcp::engine::TcpEngine`
//! and the plain UDP header codec.
//!
//! Every blocking-shaped call (`accept`, `connect`, `recv`, a partially-sent
//! `send`) is expressed here as a non-blocking poll: a capsule never parks
//! the processor, so "block until woken" becomes "return `Pending`/
//! `Err(EBUSY)` and let the board's scheduler loop re-invoke the same call
//! when the next `SocketEvent` (`Ack`, `Retry`, `Timeout`, `Close`,
//! `DataAvailable`) arrives from the TCP segment handler or the
//! retransmission timer." This mirrors the cooperative, message-driven
//! shape RIOT's `socket.c` achieves with a blocking `thread_wakeup`/mailbox
//! pair (`original_source/sys/net/destiny/socket.c`), minus the actual OS
//! thread.

use core::task::Poll;

use kernel::ReturnCode;

use crate::net::ip6::Address;
use crate::net::tcp::engine::{TcpAction, TcpEngine, TimerAction};
use crate::net::tcp::header::{self, TcpHeader, FLAG_ACK, FLAG_FIN, FLAG_SYN};
use crate::net::tcp::tcb::{Tcb, TcpState};
use crate::net::udp::{self, UdpHeader};

use crate::socket::table::{RECV_BUFFER_SIZE, SockProtocol, SockType, Socket, SocketId, SocketTable, NUM_SOCKETS};

/// Baseline ephemeral source port (RIOT's `EPHEMERAL_PORTS`; `connect`'s
/// default starting value before any port has been claimed).
pub const EPHEMERAL_BASE_PORT: u16 = 49152;

/// What `handle_tcp_segment` found and, if applicable, what to send back.
/// The caller (the TCP segment-handler task) is responsible for
/// actually transmitting any carried `TcpHeader` and for waking whichever
/// `SocketEvent` a blocked `accept`/`recv`/`send` is polling for.
#[derive(Copy, Clone, Debug)]
pub enum SocketAction {
    /// Checksum failure, unmatched socket, or any other wire-format
    /// problem; counted and dropped silently.
    Dropped(ReturnCode),
    /// No socket or listener matched this four-tuple.
    NoMatch,
    /// Nothing socket-visible changed (e.g. a plain continuing ACK with no
    /// new data).
    None,
    /// A SYN arrived at `listener`; `child` was allocated in `SynRcvd` and
    /// `reply` (SYN+ACK) should be sent.
    NewConnection { listener: SocketId, child: SocketId, reply: TcpHeader },
    /// `socket`'s connection reached `Established`; wake a blocked
    /// `connect` or `accept`.
    Established { socket: SocketId },
    /// `len` bytes now sit in `socket`'s receive buffer; send `reply`
    /// (ACK) and wake a blocked `recv`.
    Delivered { socket: SocketId, len: usize, reply: TcpHeader },
    /// The peer sent FIN; wake blocked readers with EOF and send `reply`
    /// (FIN+ACK).
    ClosedByPeer { socket: SocketId, reply: TcpHeader },
    /// Send `reply` with no other socket-visible change (the
    /// simultaneous-close and FinWait2 legs of this module's table).
    Reply { socket: SocketId, reply: TcpHeader },
    /// The connection fully closed; `socket`'s table slot was freed.
    Freed { socket: SocketId },
}

/// One stop-and-wait segment a `send` call should transmit next.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SendSegment {
    pub seq_nr: u32,
    pub offset: usize,
    pub len: usize,
}

/// What `send_poll` wants the caller to do next.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SendOutcome {
    /// The in-flight segment has not been acknowledged yet; keep waiting
    /// for an `Ack`/`Retry`/`Timeout` message.
    WaitForAck,
    /// Transmit this segment, then wait for an `Ack`/`Retry`/`Timeout`.
    Transmit(SendSegment),
    /// Every byte of the `send` call has been acknowledged; returns the
    /// total byte count (`send`'s "returns the bytes sent").
    Complete(usize),
}

/// The socket multiplexer: a fixed `SocketTable` plus the `TcpEngine`
/// driving every `Stream` socket's `Tcb`.
pub struct Sockets<'a> {
    table: SocketTable<'a>,
    tcp: TcpEngine<'a>,
}

impl<'a> Sockets<'a> {
    pub fn new(sockets: &'a [Socket], tcbs: &'a [Tcb]) -> Sockets<'a> {
        Sockets {
            table: SocketTable::new(sockets),
            tcp: TcpEngine::new(tcbs),
        }
    }

    fn next_ephemeral_port(&self, protocol: SockProtocol) -> u16 {
        match self.table.highest_bound_port(protocol) {
            Some(port) if port >= EPHEMERAL_BASE_PORT => port.saturating_add(1),
            _ => EPHEMERAL_BASE_PORT,
        }
    }

    /// The receive window to advertise for `socket`: however much of its
    /// fixed-size buffer is currently free. Derived fresh from the buffer
    /// fill rather than tracked incrementally, so there is no "subtract
    /// from a field already zeroed" ordering hazard to get
    /// wrong in the first place.
    fn advertised_window(socket: &Socket) -> u16 {
        (RECV_BUFFER_SIZE - socket.received_len()) as u16
    }

    // ---- socket(), bind(), listen(), accept(), connect(), close() ----

    pub fn socket(&self, sock_type: SockType, protocol: SockProtocol) -> Result<SocketId, ReturnCode> {
        match (sock_type, protocol) {
            (SockType::Stream, SockProtocol::Tcp) | (SockType::Dgram, SockProtocol::Udp) => {}
            _ => return Err(ReturnCode::EINVAL),
        }
        self.table.allocate(sock_type, protocol)
    }

    /// Rejects if any other socket of the same type already uses `port`
    /// (`bind`).
    pub fn bind(&self, id: SocketId, addr: Address, port: u16) -> Result<(), ReturnCode> {
        let socket = self.table.get(id).ok_or(ReturnCode::EINVAL)?;
        if self.table.port_in_use(socket.sock_type.get(), port, id) {
            return Err(ReturnCode::AlreadyInUse);
        }
        socket.local_addr.set(addr);
        socket.local_port.set(port);
        Ok(())
    }

    /// Stream-only; requires a prior `bind` (`listen`).
    pub fn listen(&self, id: SocketId, _backlog: usize) -> Result<(), ReturnCode> {
        let socket = self.table.get(id).ok_or(ReturnCode::EINVAL)?;
        if socket.sock_type.get() != SockType::Stream {
            return Err(ReturnCode::Unsupported);
        }
        if socket.local_port.get() == 0 {
            return Err(ReturnCode::EINVAL);
        }
        let tcb_idx = self.tcb_for(socket)?;
        self.tcp.listen(tcb_idx, socket.local_addr.get(), socket.local_port.get())
    }

    /// Polls whether a child connection has reached `Established`: `accept`
    /// blocks until a child TCB reaches `Established` for this listener's
    /// local port.
    pub fn accept_poll(&self, id: SocketId) -> Poll<Result<SocketId, ReturnCode>> {
        let socket = match self.table.get(id) {
            Some(socket) => socket,
            None => return Poll::Ready(Err(ReturnCode::EINVAL)),
        };
        if let Some(child_id) = socket.pending_child.get() {
            if let Some(child) = self.table.get(child_id) {
                if let Some(child_tcb) = child.tcb_idx.get() {
                    if self.tcp.tcb(child_tcb).state.get() == TcpState::Established {
                        socket.pending_child.set(None);
                        return Poll::Ready(Ok(child_id));
                    }
                }
            }
        }
        Poll::Pending
    }

    /// Picks a free ephemeral source port, builds the SYN, and moves the
    /// socket's `Tcb` to `SynSent` (`connect`). The caller
    /// transmits the returned header and drives the handshake forward
    /// with `handle_tcp_segment`/`connect_poll` as replies arrive.
    pub fn connect(&self, id: SocketId, local_addr: Address, foreign_addr: Address, foreign_port: u16, iss: u32, now: u32) -> Result<TcpHeader, ReturnCode> {
        let socket = self.table.get(id).ok_or(ReturnCode::EINVAL)?;
        if socket.sock_type.get() != SockType::Stream {
            return Err(ReturnCode::Unsupported);
        }
        let tcb_idx = self.tcb_for(socket)?;
        let local_port = self.next_ephemeral_port(SockProtocol::Tcp);
        socket.local_addr.set(local_addr);
        socket.local_port.set(local_port);
        socket.foreign_addr.set(foreign_addr);
        socket.foreign_port.set(foreign_port);
        let mut syn = self.tcp.connect(tcb_idx, local_addr, local_port, foreign_addr, foreign_port, iss, now);
        syn.cksum = header::compute_checksum(&local_addr, &foreign_addr, &syn, &[]);
        Ok(syn)
    }

    /// Polls whether `connect`'s handshake has completed, failed via
    /// `Timeout`, or is still in flight.
    pub fn connect_poll(&self, id: SocketId) -> Poll<Result<(), ReturnCode>> {
        let socket = match self.table.get(id) {
            Some(socket) => socket,
            None => return Poll::Ready(Err(ReturnCode::EINVAL)),
        };
        match socket.tcb_idx.get() {
            None => Poll::Ready(Err(ReturnCode::NotConnected)),
            Some(tcb_idx) => match self.tcp.tcb(tcb_idx).state.get() {
                TcpState::Established => Poll::Ready(Ok(())),
                TcpState::SynSent | TcpState::SynRcvd => Poll::Pending,
                TcpState::Closed => Poll::Ready(Err(ReturnCode::Timeout)),
                _ => Poll::Ready(Ok(())),
            },
        }
    }

    fn tcb_for(&self, socket: &Socket) -> Result<usize, ReturnCode> {
        match socket.tcb_idx.get() {
            Some(idx) => Ok(idx),
            None => {
                let idx = self.tcp.allocate().ok_or(ReturnCode::ENOMEM)?;
                socket.tcb_idx.set(Some(idx));
                Ok(idx)
            }
        }
    }

    /// `Dgram` sockets are freed immediately; `Stream` sockets still
    /// `Established` (or past it) are driven into the close sequence and
    /// only freed once the engine reports `FreeSocket` from
    /// `handle_tcp_segment`; a socket that never got past `Listen`/
    /// `SynSent`/`SynRcvd` is freed immediately since there is no peer to
    /// notify.
    pub fn close(&self, id: SocketId, now: u32) -> Result<(), ReturnCode> {
        let socket = self.table.get(id).ok_or(ReturnCode::EINVAL)?;
        if socket.sock_type.get() == SockType::Dgram {
            self.table.close(id);
            return Ok(());
        }
        match socket.tcb_idx.get() {
            None => {
                self.table.close(id);
                Ok(())
            }
            Some(tcb_idx) => {
                let tcb = self.tcp.tcb(tcb_idx);
                match tcb.state.get() {
                    TcpState::Closed | TcpState::Listen | TcpState::SynSent | TcpState::SynRcvd => {
                        tcb.reset();
                        self.table.close(id);
                        Ok(())
                    }
                    _ => self.tcp.local_close(tcb_idx, now),
                }
            }
        }
    }

    // ---- send()/recv() for Stream sockets ----

    /// Begins a new `send` call over `len` bytes of a caller-held buffer;
    /// only legal on an `Established` stream socket (`send`
    /// "For Established stream sockets only").
    pub fn send_begin(&self, id: SocketId, len: usize) -> Result<(), ReturnCode> {
        let socket = self.table.get(id).ok_or(ReturnCode::EINVAL)?;
        if socket.sock_type.get() != SockType::Stream {
            return Err(ReturnCode::Unsupported);
        }
        let tcb_idx = socket.tcb_idx.get().ok_or(ReturnCode::NotConnected)?;
        if self.tcp.tcb(tcb_idx).state.get() != TcpState::Established {
            return Err(ReturnCode::NotConnected);
        }
        socket.send_total.set(len);
        socket.send_offset.set(0);
        socket.send_acked.set(0);
        Ok(())
    }

    /// Advances the stop-and-wait send cursor (`send`:
    /// "Segments `buf` into chunks of `min(send_wnd, mss)`; each segment
    /// is transmitted, then the task waits for an ACK, retry, or timeout
    /// message").
    pub fn send_poll(&self, id: SocketId, now: u32) -> Result<SendOutcome, ReturnCode> {
        let socket = self.table.get(id).ok_or(ReturnCode::EINVAL)?;
        let tcb_idx = socket.tcb_idx.get().ok_or(ReturnCode::NotConnected)?;
        let tcb = self.tcp.tcb(tcb_idx);

        if socket.send_offset.get() > socket.send_acked.get() {
            // A segment is outstanding; only `send_ack`/`send_retry` move
            // the cursor forward from here.
            return Ok(SendOutcome::WaitForAck);
        }
        if socket.send_acked.get() >= socket.send_total.get() {
            return Ok(SendOutcome::Complete(socket.send_total.get()));
        }

        let remaining = socket.send_total.get() - socket.send_offset.get();
        let chunk = core::cmp::min(remaining, core::cmp::min(tcb.send_wnd.get() as usize, tcb.mss.get() as usize));
        if chunk == 0 {
            return Ok(SendOutcome::WaitForAck);
        }
        let seq_nr = tcb.send_nxt.get();
        tcb.send_nxt.set(seq_nr.wrapping_add(chunk as u32));
        tcb.last_packet_time.set(now);
        let offset = socket.send_offset.get();
        socket.send_offset.set(offset + chunk);
        Ok(SendOutcome::Transmit(SendSegment { seq_nr, offset, len: chunk }))
    }

    /// Called once `handle_tcp_segment` reports the peer has acknowledged
    /// data on this connection; advances `send_acked` to the in-flight
    /// segment's end if the engine's `send_una` now covers it.
    pub fn send_on_ack(&self, id: SocketId) {
        if let Some(socket) = self.table.get(id) {
            if let Some(tcb_idx) = socket.tcb_idx.get() {
                if !self.tcp.tcb(tcb_idx).has_unacked_data() {
                    socket.send_acked.set(socket.send_offset.get());
                }
            }
        }
    }

    /// Rewinds the send cursor (and the `Tcb`'s `send_nxt`) back to the
    /// last acknowledged byte so the in-flight segment is retransmitted
    /// verbatim (`send`'s "On retry, the TCB counters are
    /// rewound by the segment's length and the segment is retransmitted").
    pub fn send_retry(&self, id: SocketId) {
        if let Some(socket) = self.table.get(id) {
            if let Some(tcb_idx) = socket.tcb_idx.get() {
                let tcb = self.tcp.tcb(tcb_idx);
                let rewind = (socket.send_offset.get() - socket.send_acked.get()) as u32;
                tcb.send_nxt.set(tcb.send_nxt.get().wrapping_sub(rewind));
                socket.send_offset.set(socket.send_acked.get());
            }
        }
    }

    /// A `send` call that never got a reply; returns the bytes actually
    /// acknowledged so far (`send`'s "On timeout the call
    /// returns failure").
    pub fn send_timeout(&self, id: SocketId) -> usize {
        let socket = match self.table.get(id) {
            Some(socket) => socket,
            None => return 0,
        };
        let sent = socket.send_acked.get();
        socket.send_total.set(0);
        socket.send_offset.set(0);
        socket.send_acked.set(0);
        sent
    }

    /// Drains up to `buf.len()` bytes from the socket's receive buffer.
    /// `Ok(0)` once the peer has closed and the buffer is empty (EOF);
    /// `Err(EBUSY)` means "no data yet, block and retry".
    pub fn recv(&self, id: SocketId, buf: &mut [u8]) -> Result<usize, ReturnCode> {
        let socket = self.table.get(id).ok_or(ReturnCode::EINVAL)?;
        if socket.sock_type.get() != SockType::Stream {
            return Err(ReturnCode::Unsupported);
        }
        let drained = socket.drain_received(buf);
        if drained > 0 {
            return Ok(drained);
        }
        if socket.peer_closed.get() {
            return Ok(0);
        }
        Err(ReturnCode::EBUSY)
    }

    // ---- sendto()/recvfrom() for Dgram sockets ----

    /// Builds the outgoing UDP header (and assigns an ephemeral source
    /// port on first use); the caller is responsible for prepending the
    /// IPv6 header and handing the result to the adaptation engine.
    pub fn sendto(&self, id: SocketId, src_addr: Address, dst_addr: Address, dst_port: u16, payload: &[u8]) -> Result<UdpHeader, ReturnCode> {
        let socket = self.table.get(id).ok_or(ReturnCode::EINVAL)?;
        if socket.sock_type.get() != SockType::Dgram {
            return Err(ReturnCode::Unsupported);
        }
        if socket.local_port.get() == 0 {
            socket.local_port.set(self.next_ephemeral_port(SockProtocol::Udp));
            socket.local_addr.set(src_addr);
        }
        socket.foreign_addr.set(dst_addr);
        socket.foreign_port.set(dst_port);

        let mut header = UdpHeader {
            src_port: socket.local_port.get(),
            dst_port,
            len: (udp::HEADER_SIZE + payload.len()) as u16,
            cksum: 0,
        };
        header.cksum = udp::compute_checksum(&src_addr, &dst_addr, &header, payload);
        Ok(header)
    }

    /// Drains a buffered datagram together with the address it arrived
    /// from.
    pub fn recvfrom(&self, id: SocketId, buf: &mut [u8]) -> Result<(usize, Address, u16), ReturnCode> {
        let socket = self.table.get(id).ok_or(ReturnCode::EINVAL)?;
        if socket.sock_type.get() != SockType::Dgram {
            return Err(ReturnCode::Unsupported);
        }
        let n = socket.drain_received(buf);
        if n == 0 {
            return Err(ReturnCode::EBUSY);
        }
        Ok((n, socket.input_source.get(), socket.input_source_port.get()))
    }

    /// Verifies the checksum, finds the bound socket, and deposits the
    /// payload (UDP dispatch). Checksum failures and unbound
    /// ports are wire-format errors, dropped silently by the caller.
    pub fn handle_udp_datagram(&self, local_addr: Address, src_addr: Address, header: &UdpHeader, payload: &[u8]) -> Result<(), ReturnCode> {
        if !udp::verify_checksum(&src_addr, &local_addr, header, payload) {
            return Err(ReturnCode::ChecksumInvalid);
        }
        let id = self.table.find_dgram(header.dst_port).ok_or(ReturnCode::NotConnected)?;
        let socket = self.table.get(id).unwrap();
        socket.input_source.set(src_addr);
        socket.input_source_port.set(header.src_port);
        socket.push_received(payload);
        Ok(())
    }

    // ---- inbound TCP segment routing ----

    /// Routes one inbound TCP segment to its owning connection by
    /// four-tuple, falling back to a `Listen` socket on `local_port`.
    /// `fresh_iss` is the caller-drawn initial
    /// sequence number for a freshly spawned child connection (this module's
    /// `global_sequence_counter`).
    pub fn handle_tcp_segment(&self, local_addr: Address, foreign_addr: Address, segment: &TcpHeader, payload: &[u8], now: u32, fresh_iss: u32) -> SocketAction {
        if !header::verify_checksum(&foreign_addr, &local_addr, segment, payload) {
            return SocketAction::Dropped(ReturnCode::ChecksumInvalid);
        }

        if let Some(tcb_idx) = self.tcp.find_four_tuple(local_addr, segment.dst_port, foreign_addr, segment.src_port) {
            let socket_id = match self.table.find_by_tcb(tcb_idx) {
                Some(id) => id,
                None => return SocketAction::Dropped(ReturnCode::NotConnected),
            };
            return self.apply_segment(socket_id, tcb_idx, segment, payload, now);
        }

        if let Some(listener_tcb_idx) = self.tcp.find_listener(local_addr, segment.dst_port) {
            if !segment.flag_is_set(FLAG_SYN) || segment.flag_is_set(FLAG_ACK) {
                return SocketAction::Dropped(ReturnCode::InvalidDispatch);
            }
            let listener_id = match self.table.find_by_tcb(listener_tcb_idx) {
                Some(id) => id,
                None => return SocketAction::Dropped(ReturnCode::NotConnected),
            };
            let child_id = match self.table.allocate(SockType::Stream, SockProtocol::Tcp) {
                Ok(id) => id,
                Err(code) => return SocketAction::Dropped(code),
            };
            let child = self.table.get(child_id).unwrap();
            let child_tcb_idx = match self.tcp.allocate() {
                Some(idx) => idx,
                None => {
                    self.table.close(child_id);
                    return SocketAction::Dropped(ReturnCode::ENOMEM);
                }
            };
            child.tcb_idx.set(Some(child_tcb_idx));
            child.local_addr.set(local_addr);
            child.local_port.set(segment.dst_port);
            child.foreign_addr.set(foreign_addr);
            child.foreign_port.set(segment.src_port);

            let mut reply = self.tcp.accept_syn(child_tcb_idx, local_addr, segment.dst_port, foreign_addr, segment.src_port, fresh_iss, segment, now);
            reply.cksum = header::compute_checksum(&local_addr, &foreign_addr, &reply, &[]);
            if let Some(listener) = self.table.get(listener_id) {
                listener.pending_child.set(Some(child_id));
            }
            return SocketAction::NewConnection { listener: listener_id, child: child_id, reply };
        }

        SocketAction::NoMatch
    }

    /// Stamps the checksum on a reply we originate ourselves, over the
    /// connection's own address pair.
    fn sign(tcb: &Tcb, mut reply: TcpHeader) -> TcpHeader {
        reply.cksum = header::compute_checksum(&tcb.local_addr.get(), &tcb.foreign_addr.get(), &reply, &[]);
        reply
    }

    fn apply_segment(&self, socket_id: SocketId, tcb_idx: usize, segment: &TcpHeader, payload: &[u8], now: u32) -> SocketAction {
        let action = match self.tcp.handle_segment(tcb_idx, segment, payload, now) {
            Ok(action) => action,
            Err(code) => return SocketAction::Dropped(code),
        };
        let socket = self.table.get(socket_id).unwrap();
        let tcb = self.tcp.tcb(tcb_idx);

        match action {
            TcpAction::None => SocketAction::None,
            TcpAction::Drop(code) => SocketAction::Dropped(code),
            TcpAction::DeliverAndAck(len) => {
                socket.push_received(&payload[..len]);
                let reply = Self::sign(
                    tcb,
                    TcpHeader {
                        src_port: tcb.local_port.get(),
                        dst_port: tcb.foreign_port.get(),
                        seq_nr: tcb.send_nxt.get(),
                        ack_nr: tcb.rcv_nxt.get(),
                        data_offset: 5,
                        flags: FLAG_ACK,
                        window: Self::advertised_window(socket),
                        cksum: 0,
                        urgent_ptr: 0,
                        mss: None,
                    },
                );
                SocketAction::Delivered { socket: socket_id, len, reply }
            }
            TcpAction::Established => SocketAction::Established { socket: socket_id },
            TcpAction::ClosedByPeer => {
                socket.peer_closed.set(true);
                let fin_seq = tcb.send_nxt.get();
                tcb.send_nxt.set(fin_seq.wrapping_add(1));
                let reply = Self::sign(
                    tcb,
                    TcpHeader {
                        src_port: tcb.local_port.get(),
                        dst_port: tcb.foreign_port.get(),
                        seq_nr: fin_seq,
                        ack_nr: tcb.rcv_nxt.get(),
                        data_offset: 5,
                        flags: FLAG_ACK | FLAG_FIN,
                        window: Self::advertised_window(socket),
                        cksum: 0,
                        urgent_ptr: 0,
                        mss: None,
                    },
                );
                SocketAction::ClosedByPeer { socket: socket_id, reply }
            }
            TcpAction::SendFinAck => {
                let reply = Self::sign(
                    tcb,
                    TcpHeader {
                        src_port: tcb.local_port.get(),
                        dst_port: tcb.foreign_port.get(),
                        seq_nr: tcb.send_nxt.get().wrapping_sub(1),
                        ack_nr: tcb.rcv_nxt.get(),
                        data_offset: 5,
                        flags: FLAG_ACK | FLAG_FIN,
                        window: Self::advertised_window(socket),
                        cksum: 0,
                        urgent_ptr: 0,
                        mss: None,
                    },
                );
                SocketAction::Reply { socket: socket_id, reply }
            }
            TcpAction::SendAck => {
                let reply = Self::sign(
                    tcb,
                    TcpHeader {
                        src_port: tcb.local_port.get(),
                        dst_port: tcb.foreign_port.get(),
                        seq_nr: tcb.send_nxt.get(),
                        ack_nr: tcb.rcv_nxt.get(),
                        data_offset: 5,
                        flags: FLAG_ACK,
                        window: Self::advertised_window(socket),
                        cksum: 0,
                        urgent_ptr: 0,
                        mss: None,
                    },
                );
                SocketAction::Reply { socket: socket_id, reply }
            }
            TcpAction::FreeSocket => {
                self.table.close(socket_id);
                SocketAction::Freed { socket: socket_id }
            }
        }
    }

    // ---- retransmission timer integration ----

    /// Runs one retransmission-timer tick across every `Stream` socket
    /// with a live `Tcb`, invoking `f` for each that needs a `Retry` or a
    /// `Timeout`, driven by a single background task.
    pub fn for_each_timeout<F: FnMut(SocketId, TimerAction)>(&self, now: u32, mut f: F) {
        for idx in 0..NUM_SOCKETS {
            let id = SocketId::from_index(idx);
            if let Some(socket) = self.table.get(id) {
                if let Some(tcb_idx) = socket.tcb_idx.get() {
                    let action = self.tcp.check_timeout(tcb_idx, now);
                    if action != TimerAction::None {
                        f(id, action);
                    }
                }
            }
        }
    }

    /// Tears down a connection the timer reported `Timeout` on. The table slot itself is left for the
    /// application's next `close`/`recv`/`send` call to observe the
    /// failure and free.
    pub fn apply_timeout(&self, id: SocketId) {
        if let Some(socket) = self.table.get(id) {
            if let Some(tcb_idx) = socket.tcb_idx.get() {
                self.tcp.tcb(tcb_idx).reset();
            }
            socket.peer_closed.set(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::tcp::tcb::Tcb;

    fn sockets_storage() -> ([Socket; NUM_SOCKETS], [Tcb; NUM_SOCKETS]) {
        (
            [Socket::empty(), Socket::empty(), Socket::empty(), Socket::empty(), Socket::empty()],
            [Tcb::new(), Tcb::new(), Tcb::new(), Tcb::new(), Tcb::new()],
        )
    }

    fn addrs() -> (Address, Address) {
        (Address([0x20; 16]), Address([0x30; 16]))
    }

    #[test]
    fn listen_accept_reaches_established_and_hands_back_a_child() {
        let (sockets, tcbs) = sockets_storage();
        let server = Sockets::new(&sockets, &tcbs);
        let (client_addr, server_addr) = addrs();

        let listener = server.socket(SockType::Stream, SockProtocol::Tcp).unwrap();
        server.bind(listener, server_addr, 1100).unwrap();
        server.listen(listener, 1).unwrap();

        let mut syn = TcpHeader {
            src_port: 49152,
            dst_port: 1100,
            seq_nr: 0x1000,
            ack_nr: 0,
            data_offset: 6,
            flags: FLAG_SYN,
            window: 48,
            cksum: 0,
            urgent_ptr: 0,
            mss: Some(48),
        };
        syn.cksum = header::compute_checksum(&client_addr, &server_addr, &syn, &[]);

        let action = server.handle_tcp_segment(server_addr, client_addr, &syn, &[], 0, 0x9000);
        let (child_id, syn_ack) = match action {
            SocketAction::NewConnection { listener: l, child, reply } => {
                assert_eq!(l, listener);
                (child, reply)
            }
            other => panic!("unexpected action: {:?}", other),
        };
        assert_eq!(accept_poll_pending(&server, listener), true);

        let mut ack = TcpHeader {
            src_port: 49152,
            dst_port: 1100,
            seq_nr: 0x1001,
            ack_nr: syn_ack.seq_nr.wrapping_add(1),
            data_offset: 5,
            flags: FLAG_ACK,
            window: 48,
            cksum: 0,
            urgent_ptr: 0,
            mss: None,
        };
        ack.cksum = header::compute_checksum(&client_addr, &server_addr, &ack, &[]);

        let action = server.handle_tcp_segment(server_addr, client_addr, &ack, &[], 1, 0);
        assert!(matches!(action, SocketAction::Established { socket } if socket == child_id));

        match server.accept_poll(listener) {
            Poll::Ready(Ok(accepted)) => assert_eq!(accepted, child_id),
            other => panic!("expected accept to be ready, got {:?}", other),
        }
    }

    fn accept_poll_pending(server: &Sockets, listener: SocketId) -> bool {
        matches!(server.accept_poll(listener), Poll::Pending)
    }

    #[test]
    fn bind_rejects_a_port_already_bound_by_the_same_socket_type() {
        let (sockets, tcbs) = sockets_storage();
        let server = Sockets::new(&sockets, &tcbs);
        let (_, server_addr) = addrs();
        let a = server.socket(SockType::Stream, SockProtocol::Tcp).unwrap();
        let b = server.socket(SockType::Stream, SockProtocol::Tcp).unwrap();
        server.bind(a, server_addr, 1100).unwrap();
        assert_eq!(server.bind(b, server_addr, 1100), Err(ReturnCode::AlreadyInUse));
    }

    #[test]
    fn send_recv_round_trip_drives_the_stop_and_wait_cursor() {
        let (client_sockets, client_tcbs) = sockets_storage();
        let (server_sockets, server_tcbs) = sockets_storage();
        let client = Sockets::new(&client_sockets, &client_tcbs);
        let server = Sockets::new(&server_sockets, &server_tcbs);
        let (client_addr, server_addr) = addrs();

        let listener = server.socket(SockType::Stream, SockProtocol::Tcp).unwrap();
        server.bind(listener, server_addr, 1100).unwrap();
        server.listen(listener, 1).unwrap();

        let conn = client.socket(SockType::Stream, SockProtocol::Tcp).unwrap();
        let syn = client.connect(conn, client_addr, server_addr, 1100, 0x1000, 0).unwrap();

        let action = server.handle_tcp_segment(server_addr, client_addr, &syn, &[], 0, 0x9000);
        let (child, syn_ack) = match action {
            SocketAction::NewConnection { child, reply, .. } => (child, reply),
            other => panic!("unexpected action: {:?}", other),
        };

        let established = client.handle_tcp_segment(client_addr, server_addr, &syn_ack, &[], 1, 0);
        assert!(matches!(established, SocketAction::Established { socket } if socket == conn));

        let mut client_ack = TcpHeader {
            src_port: 49152,
            dst_port: 1100,
            seq_nr: 0x1001,
            ack_nr: syn_ack.seq_nr.wrapping_add(1),
            data_offset: 5,
            flags: FLAG_ACK,
            window: 48,
            cksum: 0,
            urgent_ptr: 0,
            mss: None,
        };
        client_ack.cksum = header::compute_checksum(&client_addr, &server_addr, &client_ack, &[]);
        let established = server.handle_tcp_segment(server_addr, client_addr, &client_ack, &[], 1, 0);
        assert!(matches!(established, SocketAction::Established { socket } if socket == child));

        client.send_begin(conn, 5).unwrap();
        let segment = match client.send_poll(conn, 1).unwrap() {
            SendOutcome::Transmit(segment) => segment,
            other => panic!("expected a segment to transmit, got {:?}", other),
        };
        assert_eq!(segment.len, 5);
        assert_eq!(client.send_poll(conn, 1).unwrap(), SendOutcome::WaitForAck);

        let mut data = TcpHeader {
            src_port: 49152,
            dst_port: 1100,
            seq_nr: segment.seq_nr,
            ack_nr: 0x9001,
            data_offset: 5,
            flags: FLAG_ACK,
            window: 48,
            cksum: 0,
            urgent_ptr: 0,
            mss: None,
        };
        data.cksum = header::compute_checksum(&client_addr, &server_addr, &data, b"hello");
        let delivered = server.handle_tcp_segment(server_addr, client_addr, &data, b"hello", 2, 0);
        assert!(matches!(delivered, SocketAction::Delivered { socket, len: 5, .. } if socket == child));

        let mut buf = [0u8; 5];
        assert_eq!(server.recv(child, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");

        let mut server_ack = TcpHeader {
            src_port: 1100,
            dst_port: 49152,
            seq_nr: 0x9001,
            ack_nr: segment.seq_nr.wrapping_add(5),
            data_offset: 5,
            flags: FLAG_ACK,
            window: 48,
            cksum: 0,
            urgent_ptr: 0,
            mss: None,
        };
        server_ack.cksum = header::compute_checksum(&server_addr, &client_addr, &server_ack, &[]);
        let action = client.handle_tcp_segment(client_addr, server_addr, &server_ack, &[], 3, 0);
        assert!(matches!(action, SocketAction::None));
        client.send_on_ack(conn);
        assert_eq!(client.send_poll(conn, 3).unwrap(), SendOutcome::Complete(5));
    }

    #[test]
    fn send_retry_rewinds_the_cursor_for_retransmission() {
        let (sockets, tcbs) = sockets_storage();
        let api = Sockets::new(&sockets, &tcbs);
        let (client_addr, server_addr) = addrs();
        let conn = api.socket(SockType::Stream, SockProtocol::Tcp).unwrap();
        api.connect(conn, client_addr, server_addr, 1100, 0x1000, 0).unwrap();
        api.tcp.tcb(0).state.set(TcpState::Established);

        api.send_begin(conn, 10).unwrap();
        let first = match api.send_poll(conn, 0).unwrap() {
            SendOutcome::Transmit(segment) => segment,
            other => panic!("expected a segment, got {:?}", other),
        };
        assert_eq!(first.offset, 0);

        api.send_retry(conn);
        let retried = match api.send_poll(conn, 1).unwrap() {
            SendOutcome::Transmit(segment) => segment,
            other => panic!("expected a retransmit, got {:?}", other),
        };
        assert_eq!(retried.seq_nr, first.seq_nr);
        assert_eq!(retried.offset, 0);
    }

    #[test]
    fn sendto_recvfrom_round_trip_assigns_an_ephemeral_port() {
        let (sockets, tcbs) = sockets_storage();
        let api = Sockets::new(&sockets, &tcbs);
        let (local, peer) = addrs();
        let id = api.socket(SockType::Dgram, SockProtocol::Udp).unwrap();

        let header = api.sendto(id, local, peer, 5683, b"hi").unwrap();
        assert_eq!(header.src_port, EPHEMERAL_BASE_PORT);

        let mut reply_header = UdpHeader {
            src_port: 5683,
            dst_port: header.src_port,
            len: (udp::HEADER_SIZE + 2) as u16,
            cksum: 0,
        };
        reply_header.cksum = udp::compute_checksum(&peer, &local, &reply_header, b"ok");
        api.handle_udp_datagram(local, peer, &reply_header, b"ok").unwrap();

        let mut buf = [0u8; 2];
        let (n, from, port) = api.recvfrom(id, &mut buf).unwrap();
        assert_eq!(n, 2);
        assert_eq!(&buf, b"ok");
        assert_eq!(from, peer);
        assert_eq!(port, 5683);
    }

    #[test]
    fn closed_by_peer_marks_eof_after_the_buffer_drains() {
        let (sockets, tcbs) = sockets_storage();
        let api = Sockets::new(&sockets, &tcbs);
        let (client_addr, server_addr) = addrs();
        let conn = api.socket(SockType::Stream, SockProtocol::Tcp).unwrap();
        api.connect(conn, client_addr, server_addr, 1100, 0x1000, 0).unwrap();
        let tcb = api.tcp.tcb(0);
        tcb.state.set(TcpState::Established);
        tcb.local_addr.set(client_addr);
        tcb.foreign_addr.set(server_addr);
        tcb.rcv_nxt.set(500);
        tcb.send_una.set(0x1001);
        tcb.send_nxt.set(0x1001);

        let mut fin = TcpHeader {
            src_port: 1100,
            dst_port: 49152,
            seq_nr: 500,
            ack_nr: 0x1001,
            data_offset: 5,
            flags: FLAG_ACK | FLAG_FIN,
            window: 48,
            cksum: 0,
            urgent_ptr: 0,
            mss: None,
        };
        fin.cksum = header::compute_checksum(&server_addr, &client_addr, &fin, &[]);
        let action = api.handle_tcp_segment(client_addr, server_addr, &fin, &[], 0, 0);
        assert!(matches!(action, SocketAction::ClosedByPeer { socket, .. } if socket == conn));

        let mut buf = [0u8; 4];
        assert_eq!(api.recv(conn, &mut buf).unwrap(), 0);
    }
}
