//! The socket table itself: slot allocation, the per-socket record, and
//! the fixed-size receive buffer each socket owns.
//!
//! Grounded on RIOT's `socket_internal_t` (`original_source/sys/net/
//! destiny/socket.h`): one array of `MAX_SOCKETS` records, each either
//! free or holding an address pair, a protocol, and — for `Stream`
//! sockets — the index of the `Tcb` driving it. The receive side is kept
//! as a plain ring-free FIFO of at most `mss` bytes (`input_buffer[<=MSS]`),
//! matching this crate's preference for fixed static buffers
//! (`net::packet_buffer::PacketBuffer`) over anything heap-backed.

use core::cell::{Cell, RefCell};

use kernel::ReturnCode;

use crate::net::ip6::Address;
use crate::net::tcp::tcb::DEFAULT_MSS;

/// Fixed socket-table size ("default size 5"; RIOT's
/// `MAX_SOCKETS`).
pub const NUM_SOCKETS: usize = 5;

/// Capacity of each socket's receive buffer; sized to the link-MTU-fitted
/// MSS every TCB and UDP datagram in this stack uses.
pub const RECV_BUFFER_SIZE: usize = DEFAULT_MSS as usize;

/// Address family; `Inet6` is the only one this stack implements.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Domain {
    Inet6,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SockType {
    Stream,
    Dgram,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SockProtocol {
    Tcp,
    Udp,
}

/// A socket's identity: its index into the table, plus one ("a
/// socket's id is its index+1 in a fixed table").
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct SocketId(pub usize);

impl SocketId {
    pub fn index(&self) -> usize {
        self.0 - 1
    }

    pub fn from_index(index: usize) -> SocketId {
        SocketId(index + 1)
    }
}

/// The message set a blocked caller (`accept`/`recv`/blocking `send`) is
/// woken by (this module's "Ack, Retry, Timeout, Close, data-arrived
/// messages").
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SocketEvent {
    Ack,
    Retry,
    Timeout,
    Close,
    DataAvailable,
}

/// One socket-table slot. `Stream` sockets drive a `Tcb` by index;
/// `Dgram` sockets have no backing `Tcb` and are matched purely
/// by bound local port.
pub struct Socket {
    pub in_use: Cell<bool>,
    pub sock_type: Cell<SockType>,
    pub protocol: Cell<SockProtocol>,
    pub local_addr: Cell<Address>,
    pub local_port: Cell<u16>,
    pub foreign_addr: Cell<Address>,
    pub foreign_port: Cell<u16>,

    /// `Some(idx)` into the engine's `Tcb` table for `Stream` sockets once
    /// allocated; `None` for `Dgram` sockets and for a `Stream` socket not
    /// yet bound to one.
    pub tcb_idx: Cell<Option<usize>>,

    /// For a `Listen` socket: the child socket id of the most recent
    /// passively-opened connection that has not yet been claimed by
    /// `accept` ("enqueue incomplete child socket"). This stack's
    /// backlog is implicitly bounded by free table slots, so one pending
    /// slot per listener is sufficient — a second SYN arriving before the
    /// first is accepted simply waits for a free table slot like any other
    /// passive open.
    pub pending_child: Cell<Option<SocketId>>,

    /// Receive-side buffer: bytes the TCP/UDP ingress path has deposited
    /// but the application has not yet drained via `recv`/`recvfrom`.
    input_buffer: RefCell<[u8; RECV_BUFFER_SIZE]>,
    input_fill: Cell<usize>,
    /// For `Dgram` sockets only: the source address the buffered datagram
    /// arrived from (`recvfrom`'s "deliver the payload together
    /// with the source address").
    pub input_source: Cell<Address>,
    pub input_source_port: Cell<u16>,

    /// Set once the peer has sent FIN and every byte up to it has been
    /// delivered; `recv` returns `Ok(0)` (EOF) once the buffer drains with
    /// this set.
    pub peer_closed: Cell<bool>,

    /// In-flight `send` bookkeeping: the stop-and-wait
    /// cursor over the caller's buffer. `send_total`/`send_offset` track
    /// bytes handed to the TCP engine so far; `send_acked` tracks bytes
    /// the peer has actually acknowledged, so a `Retry` can rewind
    /// `send_offset` back to it.
    pub send_total: Cell<usize>,
    pub send_offset: Cell<usize>,
    pub send_acked: Cell<usize>,
}

impl Socket {
    pub const fn empty() -> Socket {
        Socket {
            in_use: Cell::new(false),
            sock_type: Cell::new(SockType::Stream),
            protocol: Cell::new(SockProtocol::Tcp),
            local_addr: Cell::new(Address([0; 16])),
            local_port: Cell::new(0),
            foreign_addr: Cell::new(Address([0; 16])),
            foreign_port: Cell::new(0),
            tcb_idx: Cell::new(None),
            pending_child: Cell::new(None),
            input_buffer: RefCell::new([0u8; RECV_BUFFER_SIZE]),
            input_fill: Cell::new(0),
            input_source: Cell::new(Address([0; 16])),
            input_source_port: Cell::new(0),
            peer_closed: Cell::new(false),
            send_total: Cell::new(0),
            send_offset: Cell::new(0),
            send_acked: Cell::new(0),
        }
    }

    fn reset(&self) {
        self.in_use.set(false);
        self.local_addr.set(Address([0; 16]));
        self.local_port.set(0);
        self.foreign_addr.set(Address([0; 16]));
        self.foreign_port.set(0);
        self.tcb_idx.set(None);
        self.pending_child.set(None);
        self.input_fill.set(0);
        self.input_source.set(Address([0; 16]));
        self.input_source_port.set(0);
        self.peer_closed.set(false);
        self.send_total.set(0);
        self.send_offset.set(0);
        self.send_acked.set(0);
    }

    /// Appends `data` to the tail of the receive buffer, truncating at
    /// capacity; returns the number of bytes actually stored.
    pub fn push_received(&self, data: &[u8]) -> usize {
        let mut buf = self.input_buffer.borrow_mut();
        let fill = self.input_fill.get();
        let n = core::cmp::min(data.len(), RECV_BUFFER_SIZE - fill);
        buf[fill..fill + n].copy_from_slice(&data[..n]);
        self.input_fill.set(fill + n);
        n
    }

    /// Drains up to `out.len()` bytes from the head of the receive buffer,
    /// shifting any remainder down. Returns the number of bytes drained.
    pub fn drain_received(&self, out: &mut [u8]) -> usize {
        let mut buf = self.input_buffer.borrow_mut();
        let fill = self.input_fill.get();
        let n = core::cmp::min(out.len(), fill);
        out[..n].copy_from_slice(&buf[..n]);
        let remaining = fill - n;
        buf.copy_within(n..fill, 0);
        self.input_fill.set(remaining);
        n
    }

    pub fn received_len(&self) -> usize {
        self.input_fill.get()
    }
}

/// A fixed table of `NUM_SOCKETS` socket records.
pub struct SocketTable<'a> {
    sockets: &'a [Socket],
}

impl<'a> SocketTable<'a> {
    pub fn new(sockets: &'a [Socket]) -> SocketTable<'a> {
        SocketTable { sockets }
    }

    pub fn get(&self, id: SocketId) -> Option<&'a Socket> {
        self.sockets.get(id.index())
    }

    /// Claims the smallest free index ("`socket()` returns the
    /// smallest free index+1").
    pub fn allocate(&self, sock_type: SockType, protocol: SockProtocol) -> Result<SocketId, ReturnCode> {
        for (idx, socket) in self.sockets.iter().enumerate() {
            if !socket.in_use.get() {
                socket.reset();
                socket.in_use.set(true);
                socket.sock_type.set(sock_type);
                socket.protocol.set(protocol);
                return Ok(SocketId::from_index(idx));
            }
        }
        Err(ReturnCode::ENOMEM)
    }

    /// Zeroes the slot ("`close()` zeroes the slot").
    pub fn close(&self, id: SocketId) {
        if let Some(socket) = self.get(id) {
            socket.reset();
        }
    }

    /// True if any other in-use socket of the same `sock_type` is already
    /// bound to `port` ("at most one socket bound to a given
    /// (type, local_port) pair").
    pub fn port_in_use(&self, sock_type: SockType, port: u16, excluding: SocketId) -> bool {
        self.sockets.iter().enumerate().any(|(idx, socket)| {
            SocketId::from_index(idx) != excluding
                && socket.in_use.get()
                && socket.sock_type.get() == sock_type
                && socket.local_port.get() == port
        })
    }

    /// The highest local port any in-use socket of `protocol` is bound to,
    /// used to derive the next ephemeral port (`connect`'s
    /// "highest used protocol port + 1").
    pub fn highest_bound_port(&self, protocol: SockProtocol) -> Option<u16> {
        self.sockets
            .iter()
            .filter(|socket| socket.in_use.get() && socket.protocol.get() == protocol)
            .map(|socket| socket.local_port.get())
            .max()
    }

    pub fn find_dgram(&self, local_port: u16) -> Option<SocketId> {
        self.sockets.iter().enumerate().find_map(|(idx, socket)| {
            if socket.in_use.get() && socket.sock_type.get() == SockType::Dgram && socket.local_port.get() == local_port {
                Some(SocketId::from_index(idx))
            } else {
                None
            }
        })
    }

    pub fn find_by_tcb(&self, tcb_idx: usize) -> Option<SocketId> {
        self.sockets.iter().enumerate().find_map(|(idx, socket)| {
            if socket.in_use.get() && socket.tcb_idx.get() == Some(tcb_idx) {
                Some(SocketId::from_index(idx))
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_sockets() -> [Socket; NUM_SOCKETS] {
        [Socket::empty(), Socket::empty(), Socket::empty(), Socket::empty(), Socket::empty()]
    }

    #[test]
    fn socket_id_indexes_are_one_based() {
        assert_eq!(SocketId::from_index(0), SocketId(1));
        assert_eq!(SocketId::from_index(4).index(), 4);
    }

    #[test]
    fn allocate_claims_the_smallest_free_index() {
        let sockets = empty_sockets();
        let table = SocketTable::new(&sockets);
        let first = table.allocate(SockType::Stream, SockProtocol::Tcp).unwrap();
        assert_eq!(first, SocketId(1));
        let second = table.allocate(SockType::Dgram, SockProtocol::Udp).unwrap();
        assert_eq!(second, SocketId(2));
        table.close(first);
        let reused = table.allocate(SockType::Stream, SockProtocol::Tcp).unwrap();
        assert_eq!(reused, SocketId(1));
    }

    #[test]
    fn allocate_fails_once_the_table_is_full() {
        let sockets = empty_sockets();
        let table = SocketTable::new(&sockets);
        for _ in 0..NUM_SOCKETS {
            table.allocate(SockType::Dgram, SockProtocol::Udp).unwrap();
        }
        assert_eq!(table.allocate(SockType::Dgram, SockProtocol::Udp), Err(ReturnCode::ENOMEM));
    }

    #[test]
    fn close_frees_the_slot_for_reuse() {
        let sockets = empty_sockets();
        let table = SocketTable::new(&sockets);
        let id = table.allocate(SockType::Stream, SockProtocol::Tcp).unwrap();
        table.get(id).unwrap().local_port.set(1100);
        table.close(id);
        assert_eq!(table.get(id).unwrap().local_port.get(), 0);
    }

    #[test]
    fn port_in_use_ignores_the_excluded_socket_and_other_types() {
        let sockets = empty_sockets();
        let table = SocketTable::new(&sockets);
        let a = table.allocate(SockType::Stream, SockProtocol::Tcp).unwrap();
        table.get(a).unwrap().local_port.set(1100);
        assert!(!table.port_in_use(SockType::Stream, 1100, a));

        let b = table.allocate(SockType::Stream, SockProtocol::Tcp).unwrap();
        assert!(table.port_in_use(SockType::Stream, 1100, b));
        assert!(!table.port_in_use(SockType::Dgram, 1100, b));
    }

    #[test]
    fn highest_bound_port_considers_only_the_matching_protocol() {
        let sockets = empty_sockets();
        let table = SocketTable::new(&sockets);
        let tcp = table.allocate(SockType::Stream, SockProtocol::Tcp).unwrap();
        table.get(tcp).unwrap().local_port.set(49152);
        let udp = table.allocate(SockType::Dgram, SockProtocol::Udp).unwrap();
        table.get(udp).unwrap().local_port.set(60000);
        assert_eq!(table.highest_bound_port(SockProtocol::Tcp), Some(49152));
        assert_eq!(table.highest_bound_port(SockProtocol::Udp), Some(60000));
        assert_eq!(table.highest_bound_port(SockProtocol::Tcp), table.highest_bound_port(SockProtocol::Tcp));
    }

    #[test]
    fn find_dgram_matches_on_bound_local_port_only() {
        let sockets = empty_sockets();
        let table = SocketTable::new(&sockets);
        let id = table.allocate(SockType::Dgram, SockProtocol::Udp).unwrap();
        table.get(id).unwrap().local_port.set(5683);
        assert_eq!(table.find_dgram(5683), Some(id));
        assert_eq!(table.find_dgram(1234), None);
    }

    #[test]
    fn find_by_tcb_matches_the_socket_holding_that_index() {
        let sockets = empty_sockets();
        let table = SocketTable::new(&sockets);
        let id = table.allocate(SockType::Stream, SockProtocol::Tcp).unwrap();
        table.get(id).unwrap().tcb_idx.set(Some(3));
        assert_eq!(table.find_by_tcb(3), Some(id));
        assert_eq!(table.find_by_tcb(7), None);
    }

    #[test]
    fn push_and_drain_received_behaves_as_a_fifo() {
        let socket = Socket::empty();
        assert_eq!(socket.push_received(&[1, 2, 3]), 3);
        assert_eq!(socket.push_received(&[4, 5]), 2);
        assert_eq!(socket.received_len(), 5);

        let mut out = [0u8; 3];
        assert_eq!(socket.drain_received(&mut out), 3);
        assert_eq!(out, [1, 2, 3]);
        assert_eq!(socket.received_len(), 2);

        let mut rest = [0u8; 4];
        assert_eq!(socket.drain_received(&mut rest), 2);
        assert_eq!(&rest[..2], &[4, 5]);
    }

    #[test]
    fn push_received_truncates_at_capacity() {
        let socket = Socket::empty();
        let big = [7u8; RECV_BUFFER_SIZE + 10];
        assert_eq!(socket.push_received(&big), RECV_BUFFER_SIZE);
        assert_eq!(socket.push_received(&[1]), 0);
    }
}
