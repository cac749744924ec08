//! The TCP segment-ingress handler, state machine, and retransmission
//! timer.
//!
//! `net::tcp` started as a 21-line header-only stub; the state machine,
//! segment-acceptance rules, and RTO-driven retransmission schedule here
//! are grounded on RIOT's `sys/net/destiny/tcp.c` and `tcp_timer.c`
//! (`original_source/`), re-expressed around this crate's `Tcb` (plain
//! `Cell` fields, no OS thread/message-queue) in the same shape the
//! 6LoWPAN adaptation engine (`sixlowpan::engine`) uses to wrap its own
//! per-datagram state: one object owning a fixed table of connection
//! records, each incoming segment driving one synchronous state transition
//! instead of a blocking `recv`/`send` call.

use kernel::ReturnCode;

use crate::net::ip6::Address;
use crate::net::tcp::header::{TcpHeader, FLAG_ACK, FLAG_FIN, FLAG_SYN};
use crate::net::tcp::tcb::{Tcb, TcpState};
use crate::net::tcp::tcb::{TCP_MAX_SYN_RETRIES, TCP_SYN_INITIAL_TIMEOUT_SECS, TCP_SYN_TIMEOUT_SECS};
use crate::net::tcp::tcb::{DEFAULT_MSS, TCP_ACK_MAX_TIMEOUT_SECS};

/// What a caller should do in response to `handle_segment`'s outcome: the
/// protocol logic itself never touches a send path or a recv buffer, so it
/// hands back a description of the necessary reply for the socket layer to
/// act on.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TcpAction {
    /// Nothing further needs to happen beyond the state update already
    /// applied.
    None,
    /// A wire-format or sequencing problem; counted, never surfaced to the
    /// application (this module's "wire-format errors discard the offending
    /// frame silently").
    Drop(ReturnCode),
    /// `len` bytes of in-order payload are ready in the socket's recv
    /// buffer; an ACK should be sent.
    DeliverAndAck(usize),
    /// The connection reached Established; wake a blocked `connect` or
    /// `accept`.
    Established,
    /// The peer sent FIN; reply with FIN+ACK and wake blocked readers with
    /// EOF.
    ClosedByPeer,
    /// Reply with FIN+ACK (simultaneous-close path).

    SendFinAck,
    /// Reply with a bare ACK (closing the window after the peer's last
    /// FIN in FinWait2).
    SendAck,
    /// The connection fully closed; the slot may be reused.
    FreeSocket,
}

/// What the retransmission timer should do for one connection on a given
/// tick.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TimerAction {
    None,
    /// Retransmit the last unacked segment (or SYN) and bump the retry
    /// counter.
    Retry,
    /// Retries are exhausted or the effective timeout blew past the
    /// absolute ceiling; tear the connection down.
    Timeout,
}

/// Owns a fixed table of TCBs and drives segment ingress, active/passive
/// open, and the retransmission schedule across all of them.
pub struct TcpEngine<'a> {
    tcbs: &'a [Tcb],
}

impl<'a> TcpEngine<'a> {
    pub fn new(tcbs: &'a [Tcb]) -> TcpEngine<'a> {
        TcpEngine { tcbs }
    }

    pub fn tcb(&self, idx: usize) -> &'a Tcb {
        &self.tcbs[idx]
    }

    /// Finds the first slot in `Closed` state — the smallest free index,
    /// matching the socket table's own allocation rule.
    pub fn allocate(&self) -> Option<usize> {
        self.tcbs.iter().position(|tcb| tcb.state.get() == TcpState::Closed)
    }

    /// Four-tuple lookup: the first connection whose local and
    /// foreign address/port all match.
    pub fn find_four_tuple(&self, local_addr: Address, local_port: u16, foreign_addr: Address, foreign_port: u16) -> Option<usize> {
        self.tcbs.iter().position(|tcb| {
            tcb.state.get() != TcpState::Closed
                && tcb.local_port.get() == local_port
                && tcb.foreign_port.get() == foreign_port
                && tcb.local_addr.get() == local_addr
                && tcb.foreign_addr.get() == foreign_addr
        })
    }

    /// Falls back to a Listen/SynRcvd socket bound to `local_addr`+
    /// `local_port` with no foreign address pinned yet: a Listen/SynRcvd
    /// socket with an all-zero foreign address catches the segment.
    pub fn find_listener(&self, local_addr: Address, local_port: u16) -> Option<usize> {
        self.tcbs.iter().position(|tcb| {
            (tcb.state.get() == TcpState::Listen || tcb.state.get() == TcpState::SynRcvd)
                && tcb.local_port.get() == local_port
                && tcb.local_addr.get() == local_addr
                && tcb.foreign_addr.get().is_unspecified()
        })
    }

    /// Moves a freshly allocated, Closed TCB into Listen
    /// (`listen(s, backlog)`; the backlog count itself is the socket
    /// layer's concern, not the TCB's).
    pub fn listen(&self, idx: usize, local_addr: Address, local_port: u16) -> Result<(), ReturnCode> {
        let tcb = &self.tcbs[idx];
        if tcb.state.get() != TcpState::Closed {
            return Err(ReturnCode::AlreadyInUse);
        }
        tcb.reset();
        tcb.local_addr.set(local_addr);
        tcb.local_port.set(local_port);
        tcb.state.set(TcpState::Listen);
        Ok(())
    }

    /// Active open: builds the outgoing SYN header and moves the TCB to
    /// SynSent (`Closed -(connect)-> SynSent`).
    pub fn connect(&self, idx: usize, local_addr: Address, local_port: u16, foreign_addr: Address, foreign_port: u16, iss: u32, now: u32) -> TcpHeader {
        let tcb = &self.tcbs[idx];
        tcb.open_active(local_addr, local_port, foreign_addr, foreign_port, iss, now);
        TcpHeader {
            src_port: local_port,
            dst_port: foreign_port,
            seq_nr: iss,
            ack_nr: 0,
            data_offset: 6,
            flags: FLAG_SYN,
            window: tcb.rcv_wnd.get(),
            cksum: 0,
            urgent_ptr: 0,
            mss: Some(DEFAULT_MSS),
        }
    }

    /// Passive open: a SYN arrived at a Listen socket. Allocates `child_idx`
    /// as a new TCB in SynRcvd and builds the SYN+ACK to send back
    /// (`Listen -(SYN arrives)-> SynRcvd`).
    pub fn accept_syn(&self, child_idx: usize, local_addr: Address, local_port: u16, foreign_addr: Address, foreign_port: u16, iss: u32, syn: &TcpHeader, now: u32) -> TcpHeader {
        let tcb = &self.tcbs[child_idx];
        tcb.open_passive(local_addr, local_port, foreign_addr, foreign_port, iss, syn.seq_nr, now);
        TcpHeader {
            src_port: local_port,
            dst_port: foreign_port,
            seq_nr: iss,
            ack_nr: tcb.rcv_nxt.get(),
            data_offset: 6,
            flags: FLAG_SYN | FLAG_ACK,
            window: tcb.rcv_wnd.get(),
            cksum: 0,
            urgent_ptr: 0,
            mss: Some(DEFAULT_MSS),
        }
    }

    /// Initiates an active close (`Established -(local close)->
    /// FinWait1`, and the `CloseWait -> LastAck` leg of a passive close
    /// once the application calls `close` after seeing EOF — the table
    /// only names the "salient" transitions and both legs share the same
    /// "send FIN, bump send_nxt" action).
    pub fn local_close(&self, idx: usize, now: u32) -> Result<(), ReturnCode> {
        let tcb = &self.tcbs[idx];
        match tcb.state.get() {
            TcpState::Established => {
                tcb.state.set(TcpState::FinWait1);
            }
            TcpState::CloseWait => {
                tcb.state.set(TcpState::LastAck);
            }
            _ => return Err(ReturnCode::NotConnected),
        }
        tcb.send_nxt.set(tcb.send_nxt.get().wrapping_add(1));
        tcb.last_packet_time.set(now);
        Ok(())
    }

    /// Runs one incoming segment through the segment-acceptance rules
    /// ("Segment check and acceptance") and then the
    /// per-state transition table. The IPv6-pseudo-header checksum itself
    /// is validated by the caller before this is reached (it needs the
    /// addresses, which this engine does not hold per-segment).
    pub fn handle_segment(&self, idx: usize, header: &TcpHeader, payload: &[u8], now: u32) -> Result<TcpAction, ReturnCode> {
        let tcb = &self.tcbs[idx];
        let state = tcb.state.get();
        if state == TcpState::Closed || state == TcpState::Listen {
            return Err(ReturnCode::NotConnected);
        }

        if header.flag_is_set(FLAG_ACK) {
            if tcb.ack_too_big(header.ack_nr) {
                return Ok(TcpAction::Drop(ReturnCode::AckTooBig));
            }
            if tcb.ack_too_small(header.ack_nr) {
                return Ok(TcpAction::Drop(ReturnCode::AckTooSmall));
            }
        }
        if !payload.is_empty() && header.seq_nr != tcb.rcv_nxt.get() {
            return Ok(TcpAction::Drop(ReturnCode::SeqTooSmall));
        }

        match state {
            TcpState::SynSent => {
                if !(header.flag_is_set(FLAG_SYN) && header.flag_is_set(FLAG_ACK)) {
                    return Ok(TcpAction::Drop(ReturnCode::InvalidDispatch));
                }
                tcb.send_una.set(header.ack_nr);
                tcb.rcv_irs.set(header.seq_nr);
                tcb.rcv_nxt.set(header.seq_nr.wrapping_add(1));
                if let Some(mss) = header.mss {
                    tcb.mss.set(mss);
                }
                tcb.send_wnd.set(header.window);
                tcb.state.set(TcpState::Established);
                tcb.retries.set(0);
                tcb.last_packet_time.set(now);
                Ok(TcpAction::Established)
            }
            TcpState::SynRcvd => {
                if !header.flag_is_set(FLAG_ACK) {
                    return Ok(TcpAction::Drop(ReturnCode::InvalidDispatch));
                }
                tcb.send_una.set(header.ack_nr);
                tcb.send_wnd.set(header.window);
                tcb.state.set(TcpState::Established);
                tcb.retries.set(0);
                tcb.last_packet_time.set(now);
                Ok(TcpAction::Established)
            }
            TcpState::Established => {
                if header.flag_is_set(FLAG_ACK) {
                    tcb.send_una.set(header.ack_nr);
                    tcb.retries.set(0);
                    tcb.last_packet_time.set(now);
                }
                tcb.send_wnd.set(header.window);
                if header.flag_is_set(FLAG_FIN) {
                    tcb.rcv_nxt.set(tcb.rcv_nxt.get().wrapping_add(payload.len() as u32).wrapping_add(1));
                    tcb.state.set(TcpState::LastAck);
                    return Ok(TcpAction::ClosedByPeer);
                }
                if !payload.is_empty() {
                    tcb.rcv_nxt.set(tcb.rcv_nxt.get().wrapping_add(payload.len() as u32));
                    return Ok(TcpAction::DeliverAndAck(payload.len()));
                }
                Ok(TcpAction::None)
            }
            TcpState::CloseWait => Ok(TcpAction::None),
            TcpState::FinWait1 => {
                if header.flag_is_set(FLAG_ACK) {
                    tcb.send_una.set(header.ack_nr);
                }
                if header.flag_is_set(FLAG_FIN) {
                    tcb.rcv_nxt.set(header.seq_nr.wrapping_add(1));
                    tcb.state.set(TcpState::Closing);
                    return Ok(TcpAction::SendFinAck);
                }
                if tcb.send_una.get() == tcb.send_nxt.get() {
                    tcb.state.set(TcpState::FinWait2);
                }
                Ok(TcpAction::None)
            }
            TcpState::FinWait2 => {
                if header.flag_is_set(FLAG_FIN) {
                    tcb.rcv_nxt.set(header.seq_nr.wrapping_add(1));
                    tcb.state.set(TcpState::TimeWait);
                    return Ok(TcpAction::SendAck);
                }
                Ok(TcpAction::None)
            }
            TcpState::Closing => {
                if header.flag_is_set(FLAG_ACK) {
                    tcb.send_una.set(header.ack_nr);
                    tcb.state.set(TcpState::Closed);
                    return Ok(TcpAction::FreeSocket);
                }
                Ok(TcpAction::None)
            }
            TcpState::LastAck => {
                if header.flag_is_set(FLAG_ACK) {
                    tcb.state.set(TcpState::Closed);
                    return Ok(TcpAction::FreeSocket);
                }
                Ok(TcpAction::None)
            }
            TcpState::TimeWait => Ok(TcpAction::None),
            TcpState::Closed | TcpState::Listen => unreachable!(),
        }
    }

    /// One tick of the retransmission timer for a single connection. A real
    /// board calls this for every
    /// non-Closed TCB on each `hil::time::Alarm` fire at
    /// `TCP_TIMER_RESOLUTION`.
    pub fn check_timeout(&self, idx: usize, now: u32) -> TimerAction {
        let tcb = &self.tcbs[idx];
        match tcb.state.get() {
            TcpState::SynSent | TcpState::SynRcvd => {
                let elapsed = now.wrapping_sub(tcb.last_packet_time.get());
                let retries = tcb.retries.get();
                let deadline = if retries == 0 {
                    TCP_SYN_INITIAL_TIMEOUT_SECS
                } else {
                    retries as u32 * TCP_SYN_TIMEOUT_SECS + TCP_SYN_INITIAL_TIMEOUT_SECS
                };
                if elapsed <= deadline {
                    return TimerAction::None;
                }
                if retries + 1 > TCP_MAX_SYN_RETRIES {
                    TimerAction::Timeout
                } else {
                    tcb.retries.set(retries + 1);
                    tcb.last_packet_time.set(now);
                    TimerAction::Retry
                }
            }
            TcpState::Established if tcb.has_unacked_data() => {
                let effective = tcb.effective_rto();
                if effective > TCP_ACK_MAX_TIMEOUT_SECS {
                    return TimerAction::Timeout;
                }
                let elapsed = now.wrapping_sub(tcb.last_packet_time.get());
                if elapsed > effective {
                    tcb.retries.set(tcb.retries.get() + 1);
                    TimerAction::Retry
                } else {
                    TimerAction::None
                }
            }
            _ => TimerAction::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs() -> (Address, Address) {
        (Address([0x20; 16]), Address([0x30; 16]))
    }

    #[test]
    fn three_way_handshake_reaches_established_on_both_sides() {
        let client_tcbs = [Tcb::new()];
        let server_tcbs = [Tcb::new(), Tcb::new()];
        let client = TcpEngine::new(&client_tcbs);
        let server = TcpEngine::new(&server_tcbs);
        let (client_addr, server_addr) = addrs();

        let listener = server.allocate().unwrap();
        server.listen(listener, server_addr, 1100).unwrap();

        let conn = client.allocate().unwrap();
        let iss_client = 0x1000;
        let syn = client.connect(conn, client_addr, 49152, server_addr, 1100, iss_client, 0);
        assert_eq!(client.tcb(conn).state.get(), TcpState::SynSent);

        let child = 1usize;
        let iss_server = 0x9000;
        let syn_ack = server.accept_syn(child, server_addr, 1100, client_addr, 49152, iss_server, &syn, 0);
        assert_eq!(server.tcb(child).state.get(), TcpState::SynRcvd);

        let action = client.handle_segment(conn, &syn_ack, &[], 1).unwrap();
        assert_eq!(action, TcpAction::Established);
        assert_eq!(client.tcb(conn).state.get(), TcpState::Established);
        assert_eq!(client.tcb(conn).send_una.get(), iss_client + 1);
        assert_eq!(client.tcb(conn).rcv_nxt.get(), iss_server + 1);

        let ack = TcpHeader {
            src_port: 49152,
            dst_port: 1100,
            seq_nr: iss_client + 1,
            ack_nr: iss_server + 1,
            data_offset: 5,
            flags: FLAG_ACK,
            window: 48,
            cksum: 0,
            urgent_ptr: 0,
            mss: None,
        };
        let action = server.handle_segment(child, &ack, &[], 1).unwrap();
        assert_eq!(action, TcpAction::Established);
        assert_eq!(server.tcb(child).state.get(), TcpState::Established);
        assert_eq!(server.tcb(child).send_una.get(), iss_server + 1);
        assert_eq!(server.tcb(child).rcv_nxt.get(), iss_client + 1);
    }

    #[test]
    fn ack_outside_window_is_dropped_not_fatal() {
        let tcbs = [Tcb::new()];
        let engine = TcpEngine::new(&tcbs);
        let (a, b) = addrs();
        let conn = engine.allocate().unwrap();
        engine.connect(conn, a, 49152, b, 1100, 100, 0);
        let bogus = TcpHeader {
            src_port: 1100,
            dst_port: 49152,
            seq_nr: 0,
            ack_nr: 9999,
            data_offset: 5,
            flags: FLAG_SYN | FLAG_ACK,
            window: 48,
            cksum: 0,
            urgent_ptr: 0,
            mss: None,
        };
        let action = engine.handle_segment(conn, &bogus, &[], 0).unwrap();
        assert_eq!(action, TcpAction::Drop(ReturnCode::AckTooBig));
        assert_eq!(engine.tcb(conn).state.get(), TcpState::SynSent);
    }

    #[test]
    fn out_of_order_data_is_dropped_with_seq_too_small() {
        let tcbs = [Tcb::new()];
        let engine = TcpEngine::new(&tcbs);
        let (a, b) = addrs();
        let conn = engine.allocate().unwrap();
        let tcb = engine.tcb(conn);
        tcb.state.set(TcpState::Established);
        tcb.local_addr.set(a);
        tcb.foreign_addr.set(b);
        tcb.rcv_nxt.set(500);
        tcb.send_una.set(100);
        tcb.send_nxt.set(100);

        let stale = TcpHeader {
            src_port: 1100,
            dst_port: 49152,
            seq_nr: 490,
            ack_nr: 100,
            data_offset: 5,
            flags: FLAG_ACK,
            window: 48,
            cksum: 0,
            urgent_ptr: 0,
            mss: None,
        };
        let action = engine.handle_segment(conn, &stale, &[1, 2, 3], 0).unwrap();
        assert_eq!(action, TcpAction::Drop(ReturnCode::SeqTooSmall));
    }

    #[test]
    fn established_data_segment_advances_rcv_nxt_and_acks() {
        let tcbs = [Tcb::new()];
        let engine = TcpEngine::new(&tcbs);
        let (a, b) = addrs();
        let conn = engine.allocate().unwrap();
        let tcb = engine.tcb(conn);
        tcb.state.set(TcpState::Established);
        tcb.local_addr.set(a);
        tcb.foreign_addr.set(b);
        tcb.rcv_nxt.set(500);
        tcb.send_una.set(100);
        tcb.send_nxt.set(100);

        let data = TcpHeader {
            src_port: 1100,
            dst_port: 49152,
            seq_nr: 500,
            ack_nr: 100,
            data_offset: 5,
            flags: FLAG_ACK,
            window: 48,
            cksum: 0,
            urgent_ptr: 0,
            mss: None,
        };
        let action = engine.handle_segment(conn, &data, &[1, 2, 3, 4], 0).unwrap();
        assert_eq!(action, TcpAction::DeliverAndAck(4));
        assert_eq!(engine.tcb(conn).rcv_nxt.get(), 504);
    }

    #[test]
    fn passive_close_then_local_close_reaches_last_ack() {
        let tcbs = [Tcb::new()];
        let engine = TcpEngine::new(&tcbs);
        let (a, b) = addrs();
        let conn = engine.allocate().unwrap();
        let tcb = engine.tcb(conn);
        tcb.state.set(TcpState::Established);
        tcb.local_addr.set(a);
        tcb.foreign_addr.set(b);
        tcb.rcv_nxt.set(500);
        tcb.send_una.set(100);
        tcb.send_nxt.set(100);

        let fin = TcpHeader {
            src_port: 1100,
            dst_port: 49152,
            seq_nr: 500,
            ack_nr: 100,
            data_offset: 5,
            flags: FLAG_ACK | FLAG_FIN,
            window: 48,
            cksum: 0,
            urgent_ptr: 0,
            mss: None,
        };
        let action = engine.handle_segment(conn, &fin, &[], 0).unwrap();
        assert_eq!(action, TcpAction::ClosedByPeer);
        assert_eq!(engine.tcb(conn).state.get(), TcpState::LastAck);
    }

    #[test]
    fn syn_retransmission_follows_the_backoff_schedule_then_times_out() {
        let tcbs = [Tcb::new()];
        let engine = TcpEngine::new(&tcbs);
        let (a, b) = addrs();
        let conn = engine.allocate().unwrap();
        engine.connect(conn, a, 49152, b, 1100, 1, 0);

        assert_eq!(engine.check_timeout(conn, TCP_SYN_INITIAL_TIMEOUT_SECS), TimerAction::None);
        assert_eq!(engine.check_timeout(conn, TCP_SYN_INITIAL_TIMEOUT_SECS + 1), TimerAction::Retry);
        assert_eq!(engine.tcb(conn).retries.get(), 1);

        for _ in 0..(TCP_MAX_SYN_RETRIES - 1) {
            let now = engine.tcb(conn).last_packet_time.get() + TCP_SYN_TIMEOUT_SECS + 1;
            assert_eq!(engine.check_timeout(conn, now), TimerAction::Retry);
        }
        let now = engine.tcb(conn).last_packet_time.get() + TCP_SYN_TIMEOUT_SECS + 1;
        assert_eq!(engine.check_timeout(conn, now), TimerAction::Timeout);
    }
}
