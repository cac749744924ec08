//! The per-connection TCP control block: sequence-space bookkeeping, the
//! connection state, and the RTO estimator. Grounded on RIOT's
//! `socket_internal_t.tcp_control` (`original_source/sys/net/destiny/`,
//! `socket.h`) field-for-field, re-expressed as a `Cell`-per-field struct
//! (compare `net::mac::TxState`'s plain `Cell` fields) rather than one
//! struct behind a single lock, since each field is only ever touched by
//! the one TCP task that owns this connection.

use core::cell::Cell;

use crate::net::ip6::Address;

/// Default MSS (RIOT's `STATIC_MSS`), fitted to this stack's link MTU.
pub const DEFAULT_MSS: u16 = 48;

/// Retransmission timer tick (RIOT's `TCP_TIMER_RESOLUTION`), in the timer
/// alarm's own frequency units (here, seconds — see `hil::time::Freq1Hz`).
pub const TCP_TIMER_RESOLUTION_SECS: u32 = 1;
/// Initial SYN retransmission timeout (RIOT's `TCP_SYN_INITIAL_TIMEOUT`).
pub const TCP_SYN_INITIAL_TIMEOUT_SECS: u32 = 6;
/// Subsequent SYN retransmission timeout step (RIOT's `TCP_SYN_TIMEOUT`).
pub const TCP_SYN_TIMEOUT_SECS: u32 = 24;
/// Cap on SYN retries before a `connect`/half-open `accept` times out.
pub const TCP_MAX_SYN_RETRIES: u8 = 3;
/// Ceiling an Established socket's effective RTO is never allowed past
/// before the segment handler reports `Timeout` (RIOT's
/// `TCP_ACK_MAX_TIMEOUT`).
pub const TCP_ACK_MAX_TIMEOUT_SECS: u32 = 90;
/// Floor every computed RTO is clamped to.
pub const RTO_FLOOR_SECS: u32 = 1;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum TcpState {
    Closed,
    Listen,
    SynSent,
    SynRcvd,
    Established,
    FinWait1,
    FinWait2,
    CloseWait,
    Closing,
    LastAck,
    TimeWait,
}

/// The TCP control block (this module's "TCB"). One per socket; the socket
/// layer owns the `Tcb` and the four-tuple it's keyed under.
pub struct Tcb {
    pub state: Cell<TcpState>,

    pub local_addr: Cell<Address>,
    pub local_port: Cell<u16>,
    pub foreign_addr: Cell<Address>,
    pub foreign_port: Cell<u16>,

    /// Oldest unacknowledged sequence number.
    pub send_una: Cell<u32>,
    /// Next sequence number to send.
    pub send_nxt: Cell<u32>,
    /// Send window, as last advertised by the peer.
    pub send_wnd: Cell<u16>,
    /// Initial send sequence number.
    pub send_iss: Cell<u32>,

    /// Next sequence number expected from the peer.
    pub rcv_nxt: Cell<u32>,
    /// Receive window currently advertised to the peer.
    pub rcv_wnd: Cell<u16>,
    /// Initial receive sequence number (the peer's ISS).
    pub rcv_irs: Cell<u32>,

    pub mss: Cell<u16>,

    /// Tick (in the timer's own units) the last segment was sent.
    pub last_packet_time: Cell<u32>,
    /// Consecutive retransmissions since the last fresh ACK.
    pub retries: Cell<u8>,

    /// Smoothed round-trip time estimate, in timer ticks.
    pub srtt: Cell<u32>,
    /// Round-trip time variance estimate, in timer ticks.
    pub rttvar: Cell<u32>,
    /// Current retransmission timeout, in timer ticks.
    pub rto: Cell<u32>,

    /// `Some(context id)` once this connection has bootstrapped a TCP
    /// header-compression context; `None` while compression is disabled or
    /// not yet bootstrapped.
    pub hc_context_id: Cell<Option<u8>>,
}

impl Tcb {
    pub const fn new() -> Tcb {
        Tcb {
            state: Cell::new(TcpState::Closed),
            local_addr: Cell::new(Address([0; 16])),
            local_port: Cell::new(0),
            foreign_addr: Cell::new(Address([0; 16])),
            foreign_port: Cell::new(0),
            send_una: Cell::new(0),
            send_nxt: Cell::new(0),
            send_wnd: Cell::new(DEFAULT_MSS),
            send_iss: Cell::new(0),
            rcv_nxt: Cell::new(0),
            rcv_wnd: Cell::new(DEFAULT_MSS),
            rcv_irs: Cell::new(0),
            mss: Cell::new(DEFAULT_MSS),
            last_packet_time: Cell::new(0),
            retries: Cell::new(0),
            srtt: Cell::new(0),
            rttvar: Cell::new(0),
            rto: Cell::new(TCP_SYN_INITIAL_TIMEOUT_SECS),
            hc_context_id: Cell::new(None),
        }
    }

    /// Resets every field to its `Closed`, never-connected state so the
    /// slot can be reused for a new connection.
    pub fn reset(&self) {
        self.state.set(TcpState::Closed);
        self.local_addr.set(Address([0; 16]));
        self.local_port.set(0);
        self.foreign_addr.set(Address([0; 16]));
        self.foreign_port.set(0);
        self.send_una.set(0);
        self.send_nxt.set(0);
        self.send_wnd.set(DEFAULT_MSS);
        self.send_iss.set(0);
        self.rcv_nxt.set(0);
        self.rcv_wnd.set(DEFAULT_MSS);
        self.rcv_irs.set(0);
        self.mss.set(DEFAULT_MSS);
        self.last_packet_time.set(0);
        self.retries.set(0);
        self.srtt.set(0);
        self.rttvar.set(0);
        self.rto.set(TCP_SYN_INITIAL_TIMEOUT_SECS);
        self.hc_context_id.set(None);
    }

    /// Initializes an active-open (`connect`) TCB: draws `iss` as the
    /// initial send sequence number and moves to `SynSent`.
    pub fn open_active(&self, local_addr: Address, local_port: u16, foreign_addr: Address, foreign_port: u16, iss: u32, now: u32) {
        self.reset();
        self.local_addr.set(local_addr);
        self.local_port.set(local_port);
        self.foreign_addr.set(foreign_addr);
        self.foreign_port.set(foreign_port);
        self.send_iss.set(iss);
        self.send_una.set(iss);
        self.send_nxt.set(iss.wrapping_add(1));
        self.state.set(TcpState::SynSent);
        self.last_packet_time.set(now);
    }

    /// Initializes a passive-open child TCB in response to an inbound SYN:
    /// records the peer's ISS, draws a fresh local `iss`, and moves to
    /// `SynRcvd`.
    pub fn open_passive(&self, local_addr: Address, local_port: u16, foreign_addr: Address, foreign_port: u16, iss: u32, peer_seq: u32, now: u32) {
        self.reset();
        self.local_addr.set(local_addr);
        self.local_port.set(local_port);
        self.foreign_addr.set(foreign_addr);
        self.foreign_port.set(foreign_port);
        self.rcv_irs.set(peer_seq);
        self.rcv_nxt.set(peer_seq.wrapping_add(1));
        self.send_iss.set(iss);
        self.send_una.set(iss);
        self.send_nxt.set(iss.wrapping_add(1));
        self.state.set(TcpState::SynRcvd);
        self.last_packet_time.set(now);
    }

    /// Whether `ack_nr` acknowledges previously-sent, previously-unacked
    /// data: `snd_una < ack_nr <= snd_nxt`, compared modulo 2^32 per the
    /// segment-acceptance rule.
    pub fn ack_in_window(&self, ack_nr: u32) -> bool {
        let una = self.send_una.get();
        let nxt = self.send_nxt.get();
        seq_lt(una, ack_nr) && seq_leq(ack_nr, nxt)
    }

    /// True if `ack_nr` acknowledges data beyond anything sent so far.
    pub fn ack_too_big(&self, ack_nr: u32) -> bool {
        seq_lt(self.send_nxt.get(), ack_nr)
    }

    /// True if `ack_nr` only re-acknowledges already-acked data. Equal to
    /// `send_una` is only an error while data is actually outstanding
    /// (`send_una != send_nxt`); with nothing outstanding, restating the
    /// current `send_una` is simply the expected value on a segment that
    /// has nothing new to acknowledge, not a stale duplicate.
    pub fn ack_too_small(&self, ack_nr: u32) -> bool {
        let una = self.send_una.get();
        seq_lt(ack_nr, una) || (ack_nr == una && self.has_unacked_data())
    }

    /// Rolls the first-RTT-sample and subsequent-sample RTO estimators
    /// forward ("RTO estimation"), with `alpha = 1/8`,
    /// `beta = 1/4`, all arithmetic in timer-tick units so no floating
    /// point is needed.
    pub fn update_rto(&self, measured_rtt: u32) {
        if self.srtt.get() == 0 {
            self.srtt.set(measured_rtt);
            self.rttvar.set(measured_rtt / 2);
        } else {
            let srtt = self.srtt.get();
            let rttvar = self.rttvar.get();
            let delta = if measured_rtt > srtt { measured_rtt - srtt } else { srtt - measured_rtt };
            self.rttvar.set(rttvar - rttvar / 4 + delta / 4);
            self.srtt.set(srtt - srtt / 8 + measured_rtt / 8);
        }
        let bound = core::cmp::max(4 * self.rttvar.get(), TCP_TIMER_RESOLUTION_SECS);
        let rto = core::cmp::max(self.srtt.get() + bound, RTO_FLOOR_SECS);
        self.rto.set(rto);
    }

    /// The effective retransmission timeout for the current retry count:
    /// `rto * 2^retries` ("Retransmission timer").
    pub fn effective_rto(&self) -> u32 {
        self.rto.get().saturating_mul(1 << core::cmp::min(self.retries.get(), 16))
    }

    pub fn has_unacked_data(&self) -> bool {
        self.send_nxt.get() != self.send_una.get()
    }
}

/// Sequence-number `<` comparison, modulo 2^32 (RFC 793 §3.3).
pub fn seq_lt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

/// Sequence-number `<=` comparison, modulo 2^32.
pub fn seq_leq(a: u32, b: u32) -> bool {
    a == b || seq_lt(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_open_sets_syn_sent_and_send_nxt() {
        let tcb = Tcb::new();
        tcb.open_active(Address([0x20; 16]), 49152, Address([0x30; 16]), 1100, 1000, 0);
        assert_eq!(tcb.state.get(), TcpState::SynSent);
        assert_eq!(tcb.send_una.get(), 1000);
        assert_eq!(tcb.send_nxt.get(), 1001);
    }

    #[test]
    fn passive_open_tracks_peer_isn() {
        let tcb = Tcb::new();
        tcb.open_passive(Address([0x30; 16]), 1100, Address([0x20; 16]), 49152, 2000, 500, 0);
        assert_eq!(tcb.state.get(), TcpState::SynRcvd);
        assert_eq!(tcb.rcv_irs.get(), 500);
        assert_eq!(tcb.rcv_nxt.get(), 501);
    }

    #[test]
    fn ack_window_accepts_only_new_unacked_data() {
        let tcb = Tcb::new();
        tcb.send_una.set(100);
        tcb.send_nxt.set(110);
        assert!(!tcb.ack_in_window(100));
        assert!(tcb.ack_in_window(105));
        assert!(tcb.ack_in_window(110));
        assert!(!tcb.ack_in_window(111));
        assert!(tcb.ack_too_small(100));
        assert!(tcb.ack_too_big(111));
    }

    #[test]
    fn sequence_comparison_handles_wraparound() {
        assert!(seq_lt(0xffff_fffe, 1));
        assert!(!seq_lt(1, 0xffff_fffe));
    }

    #[test]
    fn rto_bootstraps_then_smooths() {
        let tcb = Tcb::new();
        tcb.update_rto(4);
        assert_eq!(tcb.srtt.get(), 4);
        assert_eq!(tcb.rttvar.get(), 2);
        let first_rto = tcb.rto.get();
        tcb.update_rto(8);
        assert!(tcb.rto.get() >= RTO_FLOOR_SECS);
        assert_ne!(tcb.rto.get(), first_rto);
    }

    #[test]
    fn effective_rto_doubles_per_retry() {
        let tcb = Tcb::new();
        tcb.rto.set(2);
        tcb.retries.set(0);
        assert_eq!(tcb.effective_rto(), 2);
        tcb.retries.set(2);
        assert_eq!(tcb.effective_rto(), 8);
    }
}
