//! The radio/MAC interface the adaptation engine sends frames through and
//! receives frames from.
//!
//! Raw 802.15.4 PHY/MAC transmission (CSMA backoff, FCS, channel
//! access) is out of scope for this repository; a board wires a concrete
//! `Mac` implementation in from elsewhere and the adaptation engine only
//! ever sees this trait.

/// Byte offset of the MAC payload within a radio buffer, after the PHY
/// framing and FCS the radio driver reserves for itself.
pub const PSDU_OFFSET: usize = 2;
/// Trailing bytes reserved for the MAC Frame Check Sequence.
pub const MFR_SIZE: usize = 2;
/// Largest PSDU an 802.15.4 radio accepts by default.
pub const MAX_FRAME_SIZE: usize = 127;

/// A single outgoing or incoming MAC frame.
pub struct Frame {
    buf: &'static mut [u8],
    len: usize,
}

impl Frame {
    pub fn new(buf: &'static mut [u8], len: usize) -> Frame {
        Frame { buf, len }
    }

    pub fn payload(&self) -> &[u8] {
        &self.buf[PSDU_OFFSET..PSDU_OFFSET + self.len]
    }

    pub fn into_buf(self) -> &'static mut [u8] {
        self.buf
    }
}

/// Notified once a frame handed to `Mac::transmit` has left the radio (or
/// failed to).
pub trait TxClient {
    fn send_done(&self, buf: &'static mut [u8], acked: bool, result: crate::ReturnCode);
}

/// Notified whenever the radio hands up a received frame.
pub trait RxClient {
    fn receive(&self, buf: &'static mut [u8], len: u8);
}

/// The minimal surface the adaptation engine needs from a MAC device: hand
/// it a frame with a destination address and get a `send_done` callback;
/// register to be told about incoming frames.
pub trait Mac {
    fn set_transmit_client(&self, client: &'static dyn TxClient);
    fn set_receive_client(&self, client: &'static dyn RxClient);
    fn transmit(&self, buf: &'static mut [u8], len: u8) -> crate::ReturnCode;
}
