//! Board-settable network parameters ("configuration options via netapi"):
//! channel, addressing, PAN id, and the handful of switches that change how
//! the adaptation engine and TCP engine behave.
//!
//! Grounded on a constructor-injection pattern: rather than a global
//! mutable singleton, a `NetworkConfig` is built once by the board and
//! handed by reference to whichever layer needs it, the same way a
//! read-only context store would be threaded through.

use kernel::ReturnCode;

use crate::net::ieee802154::{MacAddress, PanID};
use crate::net::sixlowpan::MAX_DATAGRAM_SIZE;

/// IEEE 802.15.4 channels 11 through 26 (2.4 GHz, O-QPSK), the only
/// channel numbers a radio in this stack's scope can tune to.
const MIN_CHANNEL: u8 = 11;
const MAX_CHANNEL: u8 = 26;

/// Length, in bytes, of the link-layer source address a frame carries
/// ("source-address-length mode (1/2/8 bytes)").
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum AddressLengthMode {
    OneByte,
    TwoByte,
    EightByte,
}

impl AddressLengthMode {
    pub fn byte_len(&self) -> usize {
        match self {
            AddressLengthMode::OneByte => 1,
            AddressLengthMode::TwoByte => 2,
            AddressLengthMode::EightByte => 8,
        }
    }
}

/// The board's network configuration, assembled once at startup and passed
/// by reference to the adaptation engine, TCP engine, and socket layer.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct NetworkConfig {
    pub channel: u8,
    pub short_addr: u16,
    pub long_addr: [u8; 8],
    pub pan_id: PanID,
    pub addr_length_mode: AddressLengthMode,
    pub tcp_header_compression_enabled: bool,
}

impl NetworkConfig {
    /// Maximum packet size this stack will ever reassemble or fragment;
    /// read-only (the 11-bit `datagram_size` field's ceiling).
    pub const MAX_PACKET_SIZE: usize = MAX_DATAGRAM_SIZE;

    /// Builds a configuration, rejecting a channel number outside the
    /// known 802.15.4 set rather than silently accepting it (spec §9(c):
    /// an out-of-range board setting is `Unsupported`, never a sentinel
    /// success).
    pub fn new(
        channel: u8,
        short_addr: u16,
        long_addr: [u8; 8],
        pan_id: PanID,
        addr_length_mode: AddressLengthMode,
        tcp_header_compression_enabled: bool,
    ) -> Result<NetworkConfig, ReturnCode> {
        if channel < MIN_CHANNEL || channel > MAX_CHANNEL {
            return Err(ReturnCode::Unsupported);
        }
        Ok(NetworkConfig {
            channel,
            short_addr,
            long_addr,
            pan_id,
            addr_length_mode,
            tcp_header_compression_enabled,
        })
    }

    pub fn short_mac_address(&self) -> MacAddress {
        MacAddress::Short(self.short_addr)
    }

    pub fn long_mac_address(&self) -> MacAddress {
        MacAddress::Long(self.long_addr)
    }
}
