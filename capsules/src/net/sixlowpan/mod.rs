//! The 6LoWPAN adaptation engine: dispatch recognition, IPHC header
//! (de)compression, and datagram fragmentation/reassembly over an 802.15.4
//! link, per RFC 4944/6282.
//!
//! Grounded on `net::lowpan` (IPHC bit layout) and `net::lowpan_fragment`
//! (fragment state machine), restructured around `Hccb` in place of a
//! read-only `ContextStore` and with LOWPAN_NHC next-header compression
//! dropped entirely: the next header is always carried inline (NH=0) on
//! encode, and a decoded packet with NH=1 set is rejected as `Unsupported`
//! rather than walked.

pub mod dispatch;
pub mod engine;
pub mod fragment;
pub mod iphc;

pub use dispatch::{recognize, Dispatch};
pub use engine::{AdaptationEngine, Decoded, SixlowpanClient};

/// Largest IPv6 datagram this stack will reassemble or fragment, per the
/// 11-bit `datagram_size` field in the first-fragment header (RFC 4944 §5.3).
pub const MAX_DATAGRAM_SIZE: usize = 2047;
