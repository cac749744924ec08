//! Ties dispatch recognition, IPHC (de)compression, and fragmentation
//! together into the single entry point a MAC receive callback and a
//! socket-layer send path both call through.
//!
//! Grounded on the `Sixlowpan` capsule (`net::sixlowpan.rs`), which plays
//! the same "one object owns the HCCB + reassembly table and fans decoded
//! datagrams out to registered clients" role; restructured around this
//! crate's `Hccb`/`ReassemblyTable`/`iphc` in place of a `ContextStore`/
//! `RxState` list.

use kernel::debug;
use kernel::ReturnCode;

use crate::net::hccb::Hccb;
use crate::net::ieee802154::MacAddress;
use crate::net::ip6::Header;
use crate::net::sixlowpan::dispatch::{self, Dispatch};
use crate::net::sixlowpan::fragment::{plan_segments, LinkAddr, ReassemblyEntry, ReassemblyTable, SegmentPlan};
use crate::net::sixlowpan::iphc;
use crate::net::sixlowpan::MAX_DATAGRAM_SIZE;

/// Upper-layer registrations the adaptation engine dispatches a completed
/// datagram to, in registration order ("Registration", default
/// size 2).
pub const REGISTRY_SIZE: usize = 2;

/// A fully materialized, decoded datagram: an IPv6 header plus however
/// many bytes of payload actually arrived.
pub struct Decoded<'a> {
    pub header: Header,
    pub payload: &'a [u8],
}

/// The 6LoWPAN adaptation engine: owns the HCCB, the reassembly table, and
/// the upper-layer registry, and drives dispatch recognition on every
/// incoming frame.
pub struct AdaptationEngine<'a> {
    hccb: &'a Hccb,
    reassembly: ReassemblyTable<'a>,
    registry: [Option<&'a dyn SixlowpanClient>; REGISTRY_SIZE],
    registry_len: core::cell::Cell<usize>,
    next_tag: core::cell::Cell<u16>,
}

/// Receives a fully reassembled and decompressed datagram.
pub trait SixlowpanClient {
    /// Returning `Err` aborts delivery to the remaining registered clients
    /// for this datagram (this module's "any task returning a fatal error
    /// aborts further delivery").
    fn receive(&self, header: &Header, payload: &[u8]) -> Result<(), ReturnCode>;
}

impl<'a> AdaptationEngine<'a> {
    pub fn new(hccb: &'a Hccb, reassembly_entries: &'a [ReassemblyEntry]) -> AdaptationEngine<'a> {
        AdaptationEngine {
            hccb,
            reassembly: ReassemblyTable::new(reassembly_entries),
            registry: [None; REGISTRY_SIZE],
            registry_len: core::cell::Cell::new(0),
            next_tag: core::cell::Cell::new(0),
        }
    }

    /// Registers `client` to receive future datagrams. `Err(ENOMEM)` if the
    /// registry is full.
    pub fn register(&mut self, client: &'a dyn SixlowpanClient) -> ReturnCode {
        let len = self.registry_len.get();
        if len >= REGISTRY_SIZE {
            return ReturnCode::ENOMEM;
        }
        self.registry[len] = Some(client);
        self.registry_len.set(len + 1);
        ReturnCode::SUCCESS
    }

    fn dispatch_to_registry(&self, header: &Header, payload: &[u8]) {
        for slot in self.registry[..self.registry_len.get()].iter().flatten() {
            if slot.receive(header, payload).is_err() {
                debug!("sixlowpan: registry delivery aborted by client");
                break;
            }
        }
    }

    /// Processes one incoming link-layer frame. `src`/`dst` are the
    /// link-layer source/destination addresses (1, 2, or 8 bytes).
    /// Wire-format errors are dropped silently and returned only so the
    /// caller can count them; they are never a panic.
    pub fn receive(
        &self,
        frame: &[u8],
        src_mac: MacAddress,
        dst_mac: MacAddress,
        src_link: &[u8],
        dst_link: &[u8],
        now_micros: u64,
        now_minutes: u32,
    ) -> Result<(), ReturnCode> {
        if frame.is_empty() {
            return Err(ReturnCode::LengthTooShort);
        }
        match dispatch::recognize(frame[0])? {
            Dispatch::NotLowpan => Ok(()),
            Dispatch::Uncompressed => {
                // The rest of the frame is an uncompressed IPv6 datagram
                // handed up whole; this layer only strips the dispatch
                // byte, it does not parse the IPv6 header itself.
                self.dispatch_to_registry(&Header::default(), &frame[1..]);
                Ok(())
            }
            Dispatch::Iphc => {
                let (header, consumed) = iphc::decompress(self.hccb, frame, src_mac, dst_mac, now_minutes)?;
                self.dispatch_to_registry(&header, &frame[consumed..]);
                Ok(())
            }
            Dispatch::FragmentFirst => {
                let src = LinkAddr::new(src_link)?;
                let dst = LinkAddr::new(dst_link)?;
                if let Some((entry, size)) = self.reassembly.receive_first(frame, src, dst, now_micros)? {
                    self.deliver_reassembled(entry, size, src_mac, dst_mac, now_minutes);
                }
                Ok(())
            }
            Dispatch::FragmentSubsequent => {
                let src = LinkAddr::new(src_link)?;
                let dst = LinkAddr::new(dst_link)?;
                if let Some((entry, size)) = self.reassembly.receive_subsequent(frame, src, dst, now_micros)? {
                    self.deliver_reassembled(entry, size, src_mac, dst_mac, now_minutes);
                }
                Ok(())
            }
        }
    }

    fn deliver_reassembled(
        &self,
        entry: &ReassemblyEntry,
        size: usize,
        src_mac: MacAddress,
        dst_mac: MacAddress,
        now_minutes: u32,
    ) {
        let mut assembled = [0u8; MAX_DATAGRAM_SIZE];
        entry.assembled(size, &mut assembled[..size]);
        let assembled = &assembled[..size];
        if assembled.is_empty() {
            return;
        }
        match dispatch::recognize(assembled[0]) {
            Ok(Dispatch::Iphc) => {
                if let Ok((header, consumed)) = iphc::decompress(self.hccb, assembled, src_mac, dst_mac, now_minutes) {
                    self.dispatch_to_registry(&header, &assembled[consumed..]);
                } else {
                    debug!("sixlowpan: dropping reassembled datagram with invalid IPHC header");
                }
            }
            Ok(Dispatch::Uncompressed) => {
                self.dispatch_to_registry(&Header::default(), &assembled[1..]);
            }
            _ => debug!("sixlowpan: dropping reassembled datagram with unrecognized dispatch"),
        }
    }

    /// Draws a fresh, monotonically increasing datagram tag for the next
    /// fragmented send (this module's "opaque to the peer" requirement).
    pub fn draw_tag(&self) -> u16 {
        let tag = self.next_tag.get();
        self.next_tag.set(tag.wrapping_add(1));
        tag
    }

    /// Compresses `header` into `buf`, returning the number of header bytes
    /// written; the caller appends payload immediately after. The 2-byte
    /// (or 3-byte, with a context extension) IPHC header is always
    /// written; fragmentation sizing, if needed, is computed separately by
    /// `plan_segments`.
    pub fn compress(&self, header: &Header, src_mac: MacAddress, dst_mac: MacAddress, now_minutes: u32, buf: &mut [u8]) -> Result<usize, ReturnCode> {
        iphc::compress(self.hccb, header, src_mac, dst_mac, now_minutes, buf)
    }

    pub fn hccb(&self) -> &'a Hccb {
        self.hccb
    }
}

/// Computes the send-side fragmentation plan for a compressed-header-plus-
/// payload datagram of `total_len` bytes, where `header_len` bytes of it
/// are the already-written inline IPHC fields.
pub fn plan_send(total_len: usize, header_len: usize, mtu: usize) -> Result<Option<SegmentPlan>, ReturnCode> {
    plan_segments(total_len, header_len, mtu)
}
