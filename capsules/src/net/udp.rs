//! The UDP header (RFC 768) and its IPv6 pseudo-header checksum.
//!
//! Grounded on a plain `UDPHeader` field struct, rebuilt with full
//! `encode`/`decode` against this crate's `net::stream` macros and wired to
//! `net::checksum::pseudo_header_sum` instead of leaving checksum
//! computation to a caller.

use crate::net::checksum;
use crate::net::ip6::Address;
use crate::net::stream::SResult;
use crate::net::stream::{decode_u16, encode_u16};

pub const HEADER_SIZE: usize = 8;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    /// Length of the UDP header plus payload, in bytes.
    pub len: u16,
    pub cksum: u16,
}

impl Default for UdpHeader {
    fn default() -> UdpHeader {
        UdpHeader {
            src_port: 0,
            dst_port: 0,
            len: HEADER_SIZE as u16,
            cksum: 0,
        }
    }
}

impl UdpHeader {
    pub fn encode(&self, buf: &mut [u8]) -> SResult {
        let off = enc_consume!(buf; encode_u16, self.src_port);
        let off = enc_consume!(buf, off; encode_u16, self.dst_port);
        let off = enc_consume!(buf, off; encode_u16, self.len);
        let off = enc_consume!(buf, off; encode_u16, self.cksum);
        stream_done!(off);
    }

    pub fn decode(buf: &[u8]) -> SResult<UdpHeader> {
        let (off, src_port) = dec_try!(buf, 0; decode_u16);
        let (off, dst_port) = dec_try!(buf, off; decode_u16);
        let (off, len) = dec_try!(buf, off; decode_u16);
        let (off, cksum) = dec_try!(buf, off; decode_u16);
        stream_done!(
            off,
            UdpHeader {
                src_port,
                dst_port,
                len,
                cksum,
            }
        );
    }
}

/// Computes the UDP checksum over the IPv6 pseudo-header, the UDP header
/// (with the checksum field itself zeroed), and `payload`. Per RFC 768, a
/// computed value of `0` is transmitted as `0xffff`.
pub fn compute_checksum(src: &Address, dst: &Address, header: &UdpHeader, payload: &[u8]) -> u16 {
    let mut sum = checksum::pseudo_header_sum(src, dst, header.len as u32, crate::net::ip6::NextHeaderType::UDP as u8);
    sum += (header.src_port as u32) + (header.dst_port as u32) + (header.len as u32);
    sum += checksum::sum_bytes(payload);
    let computed = checksum::fold_and_complement(sum);
    if computed == 0 {
        0xffff
    } else {
        computed
    }
}

/// Verifies `header.cksum` against the pseudo-header, `header`, and
/// `payload`. A transmitted `0xffff` (meaning "computed value was zero")
/// verifies correctly because `compute_checksum` with `cksum` zeroed out
/// folds to the same result.
pub fn verify_checksum(src: &Address, dst: &Address, header: &UdpHeader, payload: &[u8]) -> bool {
    let mut zeroed = *header;
    zeroed.cksum = 0;
    let expected = compute_checksum(src, dst, &zeroed, payload);
    expected == header.cksum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_header() {
        let header = UdpHeader {
            src_port: 5683,
            dst_port: 1100,
            len: 16,
            cksum: 0xabcd,
        };
        let mut buf = [0u8; HEADER_SIZE];
        header.encode(&mut buf).done().unwrap();
        let decoded = UdpHeader::decode(&buf).done().unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn checksum_round_trips_through_verify() {
        let src = Address([0x20; 16]);
        let dst = Address([0x30; 16]);
        let payload = [1u8, 2, 3, 4, 5];
        let mut header = UdpHeader {
            src_port: 1,
            dst_port: 2,
            len: HEADER_SIZE as u16 + payload.len() as u16,
            cksum: 0,
        };
        header.cksum = compute_checksum(&src, &dst, &header, &payload);
        assert!(verify_checksum(&src, &dst, &header, &payload));
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let src = Address([0x20; 16]);
        let dst = Address([0x30; 16]);
        let payload = [1u8, 2, 3, 4, 5];
        let mut header = UdpHeader {
            src_port: 1,
            dst_port: 2,
            len: HEADER_SIZE as u16 + payload.len() as u16,
            cksum: 0,
        };
        header.cksum = compute_checksum(&src, &dst, &header, &payload);
        let tampered = [1u8, 2, 3, 4, 6];
        assert!(!verify_checksum(&src, &dst, &header, &tampered));
    }
}
