//! The 20-byte TCP header (RFC 793 §3.1) plus the single MSS option this
//! stack emits. Grounded on a plain `net::tcp::TCPHeader` field struct (no
//! encode/decode of its own) and RIOT's `tcp_hdr_t`
//! (`original_source/sys/net/destiny/tcp.h`), re-expressed against this
//! crate's `net::stream` codec.

use crate::net::checksum;
use crate::net::ip6::{Address, NextHeaderType};
use crate::net::stream::SResult;
use crate::net::stream::{decode_u16, decode_u32, decode_u8, encode_u16, encode_u32, encode_u8};

/// Header length with no options, in bytes.
pub const HEADER_SIZE: usize = 20;
/// Header length with the MSS option appended, in bytes.
pub const HEADER_SIZE_WITH_MSS: usize = HEADER_SIZE + 4;

pub const FLAG_FIN: u16 = 1 << 0;
pub const FLAG_SYN: u16 = 1 << 1;
pub const FLAG_RST: u16 = 1 << 2;
pub const FLAG_PSH: u16 = 1 << 3;
pub const FLAG_ACK: u16 = 1 << 4;
pub const FLAG_URG: u16 = 1 << 5;

const MSS_OPTION_KIND: u8 = 2;
const MSS_OPTION_LEN: u8 = 4;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq_nr: u32,
    pub ack_nr: u32,
    /// Data offset in 4-byte units; only 20 or 24 (with MSS) are emitted.
    pub data_offset: u8,
    pub flags: u16,
    pub window: u16,
    pub cksum: u16,
    pub urgent_ptr: u16,
    /// `Some(mss)` to emit the MSS option (only meaningful on SYN segments).
    pub mss: Option<u16>,
}

impl Default for TcpHeader {
    fn default() -> TcpHeader {
        TcpHeader {
            src_port: 0,
            dst_port: 0,
            seq_nr: 0,
            ack_nr: 0,
            data_offset: (HEADER_SIZE / 4) as u8,
            flags: 0,
            window: 0,
            cksum: 0,
            urgent_ptr: 0,
            mss: None,
        }
    }
}

impl TcpHeader {
    pub fn flag_is_set(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }

    pub fn set_flag(&mut self, flag: u16) {
        self.flags |= flag;
    }

    pub fn encoded_len(&self) -> usize {
        if self.mss.is_some() {
            HEADER_SIZE_WITH_MSS
        } else {
            HEADER_SIZE
        }
    }

    pub fn encode(&self, buf: &mut [u8]) -> SResult {
        let off = enc_consume!(buf; encode_u16, self.src_port);
        let off = enc_consume!(buf, off; encode_u16, self.dst_port);
        let off = enc_consume!(buf, off; encode_u32, self.seq_nr);
        let off = enc_consume!(buf, off; encode_u32, self.ack_nr);

        let data_offset = if self.mss.is_some() {
            (HEADER_SIZE_WITH_MSS / 4) as u8
        } else {
            (HEADER_SIZE / 4) as u8
        };
        let off = enc_consume!(buf, off; encode_u8, data_offset << 4);
        let off = enc_consume!(buf, off; encode_u8, self.flags as u8 & 0x3f);
        let off = enc_consume!(buf, off; encode_u16, self.window);
        let off = enc_consume!(buf, off; encode_u16, self.cksum);
        let off = enc_consume!(buf, off; encode_u16, self.urgent_ptr);

        let off = if let Some(mss) = self.mss {
            let off = enc_consume!(buf, off; encode_u8, MSS_OPTION_KIND);
            let off = enc_consume!(buf, off; encode_u8, MSS_OPTION_LEN);
            enc_consume!(buf, off; encode_u16, mss)
        } else {
            off
        };
        stream_done!(off);
    }

    pub fn decode(buf: &[u8]) -> SResult<TcpHeader> {
        let (off, src_port) = dec_try!(buf, 0; decode_u16);
        let (off, dst_port) = dec_try!(buf, off; decode_u16);
        let (off, seq_nr) = dec_try!(buf, off; decode_u32);
        let (off, ack_nr) = dec_try!(buf, off; decode_u32);
        let (off, offset_byte) = dec_try!(buf, off; decode_u8);
        let data_offset = offset_byte >> 4;
        let (off, flags_byte) = dec_try!(buf, off; decode_u8);
        let flags = (flags_byte & 0x3f) as u16;
        let (off, window) = dec_try!(buf, off; decode_u16);
        let (off, cksum) = dec_try!(buf, off; decode_u16);
        let (off, urgent_ptr) = dec_try!(buf, off; decode_u16);

        stream_cond!(data_offset as usize >= HEADER_SIZE / 4);
        let options_len = (data_offset as usize) * 4 - HEADER_SIZE;
        stream_len_cond!(buf, off + options_len);

        let mut mss = None;
        let mut opt_off = off;
        // Only the MSS option is interpreted; anything else is skipped over
        // (tolerated but not acted on).
        while opt_off < off + options_len {
            let kind = buf[opt_off];
            if kind == 0 {
                break;
            }
            if kind == 1 {
                opt_off += 1;
                continue;
            }
            if opt_off + 1 >= off + options_len {
                break;
            }
            let len = buf[opt_off + 1] as usize;
            if len < 2 || opt_off + len > off + options_len {
                break;
            }
            if kind == MSS_OPTION_KIND && len == MSS_OPTION_LEN as usize {
                let (_, decoded_mss) = dec_try!(buf, opt_off + 2; decode_u16);
                mss = Some(decoded_mss);
            }
            opt_off += len;
        }

        stream_done!(
            off + options_len,
            TcpHeader {
                src_port,
                dst_port,
                seq_nr,
                ack_nr,
                data_offset,
                flags,
                window,
                cksum,
                urgent_ptr,
                mss,
            }
        );
    }
}

/// Computes the TCP checksum over the IPv6 pseudo-header, `header` (with
/// its checksum field zeroed), and `payload`. Per RFC 793/1071, a computed
/// value of `0` is transmitted as `0xffff`.
pub fn compute_checksum(src: &Address, dst: &Address, header: &TcpHeader, payload: &[u8]) -> u16 {
    let segment_len = header.encoded_len() as u32 + payload.len() as u32;
    let mut sum = checksum::pseudo_header_sum(src, dst, segment_len, NextHeaderType::TCP as u8);
    sum += (header.src_port as u32) + (header.dst_port as u32);
    sum += header.seq_nr >> 16;
    sum += header.seq_nr & 0xffff;
    sum += header.ack_nr >> 16;
    sum += header.ack_nr & 0xffff;
    let offset_byte = header.data_offset_for_checksum() << 4;
    sum += ((offset_byte as u32) << 8) | (header.flags as u8 & 0x3f) as u32;
    sum += header.window as u32;
    sum += header.urgent_ptr as u32;
    if let Some(mss) = header.mss {
        sum += ((MSS_OPTION_KIND as u32) << 8) | MSS_OPTION_LEN as u32;
        sum += mss as u32;
    }
    sum += checksum::sum_bytes(payload);
    let computed = checksum::fold_and_complement(sum);
    if computed == 0 {
        0xffff
    } else {
        computed
    }
}

impl TcpHeader {
    fn data_offset_for_checksum(&self) -> u8 {
        if self.mss.is_some() {
            (HEADER_SIZE_WITH_MSS / 4) as u8
        } else {
            (HEADER_SIZE / 4) as u8
        }
    }
}

/// Verifies `header.cksum` against the pseudo-header, `header`, and
/// `payload`.
pub fn verify_checksum(src: &Address, dst: &Address, header: &TcpHeader, payload: &[u8]) -> bool {
    let mut zeroed = *header;
    zeroed.cksum = 0;
    compute_checksum(src, dst, &zeroed, payload) == header.cksum
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> TcpHeader {
        TcpHeader {
            src_port: 1100,
            dst_port: 43210,
            seq_nr: 0x1000_0001,
            ack_nr: 0,
            data_offset: 5,
            flags: FLAG_SYN,
            window: 48,
            cksum: 0,
            urgent_ptr: 0,
            mss: Some(48),
        }
    }

    #[test]
    fn round_trips_a_header_with_mss_option() {
        let header = sample_header();
        let mut buf = [0u8; HEADER_SIZE_WITH_MSS];
        let len = match header.encode(&mut buf) {
            SResult::Done(len, ()) => len,
            _ => panic!("encode failed"),
        };
        assert_eq!(len, HEADER_SIZE_WITH_MSS);
        match TcpHeader::decode(&buf) {
            SResult::Done(len, decoded) => {
                assert_eq!(len, HEADER_SIZE_WITH_MSS);
                assert_eq!(decoded.src_port, header.src_port);
                assert_eq!(decoded.seq_nr, header.seq_nr);
                assert_eq!(decoded.flags, header.flags);
                assert_eq!(decoded.mss, header.mss);
            }
            _ => panic!("decode failed"),
        }
    }

    #[test]
    fn round_trips_a_header_without_options() {
        let mut header = sample_header();
        header.mss = None;
        let mut buf = [0u8; HEADER_SIZE];
        header.encode(&mut buf).done().unwrap();
        let decoded = TcpHeader::decode(&buf).done().unwrap();
        assert_eq!(decoded.mss, None);
        assert_eq!(decoded.data_offset as usize, HEADER_SIZE / 4);
    }

    #[test]
    fn checksum_round_trips_through_verify() {
        let src = Address([0x20; 16]);
        let dst = Address([0x30; 16]);
        let payload = [0xaa, 0xbb, 0xcc];
        let mut header = sample_header();
        header.cksum = compute_checksum(&src, &dst, &header, &payload);
        assert!(verify_checksum(&src, &dst, &header, &payload));
    }

    #[test]
    fn flags_are_confined_to_six_bits() {
        let mut header = TcpHeader::default();
        header.set_flag(FLAG_SYN);
        header.set_flag(FLAG_ACK);
        assert!(header.flag_is_set(FLAG_SYN));
        assert!(header.flag_is_set(FLAG_ACK));
        assert!(!header.flag_is_set(FLAG_FIN));
    }
}
