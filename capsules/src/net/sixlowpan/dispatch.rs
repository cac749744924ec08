//! Recognizes the leading dispatch byte of a 6LoWPAN frame per RFC 4944 §5.1
//! and RFC 6282 §3.1's `011xxxxx` IPHC pattern.

use kernel::ReturnCode;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Dispatch {
    /// `01000001`: an uncompressed IPv6 datagram follows verbatim.
    Uncompressed,
    /// `011xxxxx`: a LOWPAN_IPHC compressed header follows.
    Iphc,
    /// `11000xxx`: the first fragment of a multi-fragment datagram.
    FragmentFirst,
    /// `11100xxx`: a non-initial fragment of a multi-fragment datagram.
    FragmentSubsequent,
    /// Leading `00`: not a 6LoWPAN frame (RFC 4944 reserves this for
    /// "not a LoWPAN frame"); the frame is dropped without comment.
    NotLowpan,
}

const DISPATCH_UNCOMPRESSED: u8 = 0b0100_0001;
const DISPATCH_IPHC_MASK: u8 = 0b1110_0000;
const DISPATCH_IPHC_VALUE: u8 = 0b0110_0000;
const DISPATCH_FRAG_MASK: u8 = 0b1111_1000;
const DISPATCH_FRAG_FIRST: u8 = 0b1100_0000;
const DISPATCH_FRAG_SUBSEQUENT: u8 = 0b1110_0000;
const DISPATCH_NOT_LOWPAN_MASK: u8 = 0b1100_0000;

pub fn recognize(byte: u8) -> Result<Dispatch, ReturnCode> {
    if byte == DISPATCH_UNCOMPRESSED {
        return Ok(Dispatch::Uncompressed);
    }
    if byte & DISPATCH_IPHC_MASK == DISPATCH_IPHC_VALUE {
        return Ok(Dispatch::Iphc);
    }
    if byte & DISPATCH_FRAG_MASK == DISPATCH_FRAG_FIRST {
        return Ok(Dispatch::FragmentFirst);
    }
    if byte & DISPATCH_FRAG_MASK == DISPATCH_FRAG_SUBSEQUENT {
        return Ok(Dispatch::FragmentSubsequent);
    }
    if byte & DISPATCH_NOT_LOWPAN_MASK == 0 {
        return Ok(Dispatch::NotLowpan);
    }
    Err(ReturnCode::InvalidDispatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_uncompressed() {
        assert_eq!(recognize(0b0100_0001), Ok(Dispatch::Uncompressed));
    }

    #[test]
    fn recognizes_iphc_regardless_of_low_bits() {
        assert_eq!(recognize(0b0110_0000), Ok(Dispatch::Iphc));
        assert_eq!(recognize(0b0111_1111), Ok(Dispatch::Iphc));
    }

    #[test]
    fn recognizes_fragment_first_and_subsequent() {
        assert_eq!(recognize(0b1100_0011), Ok(Dispatch::FragmentFirst));
        assert_eq!(recognize(0b1110_0011), Ok(Dispatch::FragmentSubsequent));
    }

    #[test]
    fn not_lowpan_frames_are_reported_not_errored() {
        assert_eq!(recognize(0b0011_1111), Ok(Dispatch::NotLowpan));
    }

    #[test]
    fn unrecognized_pattern_is_invalid() {
        assert_eq!(recognize(0b1000_0000), Err(ReturnCode::InvalidDispatch));
    }
}
