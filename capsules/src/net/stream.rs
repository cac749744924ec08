//! A small binary stream codec used by every header encoder/decoder in this
//! crate (6LoWPAN dispatch and IPHC, IPv6, UDP, TCP, ICMPv6, ...).
//!
//! Every encode/decode step returns an `SResult`, and the macros below wire
//! those steps together without the boilerplate of matching on the variant
//! at each call site. The convention throughout is that "encode"/"decode"
//! functions take a buffer and a starting offset and return the new offset;
//! chains of them thread that offset through with `enc_consume!`/`dec_try!`.

use core::result::Result;

/// The result of one encode or decode step.
///
/// `Done(offset, value)` carries the new stream offset and whatever the step
/// produced; `Needed(n)` reports that the buffer was too short and at least
/// `n` more bytes are required; `Error(())` reports a step that cannot
/// succeed regardless of buffer length (a bad discriminant, a failed
/// `stream_cond!`, ...).
pub enum SResult<T = ()> {
    Done(usize, T),
    Needed(usize),
    Error(()),
}

impl<T> SResult<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, SResult::Done(_, _))
    }

    /// Converts to a plain `Result`, discarding the offset on success and
    /// collapsing `Needed`/`Error` into `Err(())`.
    pub fn done(self) -> Result<T, ()> {
        match self {
            SResult::Done(_, v) => Ok(v),
            SResult::Needed(_) | SResult::Error(()) => Err(()),
        }
    }
}

/// Fails the enclosing function with `SResult::Error(())` unless `cond`
/// holds.
#[macro_export]
macro_rules! stream_cond {
    ($cond:expr) => {
        if !($cond) {
            return $crate::net::stream::SResult::Error(());
        }
    };
}

/// Fails the enclosing function unless `buf` is at least `len` bytes long.
#[macro_export]
macro_rules! stream_len_cond {
    ($buf:expr, $len:expr) => {
        if $buf.len() < $len {
            return $crate::net::stream::SResult::Error(());
        }
    };
}

/// Unwraps an `Option`, failing the enclosing function with
/// `SResult::Error(())` on `None`. Used for fallible enum discriminant
/// conversions (e.g. `NextHeaderType::from_nh`).
#[macro_export]
macro_rules! stream_from_option {
    ($opt:expr) => {
        match $opt {
            Some(v) => v,
            None => return $crate::net::stream::SResult::Error(()),
        }
    };
}

/// Returns `SResult::Done(offset, value)` from the enclosing function.
/// A single argument produces `Done(offset, ())`.
#[macro_export]
macro_rules! stream_done {
    ($offset:expr, $value:expr) => {
        return $crate::net::stream::SResult::Done($offset, $value)
    };
    ($offset:expr) => {
        return $crate::net::stream::SResult::Done($offset, ())
    };
}

/// Runs one encode step and yields the new offset, propagating `Needed`/
/// `Error` out of the enclosing function. The three forms are:
/// - `enc_consume!(buf; f, args...)` — step starts at offset 0.
/// - `enc_consume!(buf, off; f, args...)` — step starts at `off`, calling a
///   free function `f(buf, off, args...)`.
/// - `enc_consume!(buf, off; recv; method)` — calls `recv.method(&mut
///   buf[off..])` (used for nested header structs that encode themselves).
#[macro_export]
macro_rules! enc_consume {
    ($buf:expr; $fn:ident, $($arg:expr),*) => {
        enc_consume!($buf, 0; $fn, $($arg),*)
    };
    ($buf:expr, $offset:expr; $fn:ident, $($arg:expr),*) => {
        match $fn($buf, $offset, $($arg),*) {
            $crate::net::stream::SResult::Done(offset, _) => offset,
            $crate::net::stream::SResult::Needed(n) => return $crate::net::stream::SResult::Needed(n),
            $crate::net::stream::SResult::Error(()) => return $crate::net::stream::SResult::Error(()),
        }
    };
    ($buf:expr, $offset:expr; $recv:expr; $method:ident) => {
        match $recv.$method(&mut $buf[$offset..]) {
            $crate::net::stream::SResult::Done(consumed, _) => $offset + consumed,
            $crate::net::stream::SResult::Needed(n) => return $crate::net::stream::SResult::Needed(n),
            $crate::net::stream::SResult::Error(()) => return $crate::net::stream::SResult::Error(()),
        }
    };
}

/// Like `enc_consume!`, but for steps whose success value is discarded and
/// only the offset matters (e.g. `decode_bytes` filling a fixed-size array).
#[macro_export]
macro_rules! dec_consume {
    ($buf:expr; $fn:ident, $($arg:expr),*) => {
        dec_consume!($buf, 0; $fn, $($arg),*)
    };
    ($buf:expr, $offset:expr; $fn:ident, $($arg:expr),*) => {
        match $fn($buf, $offset, $($arg),*) {
            $crate::net::stream::SResult::Done(offset, _) => offset,
            $crate::net::stream::SResult::Needed(n) => return $crate::net::stream::SResult::Needed(n),
            $crate::net::stream::SResult::Error(()) => return $crate::net::stream::SResult::Error(()),
        }
    };
}

/// Runs one decode step and yields `(new_offset, value)`, propagating
/// `Needed`/`Error` out of the enclosing function. `dec_try!(buf, off; f)`
/// calls a free function `f(buf, off)`; `dec_try!(buf, off; Type::decode)`
/// calls `Type::decode(&buf[off..])` and rebases its offset onto `off`.
#[macro_export]
macro_rules! dec_try {
    ($buf:expr, $offset:expr; $fn:path) => {
        match $fn($buf, $offset) {
            $crate::net::stream::SResult::Done(offset, val) => (offset, val),
            $crate::net::stream::SResult::Needed(n) => return $crate::net::stream::SResult::Needed(n),
            $crate::net::stream::SResult::Error(()) => return $crate::net::stream::SResult::Error(()),
        }
    };
}

macro_rules! impl_encode_int {
    ($name:ident, $ty:ty, $len:expr) => {
        pub fn $name(buf: &mut [u8], offset: usize, n: $ty) -> SResult {
            if buf.len() < offset + $len {
                return SResult::Needed(offset + $len - buf.len());
            }
            let bytes = n.to_be_bytes();
            buf[offset..offset + $len].copy_from_slice(&bytes);
            SResult::Done(offset + $len, ())
        }
    };
}

macro_rules! impl_decode_int {
    ($name:ident, $ty:ty, $len:expr) => {
        pub fn $name(buf: &[u8], offset: usize) -> SResult<$ty> {
            if buf.len() < offset + $len {
                return SResult::Needed(offset + $len - buf.len());
            }
            let mut bytes = [0u8; $len];
            bytes.copy_from_slice(&buf[offset..offset + $len]);
            SResult::Done(offset + $len, <$ty>::from_be_bytes(bytes))
        }
    };
}

impl_encode_int!(encode_u8, u8, 1);
impl_encode_int!(encode_u16, u16, 2);
impl_encode_int!(encode_u32, u32, 4);
impl_decode_int!(decode_u8, u8, 1);
impl_decode_int!(decode_u16, u16, 2);
impl_decode_int!(decode_u32, u32, 4);

/// Copies `bytes` into `buf` starting at `offset`.
pub fn encode_bytes(buf: &mut [u8], offset: usize, bytes: &[u8]) -> SResult {
    if buf.len() < offset + bytes.len() {
        return SResult::Needed(offset + bytes.len() - buf.len());
    }
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    SResult::Done(offset + bytes.len(), ())
}

/// Fills `out` from `buf` starting at `offset`.
pub fn decode_bytes(buf: &[u8], offset: usize, out: &mut [u8]) -> SResult {
    if buf.len() < offset + out.len() {
        return SResult::Needed(offset + out.len() - buf.len());
    }
    out.copy_from_slice(&buf[offset..offset + out.len()]);
    SResult::Done(offset + out.len(), ())
}
