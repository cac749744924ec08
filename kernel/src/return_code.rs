//! Return/error codes threaded through every fallible kernel and capsule
//! operation, in place of exceptions or `errno`-style sentinels.

/// The result of a kernel or capsule operation.
///
/// Mirrors the small, flat set of codes the Tock kernel has always used for
/// synchronous command results, extended with the wire/protocol-specific
/// kinds this stack needs (fragment reassembly, header compression,
/// TCP segment validation).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ReturnCode {
    /// Operation completed successfully.
    SUCCESS,
    /// Generic failure.
    FAIL,
    /// Underlying resource is busy; retry later.
    EBUSY,
    /// Operation already in progress or already done.
    EALREADY,
    /// Underlying resource is powered off.
    EOFF,
    /// Resource reservation failed.
    ERESERVE,
    /// An argument was invalid.
    EINVAL,
    /// A buffer was the wrong size.
    ESIZE,
    /// Operation was cancelled.
    ECANCEL,
    /// Out of memory/buffers.
    ENOMEM,
    /// Operation or feature not supported.
    ENOSUPPORT,
    /// No such device.
    ENODEVICE,
    /// Device is off and cannot be used.
    EUOFF,
    /// No acknowledgment was received for a transmission.
    ENOACK,

    /// The leading dispatch bits did not match any recognized 6LoWPAN form.
    InvalidDispatch,
    /// Buffer did not contain as many bytes as the header demands.
    LengthTooShort,
    /// A compressed-and-fragmented datagram would exceed the 2047-byte cap.
    MessageTooLong,
    /// A link-layer address length outside {1, 2, 8} bytes was supplied.
    AddressFamilyUnsupported,
    /// SAC/DAC referenced a context id the HCCB does not hold.
    ContextUnavailable,
    /// A reserved DAM/DAC/M combination that requires an explicit address.
    DestinationAddressRequired,
    /// The packet buffer allocator has no free slices left.
    OutOfBuffers,
    /// A checksum did not validate.
    ChecksumInvalid,
    /// A TCP segment acknowledged data that was never sent.
    AckTooBig,
    /// A TCP segment acknowledged data that was already acknowledged.
    AckTooSmall,
    /// A TCP data segment arrived below the expected sequence number.
    SeqTooSmall,
    /// Operation attempted on a socket with no active connection.
    NotConnected,
    /// The requested resource (port, cid, ...) is already bound/in use.
    AlreadyInUse,
    /// The operation exceeded its deadline.
    Timeout,
    /// The requested feature is recognized but not implemented.
    Unsupported,
}

impl ReturnCode {
    /// True for `SUCCESS` only.
    pub fn is_success(&self) -> bool {
        matches!(self, ReturnCode::SUCCESS)
    }
}

impl From<ReturnCode> for isize {
    fn from(original: ReturnCode) -> isize {
        match original {
            ReturnCode::SUCCESS => 0,
            ReturnCode::FAIL => -1,
            ReturnCode::EBUSY => -2,
            ReturnCode::EALREADY => -3,
            ReturnCode::EOFF => -4,
            ReturnCode::ERESERVE => -5,
            ReturnCode::EINVAL => -6,
            ReturnCode::ESIZE => -7,
            ReturnCode::ECANCEL => -8,
            ReturnCode::ENOMEM => -9,
            ReturnCode::ENOSUPPORT => -10,
            ReturnCode::ENODEVICE => -11,
            ReturnCode::EUOFF => -12,
            ReturnCode::ENOACK => -13,
            ReturnCode::InvalidDispatch => -20,
            ReturnCode::LengthTooShort => -21,
            ReturnCode::MessageTooLong => -22,
            ReturnCode::AddressFamilyUnsupported => -23,
            ReturnCode::ContextUnavailable => -24,
            ReturnCode::DestinationAddressRequired => -25,
            ReturnCode::OutOfBuffers => -26,
            ReturnCode::ChecksumInvalid => -27,
            ReturnCode::AckTooBig => -28,
            ReturnCode::AckTooSmall => -29,
            ReturnCode::SeqTooSmall => -30,
            ReturnCode::NotConnected => -31,
            ReturnCode::AlreadyInUse => -32,
            ReturnCode::Timeout => -33,
            ReturnCode::Unsupported => -34,
        }
    }
}
