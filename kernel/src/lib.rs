//! Core primitives shared by capsules: return codes, interior-mutability
//! cells, an intrusive linked list, and the hardware-independent-layer
//! (HIL) traits capsules program against.
//!
//! This crate intentionally does not include process loading, syscalls, or
//! any board/chip bring-up; those live below the line this repository
//! draws around the 6LoWPAN/TCP/socket core.

#![no_std]
#![forbid(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod common;
pub mod hil;
mod return_code;

pub use crate::return_code::ReturnCode;

/// Prints a message to the board's debug output.
///
/// On real hardware this drains into a ring buffer serviced over UART;
/// here it is a thin wrapper so capsule code never has to special-case
/// host builds vs. board builds.
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {{
        #[cfg(test)]
        {
            extern crate std;
            std::eprintln!($($arg)*);
        }
        #[cfg(not(test))]
        {
            let _ = core::format_args!($($arg)*);
        }
    }};
}
