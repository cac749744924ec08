//! Protocol capsules: 6LoWPAN adaptation, the embedded TCP engine, and the
//! BSD-style socket layer built on top of them.

#![no_std]
#![forbid(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod net;
pub mod socket;
