//! Modules for IPv6 over 6LoWPAN stack

#[macro_use]
pub mod stream;

pub mod checksum;
pub mod config;
pub mod hccb;
pub mod ieee802154;
pub mod interval_set;
pub mod ip6;
pub mod packet_buffer;
pub mod sixlowpan;
pub mod tcp;
pub mod udp;
pub mod util;
