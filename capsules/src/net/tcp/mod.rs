//! The embedded TCP engine: per-connection control blocks, the segment
//! state machine, the retransmission timer, and optional per-connection
//! header compression.
//!
//! `net::tcp` started as a 21-line header-struct stub with no state
//! machine; everything here is grounded instead on RIOT's
//! `sys/net/destiny/{tcp.c,tcp_hc.c,tcp_timer.c}`
//! (`original_source/_INDEX.md`), re-expressed in this crate's `Cell`-field
//! and `net::stream` idiom.

pub mod engine;
pub mod hc;
pub mod header;
pub mod tcb;

pub use engine::{TcpAction, TcpEngine, TimerAction};
pub use hc::HcContext;
pub use header::TcpHeader;
pub use tcb::{Tcb, TcpState};
