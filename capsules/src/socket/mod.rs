//! The BSD-shaped socket multiplexer: a small fixed table of sockets
//! routing UDP and TCP segments to their owning socket by four-tuple or
//! listen-port lookup, and exposing `socket`/`bind`/`listen`/`accept`/
//! `connect`/`send`/`recv`/`sendto`/`recvfrom`/`close`.
//!
//! There is no socket layer to build on directly here (`net::ip_state`'s
//! `IPState` list is the closest analogue, and it is out of this crate's
//! module set — single-dispatch, no ports, no TCP). This module is
//! grounded instead on RIOT's `sys/net/destiny/socket.c`
//! (`original_source/_INDEX.md`): a fixed `MAX_SOCKETS`-slot table, `id`
//! is index+1, ephemeral ports start at `EPHEMERAL_PORTS`. It is
//! re-expressed in the crate's own `Cell`-field idiom (compare
//! `tcp::tcb::Tcb`) on top of `tcp::engine::TcpEngine` rather than RIOT's
//! own duplicate per-socket state machine, and blocking calls are modeled
//! as a non-blocking "return a pending marker, re-poll on the next
//! `SocketEvent`" shape, since a capsule never blocks the processor.

pub mod api;
pub mod table;

pub use api::{SendOutcome, Sockets};
pub use table::{Domain, SockProtocol, SockType, Socket, SocketEvent, SocketId, SocketTable, NUM_SOCKETS};
