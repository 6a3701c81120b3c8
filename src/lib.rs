//! `rudp-transfer` — reliable file transfer over UDP.
//!
//! A hand-rolled reliable-delivery transport on top of an unreliable,
//! unordered datagram socket: SYN/ACK establishment, ordered delivery via a
//! go-back-N sliding window with cumulative acknowledgments, bulk stream
//! transfer with flow-controlled buffering, and mid-session peer re-binding
//! ("connection migration").  A line-based command protocol (ECHO / TIME /
//! DOWNLOAD / UPLOAD) rides on top.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────────┐  commands/replies   ┌───────────────────┐
//!  │ client / server  │────────────────────▶│  message channel  │
//!  │ (app protocol)   │  file bytes         ├───────────────────┤
//!  │                  │────────────────────▶│  stream transfer  │
//!  └──────────────────┘                     └─────────┬─────────┘
//!                                                     │ ARQ loops
//!  ┌──────────────────────────────────────────────────▼─────────┐
//!  │                      Connection                            │
//!  │   (handshake, FIN teardown, peer migration, frame I/O)     │
//!  └────┬───────────────────────────────────────────────────────┘
//!       │ encoded frames                    ┌───────────────────┐
//!  ┌────▼──────────┐                        │ sender / receiver │
//!  │   Datagram    │  UdpTransport or the   │ (pure window and  │
//!  │  (transport)  │  lossy sim link        │  cursor state)    │
//!  └───────────────┘                        └───────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]     — wire format (5-byte header, DATA/ACK/SYN/FIN)
//! - [`transport`]  — datagram capability trait + UDP implementation
//! - [`sender`]     — go-back-N send window (pure state)
//! - [`receiver`]   — strict in-order receive cursor (pure state)
//! - [`config`]     — consolidated tuning record and presets
//! - [`connection`] — session lifecycle: handshake, teardown, migration
//! - [`message`]    — reliable newline-terminated control messages
//! - [`stream`]     — bulk file transfer with ACK thinning and buffered writes
//! - [`sim`]        — deterministic lossy link for the test suite
//! - [`server`] / [`client`] — the command protocol on either end
//! - [`fsutil`]     — resumable-offset file helpers
//! - [`error`]      — the error taxonomy transfers surface

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod fsutil;
pub mod message;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod server;
pub mod sim;
pub mod stream;
pub mod transport;

pub use config::{ConnConfig, TransferConfig};
pub use connection::{ConnState, Connection};
pub use error::ConnError;
pub use transport::{Datagram, UdpTransport};
