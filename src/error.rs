//! Error taxonomy for the transport.
//!
//! Transport-internal anomalies (malformed frames, duplicates, out-of-order
//! data, wrong-peer datagrams) are recovered inside the ARQ loops and never
//! reach these variants.  What does unwind to the caller:
//!
//! - [`ConnError::Reset`] — the retransmission budget ran out; fatal to the
//!   current transfer, but the connection object may be reused for a fresh
//!   handshake.
//! - [`ConnError::PeerClosed`] — a FIN was observed; fatal to the transfer,
//!   non-fatal to the process.
//! - [`ConnError::Migrated`] — the session re-bound to a new peer address;
//!   fatal to the in-flight transfer, non-fatal to the session.
//! - [`ConnError::Io`] — local I/O failure (disk full, permissions); the
//!   transport state stays intact so the caller may retry.

use std::time::Duration;

use thiserror::Error;

use crate::connection::ConnState;

/// Errors surfaced by connection and transfer operations.
#[derive(Debug, Error)]
pub enum ConnError {
    /// Underlying socket or file I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// No qualifying ACK after the full retry budget — the peer is treated
    /// as gone and the transfer is reset.
    #[error("connection reset: no acknowledgement after {0} retransmission rounds")]
    Reset(u32),

    /// The peer sent FIN while we were mid-operation.
    #[error("peer closed the connection")]
    PeerClosed,

    /// The session re-bound to a new peer address while a transfer was in
    /// flight.  The transfer is dead but the session is live — the caller
    /// returns to its command loop and serves the new peer.
    #[error("session migrated to a new peer; transfer aborted")]
    Migrated,

    /// The SYN/ACK handshake never completed.
    #[error("handshake failed after {0} attempts")]
    HandshakeFailed(u32),

    /// Receive side saw no traffic for longer than the hard idle ceiling.
    #[error("receive timed out: peer silent for {0:?}")]
    RecvTimeout(Duration),

    /// Operation requires an established connection.
    #[error("connection is {0:?}; operation requires Established")]
    BadState(ConnState),
}
