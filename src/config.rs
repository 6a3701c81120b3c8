//! Tuning knobs for transfers and the connection lifecycle.
//!
//! Earlier revisions of this protocol kept divergent copies of the ARQ loop,
//! each with its own hard-coded packet size, window size and ACK policy.
//! They are consolidated here into one [`TransferConfig`] record with two
//! presets: [`TransferConfig::message`] for short control traffic and
//! [`TransferConfig::stream`] for bulk throughput.

use std::time::Duration;

/// Parameters of one ARQ transfer (a message or a file stream).
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Maximum payload bytes per DATA frame.
    pub chunk_size: usize,
    /// Go-back-N window: maximum frames in flight.
    pub window_size: u32,
    /// How long the sender waits for a qualifying ACK before a go-back-N
    /// retransmission round.
    pub ack_timeout: Duration,
    /// Consecutive fruitless rounds before the transfer fails with a reset.
    pub max_retries: u32,
    /// ACK thinning: acknowledge every N accepted frames…
    pub ack_every: u32,
    /// …or sooner, once this much time has passed since the last ACK.
    pub ack_interval: Duration,
    /// Receive-side write buffer: flush to disk once it holds this many bytes.
    pub flush_threshold: usize,
    /// Silent receiver emits an unsolicited ACK probe after this long.
    pub keepalive_after: Duration,
    /// Hard ceiling: a transfer idle past this fails with a receive timeout.
    pub idle_limit: Duration,
}

impl TransferConfig {
    /// Preset for the reliable message channel: small frames, small window.
    pub fn message() -> Self {
        Self {
            chunk_size: 1024,
            window_size: 8,
            ack_timeout: Duration::from_millis(300),
            max_retries: 20,
            ack_every: 1,
            ack_interval: Duration::from_millis(100),
            flush_threshold: usize::MAX, // messages are assembled in memory
            keepalive_after: Duration::from_secs(2),
            idle_limit: Duration::from_secs(10),
        }
    }

    /// Preset for bulk stream transfer: large frames, wide window, thinned
    /// ACKs, buffered disk writes.
    pub fn stream() -> Self {
        Self {
            chunk_size: 4096,
            window_size: 32,
            ack_timeout: Duration::from_millis(300),
            max_retries: 50,
            ack_every: 8,
            ack_interval: Duration::from_millis(200),
            flush_threshold: 256 * 1024,
            keepalive_after: Duration::from_secs(2),
            idle_limit: Duration::from_secs(10),
        }
    }
}

/// Connection-wide configuration: the two transfer presets plus handshake
/// and migration policy.
#[derive(Debug, Clone)]
pub struct ConnConfig {
    /// Preset used by [`crate::message`].
    pub message: TransferConfig,
    /// Preset used by [`crate::stream`].
    pub stream: TransferConfig,
    /// How long one SYN waits for its ACK.
    pub handshake_timeout: Duration,
    /// SYN attempts before the connect fails.
    pub handshake_retries: u32,
    /// Whether the message-channel receive cursor restarts at frame 0 when
    /// the session migrates to a new peer address.  Defaults to `true`; a
    /// migrated client begins fresh transfers, so continuing the old
    /// counters only makes sense when the peer kept its send state across
    /// the re-bind.  Stream receives never survive a migration — file bytes
    /// from a different peer belong to a different transfer.
    pub reset_sequence_on_migration: bool,
    /// Number of best-effort FIN frames emitted on teardown.
    pub fin_repeat: u32,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            message: TransferConfig::message(),
            stream: TransferConfig::stream(),
            handshake_timeout: Duration::from_secs(1),
            handshake_retries: 5,
            reset_sequence_on_migration: true,
            fin_repeat: 5,
        }
    }
}
