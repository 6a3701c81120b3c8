//! Reliable message channel: short, newline-terminated control traffic.
//!
//! A thin specialisation of the ARQ primitives for the text command
//! protocol.  The outbound byte string is split into fixed-size chunks and
//! pushed through a small go-back-N window; the receiver concatenates
//! accepted chunks in sequence order and returns the assembled message as
//! soon as it observes a chunk ending in the line terminator (`\n`).
//!
//! # Framing constraint
//!
//! The terminator byte doubles as the end-of-message marker, so this channel
//! is only valid for line-oriented text payloads.  Arbitrary binary data
//! containing `\n` mid-stream would be cut short — bulk data goes through
//! [`crate::stream`] instead, which frames by byte count.

use std::time::Duration;

use tokio::time::Instant;

use crate::connection::{AckEvent, ConnState, Connection};
use crate::error::ConnError;
use crate::packet::{Packet, PacketType};
use crate::receiver::{Accept, InOrderReceiver};
use crate::sender::SendWindow;
use crate::transport::Datagram;

/// Granularity of the receive poll; keeps migration SYNs and the overall
/// deadline responsive without busy-spinning.
const RECV_POLL: Duration = Duration::from_millis(100);

impl<T: Datagram> Connection<T> {
    /// Send one newline-terminated message reliably.
    ///
    /// Returns once every chunk has been cumulatively acknowledged.  Fails
    /// with [`ConnError::Reset`] when the retry budget runs out, with
    /// [`ConnError::PeerClosed`] if a FIN is observed while waiting, and
    /// with [`ConnError::Migrated`] if the session re-binds mid-send.
    pub async fn send_message(&mut self, bytes: &[u8]) -> Result<(), ConnError> {
        self.ensure_established()?;
        self.flush_stale().await?;

        let cfg = self.config.message.clone();
        let chunks: Vec<&[u8]> = if bytes.is_empty() {
            vec![&[]]
        } else {
            bytes.chunks(cfg.chunk_size).collect()
        };
        let total = chunks.len() as u32;
        let mut window = SendWindow::new(cfg.window_size, cfg.max_retries);

        while window.base() < total {
            // Transmit every sendable chunk while the window has room.
            while window.has_capacity() && window.next_seq() < total {
                let idx = window.next_seq();
                let pkt = Packet::data(idx, chunks[idx as usize].to_vec());
                self.send_packet(&pkt).await?;
                window.record_sent(pkt.payload);
            }
            log::debug!(
                "[msg] → DATA base={} in_flight={}",
                window.base(),
                window.in_flight()
            );

            match self.wait_ack(cfg.ack_timeout).await? {
                AckEvent::Ack(k) => {
                    let released = window.on_ack(k);
                    if released > 0 {
                        log::debug!("[msg] ← ACK {k} (released {released})");
                    }
                }
                AckEvent::PeerClosed => return Err(ConnError::PeerClosed),
                AckEvent::Migrated => return Err(ConnError::Migrated),
                AckEvent::Timeout => {
                    if window.on_timeout() {
                        return Err(ConnError::Reset(cfg.max_retries));
                    }
                    // Go-back-N: resend the whole outstanding window.
                    log::debug!("[msg] timeout — retransmitting {} frame(s)", window.in_flight());
                    for (seq, payload) in window.outstanding() {
                        self.send_packet(&Packet::data(seq, payload.to_vec())).await?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Receive one newline-terminated message.
    ///
    /// `wait = None` blocks until a message, FIN, or migration-superseding
    /// traffic arrives (server-loop usage); `wait = Some(d)` returns
    /// `Ok(None)` if no message completes within `d` of the last inbound
    /// DATA frame.  A FIN closes the session and ends the receive with
    /// [`ConnError::PeerClosed`].
    pub async fn recv_message(
        &mut self,
        wait: Option<Duration>,
    ) -> Result<Option<Vec<u8>>, ConnError> {
        self.ensure_established()?;

        let mut cursor = InOrderReceiver::new();
        let mut assembled: Vec<u8> = Vec::new();
        let mut deadline = wait.map(|w| Instant::now() + w);

        loop {
            let slice = match deadline {
                Some(d) => {
                    let remaining = d.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(None);
                    }
                    remaining.min(RECV_POLL)
                }
                None => RECV_POLL,
            };

            let Some((pkt, from)) = self.recv_frame(slice).await? else {
                continue;
            };

            if pkt.kind == PacketType::Syn {
                let migrated = self.handle_syn(from).await?;
                if migrated && self.config.reset_sequence_on_migration {
                    cursor.reset();
                    assembled.clear();
                }
                continue;
            }
            if from != self.peer {
                continue; // bound session: foreign frames are noise
            }

            match pkt.kind {
                PacketType::Fin => {
                    // Session-level close: no further frames are processed.
                    self.state = ConnState::Closed;
                    return Err(ConnError::PeerClosed);
                }
                PacketType::Data => {
                    // Inbound data restarts the caller's patience window.
                    if let Some(w) = wait {
                        deadline = Some(Instant::now() + w);
                    }
                    match cursor.on_data(pkt.seq) {
                        Accept::InOrder => {
                            assembled.extend_from_slice(&pkt.payload);
                            self.send_packet(&Packet::control(PacketType::Ack, cursor.last_ack()))
                                .await?;
                            if pkt.payload.ends_with(b"\n") {
                                log::debug!("[msg] assembled {} byte message", assembled.len());
                                return Ok(Some(assembled));
                            }
                        }
                        Accept::Duplicate => {
                            // The previous ACK was lost; nudge the sender.
                            self.send_packet(&Packet::control(PacketType::Ack, cursor.last_ack()))
                                .await?;
                        }
                        Accept::OutOfOrder => {
                            log::trace!(
                                "[msg] dropping out-of-order frame {} (expect {})",
                                pkt.seq,
                                cursor.expected()
                            );
                        }
                    }
                }
                _ => {} // stale cross-traffic
            }
        }
    }
}
