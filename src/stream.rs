//! Bulk stream transfer: file bytes over the ARQ primitives, tuned for
//! throughput.
//!
//! Differences from the message channel:
//! - Frames are produced **lazily** from a file cursor instead of being
//!   pre-materialised, so a multi-gigabyte transfer holds at most one
//!   window of payloads in memory.
//! - ACK polling is non-blocking while the window still has room (keep the
//!   pipeline full) and blocking-with-timeout only once it saturates.
//! - The receiver coalesces accepted payloads in a write buffer and flushes
//!   to disk at a size threshold, and **thins** its ACKs: one every N
//!   accepted frames, or after a short quiet interval, or unconditionally
//!   for the final frame.
//! - Termination is a best-effort FIN burst rather than an acknowledged
//!   close — repeats raise the odds the receiver observes the end of the
//!   stream despite datagram loss.

use std::path::Path;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;

use crate::connection::{AckEvent, Connection};
use crate::error::ConnError;
use crate::fsutil;
use crate::packet::{Packet, PacketType};
use crate::receiver::{Accept, InOrderReceiver};
use crate::sender::SendWindow;
use crate::transport::Datagram;

/// Granularity of the receive poll, so the keepalive probe and the idle
/// ceiling are checked even while the peer is silent.
const RECV_POLL: Duration = Duration::from_millis(100);

impl<T: Datagram> Connection<T> {
    /// Stream the contents of `path`, starting at byte `offset`, to the peer.
    ///
    /// Returns the number of payload bytes handed to the transport (the
    /// remaining file size).  Fails with [`ConnError::Reset`] when a window
    /// goes unacknowledged for the full retry budget,
    /// [`ConnError::PeerClosed`] if the peer FINs mid-transfer, or
    /// [`ConnError::Migrated`] if the session re-binds mid-send.
    pub async fn send_file(&mut self, path: &Path, offset: u64) -> Result<u64, ConnError> {
        self.ensure_established()?;
        self.flush_stale().await?;

        let cfg = self.config.stream.clone();
        let mut file = fsutil::open_read_at(path, offset).await?;
        let mut window = SendWindow::new(cfg.window_size, cfg.max_retries);
        let mut eof = false;
        let mut bytes_sent: u64 = 0;
        let started = Instant::now();

        loop {
            // Fill the window with lazily-read chunks.
            while !eof && window.has_capacity() {
                let mut chunk = vec![0u8; cfg.chunk_size];
                let n = fsutil::read_chunk(&mut file, &mut chunk).await?;
                if n == 0 {
                    eof = true;
                    break;
                }
                chunk.truncate(n);
                let pkt = Packet::data(window.next_seq(), chunk);
                self.send_packet(&pkt).await?;
                bytes_sent += pkt.payload.len() as u64;
                window.record_sent(pkt.payload);
            }

            if eof && window.is_empty() {
                break; // last chunk acknowledged
            }

            // Block only once the pipeline is saturated (or drained of new
            // chunks); otherwise just poll so the window keeps filling.
            let saturated = eof || !window.has_capacity();
            let wait = if saturated { cfg.ack_timeout } else { Duration::ZERO };

            match self.wait_ack(wait).await? {
                AckEvent::Ack(k) => {
                    let released = window.on_ack(k);
                    if released > 0 {
                        log::trace!("[stream] ← ACK {k} (released {released})");
                    }
                }
                AckEvent::PeerClosed => return Err(ConnError::PeerClosed),
                AckEvent::Migrated => return Err(ConnError::Migrated),
                AckEvent::Timeout => {
                    if !saturated {
                        continue; // a missed zero-length poll is not a loss signal
                    }
                    if window.on_timeout() {
                        return Err(ConnError::Reset(cfg.max_retries));
                    }
                    log::debug!(
                        "[stream] timeout at base {} — retransmitting {} frame(s)",
                        window.base(),
                        window.in_flight()
                    );
                    for (seq, payload) in window.outstanding() {
                        self.send_packet(&Packet::data(seq, payload.to_vec())).await?;
                    }
                }
            }
        }

        // Best-effort end-of-stream marker (unacknowledged).
        for _ in 0..self.config.fin_repeat {
            self.send_packet(&Packet::control(PacketType::Fin, window.next_seq()))
                .await?;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        log::info!(
            "[stream] sent {bytes_sent} bytes in {:.2}s",
            started.elapsed().as_secs_f64()
        );
        Ok(bytes_sent)
    }

    /// Receive `expected` stream bytes and append them to `path`.
    ///
    /// `progress` is invoked with `(bytes_written, expected)` each time the
    /// write buffer flushes to disk.  Returns the number of bytes written.
    /// Ends early on FIN (the sender's view of "done" wins — the byte count
    /// check guards against a FIN lost to the network, not against a short
    /// stream).  Fails with [`ConnError::RecvTimeout`] once the peer has
    /// been silent past the hard idle ceiling, and with
    /// [`ConnError::Migrated`] when a fresh SYN re-binds the session — the
    /// new peer's frames must never land in this file.
    pub async fn recv_file<F>(
        &mut self,
        path: &Path,
        expected: u64,
        mut progress: F,
    ) -> Result<u64, ConnError>
    where
        F: FnMut(u64, u64),
    {
        self.ensure_established()?;
        self.flush_stale().await?;

        let cfg = self.config.stream.clone();
        let mut file = fsutil::open_append(path).await?;
        let mut cursor = InOrderReceiver::new();
        let mut write_buf: Vec<u8> = Vec::new();
        let mut bytes_written: u64 = 0;
        let mut accepted: u64 = 0;
        let mut since_ack: u32 = 0;
        let mut last_ack_at = Instant::now();
        let mut last_data_at = Instant::now();
        let mut last_probe_at = Instant::now();

        while accepted < expected {
            if last_data_at.elapsed() >= cfg.idle_limit {
                // Flush what arrived so a retried transfer can resume here.
                flush_buffer(&mut file, &mut write_buf, &mut bytes_written).await?;
                return Err(ConnError::RecvTimeout(cfg.idle_limit));
            }
            if last_probe_at.elapsed() >= cfg.keepalive_after {
                // Unsolicited ACK: nudges a sender whose window stalled on a
                // lost acknowledgement.  Before the first accepted frame
                // there is nothing truthful to acknowledge.
                if cursor.expected() > 0 {
                    self.send_packet(&Packet::control(PacketType::Ack, cursor.last_ack()))
                        .await?;
                }
                last_probe_at = Instant::now();
            }

            let Some((pkt, from)) = self.recv_frame(RECV_POLL).await? else {
                continue;
            };

            if pkt.kind == PacketType::Syn {
                if self.handle_syn(from).await? {
                    // The new peer's first frames are its own command
                    // traffic, not bytes of this file.  Keep the old peer's
                    // in-order bytes (a valid resume prefix) and hand the
                    // session back to the caller.
                    flush_buffer(&mut file, &mut write_buf, &mut bytes_written).await?;
                    return Err(ConnError::Migrated);
                }
                continue;
            }
            if from != self.peer {
                continue;
            }

            match pkt.kind {
                PacketType::Fin => break,
                PacketType::Data => {
                    last_data_at = Instant::now();
                    match cursor.on_data(pkt.seq) {
                        Accept::InOrder => {
                            accepted += pkt.payload.len() as u64;
                            write_buf.extend_from_slice(&pkt.payload);
                            since_ack += 1;

                            // ACK thinning: every N frames, or after a quiet
                            // interval, or unconditionally for the final frame.
                            let final_frame = accepted >= expected;
                            if final_frame
                                || since_ack >= cfg.ack_every
                                || last_ack_at.elapsed() >= cfg.ack_interval
                            {
                                self.send_packet(&Packet::control(
                                    PacketType::Ack,
                                    cursor.last_ack(),
                                ))
                                .await?;
                                since_ack = 0;
                                last_ack_at = Instant::now();
                                last_probe_at = last_ack_at;
                            }

                            if write_buf.len() >= cfg.flush_threshold {
                                flush_buffer(&mut file, &mut write_buf, &mut bytes_written)
                                    .await?;
                                progress(bytes_written, expected);
                            }
                        }
                        Accept::Duplicate => {
                            // Our ACK was lost; repeat it so the sender's
                            // window advances, but never re-deliver payload.
                            self.send_packet(&Packet::control(
                                PacketType::Ack,
                                cursor.last_ack(),
                            ))
                            .await?;
                        }
                        Accept::OutOfOrder => {
                            if cursor.expected() > 0 {
                                // Nudge with the last good cumulative ACK.
                                self.send_packet(&Packet::control(
                                    PacketType::Ack,
                                    cursor.last_ack(),
                                ))
                                .await?;
                            }
                        }
                    }
                }
                _ => {} // stale ACK noise
            }
        }

        flush_buffer(&mut file, &mut write_buf, &mut bytes_written).await?;
        file.flush().await?;
        progress(bytes_written, expected);

        // Consume the sender's trailing FIN burst so the next receive on
        // this session doesn't misread a stream-end marker as a session
        // close.  The window spans two retransmission rounds: if the final
        // ACK was lost, the sender resends its tail after `ack_timeout` and
        // needs the repeated ACK below to finish.
        let drain_until = Instant::now() + cfg.ack_timeout * 2 + Duration::from_millis(100);
        loop {
            let remaining = drain_until.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.recv_frame(remaining).await? {
                Some((pkt, from)) if from == self.peer && pkt.kind == PacketType::Data => {
                    // Late retransmit of the tail: repeat the final ACK so
                    // the sender stops resending.
                    if cursor.expected() > 0 {
                        self.send_packet(&Packet::control(PacketType::Ack, cursor.last_ack()))
                            .await?;
                    }
                }
                _ => {} // FIN repeats and noise, swallowed
            }
        }

        log::info!("[stream] wrote {bytes_written} of {expected} expected bytes");
        Ok(bytes_written)
    }
}

/// Drain the write buffer into the file in one large write.
async fn flush_buffer(
    file: &mut File,
    buf: &mut Vec<u8>,
    bytes_written: &mut u64,
) -> Result<(), ConnError> {
    if buf.is_empty() {
        return Ok(());
    }
    file.write_all(buf).await?;
    *bytes_written += buf.len() as u64;
    buf.clear();
    Ok(())
}
