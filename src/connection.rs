//! Per-session lifecycle manager.
//!
//! A [`Connection`] owns the complete state for one logical peer-to-peer
//! session over a shared datagram endpoint.  Its responsibilities are:
//! - Driving the handshake state machine (`Idle → Connecting → Established
//!   → Closed`).
//! - Holding the **mutable** peer address: a server-side session that sees a
//!   fresh SYN from a different source re-binds to that source in place
//!   instead of tearing down ("connection migration").
//! - Providing the frame-level send/receive plumbing the transfer loops in
//!   [`crate::message`] and [`crate::stream`] are built on.
//!
//! Connections are created either by an active open ([`Connection::connect`],
//! client side) or by admitting the first SYN ([`Connection::accept`], server
//! side).  Only accepted connections migrate.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout, Instant};

use crate::config::ConnConfig;
use crate::error::ConnError;
use crate::packet::{Packet, PacketType};
use crate::transport::{Datagram, MAX_DATAGRAM};

/// All possible states of the session FSM.
///
/// ```text
///  Idle ──connect/accept──▶ Connecting ──ACK/SYN──▶ Established ──FIN──▶ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnState {
    /// No session exists; initial state.
    #[default]
    Idle,
    /// SYN sent; waiting for the ACK.
    Connecting,
    /// Handshake complete; transfers may run.
    Established,
    /// Reached on FIN (either direction), explicit close, or giving up on
    /// the handshake.  No further frames are processed.
    Closed,
}

impl std::fmt::Display for ConnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Outcome of one bounded ACK wait, shared by the message and stream senders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AckEvent {
    /// A cumulative ACK from the current peer, carrying the highest
    /// acknowledged frame index.
    Ack(u32),
    /// The wait elapsed without a qualifying ACK.
    Timeout,
    /// The peer sent FIN while we were waiting.
    PeerClosed,
    /// The session re-bound to a new peer; the in-flight transfer is void.
    Migrated,
}

/// A handle to one reliable session over a datagram endpoint.
///
/// The endpoint is shared (`Arc`) rather than owned: the server keeps a
/// clone so it can admit the next session after this one closes.  All
/// mutation happens from the single session loop, so no locking is needed.
#[derive(Debug)]
pub struct Connection<T: Datagram> {
    pub(crate) transport: Arc<T>,
    pub(crate) peer: SocketAddr,
    pub(crate) state: ConnState,
    pub(crate) config: ConnConfig,
    /// Accepted (server-side) sessions re-bind to a new peer on a fresh SYN;
    /// dialled (client-side) sessions treat foreign SYNs as noise.
    migratable: bool,
}

impl<T: Datagram> Connection<T> {
    // -----------------------------------------------------------------------
    // Establishment and teardown
    // -----------------------------------------------------------------------

    /// Active open (client side): dial `peer` with a bounded SYN retry loop.
    ///
    /// Each SYN waits `handshake_timeout` for an ACK; after
    /// `handshake_retries` silent rounds the connect fails with
    /// [`ConnError::HandshakeFailed`].
    pub async fn connect(
        transport: Arc<T>,
        peer: SocketAddr,
        config: ConnConfig,
    ) -> Result<Self, ConnError> {
        let mut conn = Self {
            transport,
            peer,
            state: ConnState::Connecting,
            config,
            migratable: false,
        };
        conn.flush_stale().await?;

        let attempts = conn.config.handshake_retries;
        for attempt in 1..=attempts {
            conn.send_packet(&Packet::control(PacketType::Syn, 0)).await?;
            log::debug!("[conn] → SYN to {peer} (attempt {attempt}/{attempts})");

            let deadline = Instant::now() + conn.config.handshake_timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }
                match conn.recv_frame(remaining).await? {
                    Some((pkt, from)) if from == peer && pkt.kind == PacketType::Ack => {
                        conn.state = ConnState::Established;
                        log::debug!("[conn] ← ACK — established with {peer}");
                        return Ok(conn);
                    }
                    // Anything else is noise during the handshake.
                    _ => {}
                }
            }
        }

        conn.state = ConnState::Closed;
        Err(ConnError::HandshakeFailed(attempts))
    }

    /// Passive open (server side): block until the first SYN arrives, admit
    /// that peer, and answer with ACK.
    ///
    /// Non-SYN traffic received while waiting is dropped — datagram noise
    /// must not crash the accept loop.
    pub async fn accept(transport: Arc<T>, config: ConnConfig) -> Result<Self, ConnError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (n, from) = transport.recv_from(&mut buf).await?;
            match Packet::decode(&buf[..n]) {
                Ok(pkt) if pkt.kind == PacketType::Syn => {
                    let conn = Self {
                        transport,
                        peer: from,
                        state: ConnState::Established,
                        config,
                        migratable: true,
                    };
                    conn.send_packet(&Packet::control(PacketType::Ack, 0)).await?;
                    log::debug!("[conn] ← SYN from {from}; → ACK — session admitted");
                    return Ok(conn);
                }
                Ok(pkt) => log::trace!("[conn] dropping {} from {from} while idle", pkt.kind),
                Err(e) => log::trace!("[conn] dropping malformed frame from {from}: {e}"),
            }
        }
    }

    /// Best-effort teardown: emit a short FIN burst (unacknowledged — the
    /// repeats raise the odds the peer observes the close despite loss) and
    /// mark the session closed.
    pub async fn close(&mut self) {
        if self.state == ConnState::Established {
            for _ in 0..self.config.fin_repeat {
                let _ = self.send_packet(&Packet::control(PacketType::Fin, 0)).await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            log::debug!("[conn] → FIN ×{} to {}", self.config.fin_repeat, self.peer);
        }
        self.state = ConnState::Closed;
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Current peer address (may change over the session's lifetime).
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Current FSM state.
    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Local address of the shared endpoint.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    pub(crate) fn ensure_established(&self) -> Result<(), ConnError> {
        if self.state == ConnState::Established {
            Ok(())
        } else {
            Err(ConnError::BadState(self.state))
        }
    }

    // -----------------------------------------------------------------------
    // Frame plumbing shared by the transfer loops
    // -----------------------------------------------------------------------

    /// Encode `pkt` and send it to the current peer.
    pub(crate) async fn send_packet(&self, pkt: &Packet) -> Result<(), ConnError> {
        self.transport.send_to(&pkt.encode(), self.peer).await?;
        Ok(())
    }

    /// Wait up to `wait` for the next decodable frame from anyone.
    ///
    /// Returns `Ok(None)` when the wait elapses, and also when a malformed
    /// datagram was consumed — callers run deadline loops, so a dropped
    /// frame simply means "nothing useful yet".
    pub(crate) async fn recv_frame(
        &self,
        wait: Duration,
    ) -> Result<Option<(Packet, SocketAddr)>, ConnError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        match timeout(wait, self.transport.recv_from(&mut buf)).await {
            Err(_elapsed) => Ok(None),
            Ok(Err(e)) => Err(ConnError::Io(e)),
            Ok(Ok((n, from))) => match Packet::decode(&buf[..n]) {
                Ok(pkt) => Ok(Some((pkt, from))),
                Err(e) => {
                    log::trace!("[conn] dropping malformed frame from {from}: {e}");
                    Ok(None)
                }
            },
        }
    }

    /// Drain stale datagrams queued on the endpoint so a new transfer never
    /// consumes a previous transfer's stragglers.
    pub(crate) async fn flush_stale(&self) -> Result<(), ConnError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut drained = 0usize;
        while let Ok(Ok(_)) =
            timeout(Duration::from_millis(1), self.transport.recv_from(&mut buf)).await
        {
            drained += 1;
        }
        if drained > 0 {
            log::debug!("[conn] flushed {drained} stale datagram(s)");
        }
        Ok(())
    }

    /// React to an inbound SYN observed mid-session.
    ///
    /// - From the **current** peer: its handshake ACK was lost — answer with
    ///   ACK(0) again, state untouched.
    /// - From a **different** address on a migratable (accepted) session:
    ///   re-bind the peer in place, answer with ACK, and report `true` so the
    ///   receive loop can apply the sequence-reset policy.  Frames from the
    ///   old address are ignored from here on.
    /// - Anything else (foreign SYN on a dialled session): noise, ignored.
    pub(crate) async fn handle_syn(&mut self, from: SocketAddr) -> Result<bool, ConnError> {
        if from == self.peer {
            self.send_packet(&Packet::control(PacketType::Ack, 0)).await?;
            return Ok(false);
        }
        if self.migratable && self.state == ConnState::Established {
            log::info!("[conn] peer migrated: {} → {}", self.peer, from);
            self.peer = from;
            self.send_packet(&Packet::control(PacketType::Ack, 0)).await?;
            return Ok(true);
        }
        log::trace!("[conn] ignoring SYN from {from} (session bound to {})", self.peer);
        Ok(false)
    }

    /// Bounded wait for a cumulative ACK from the current peer.  A FIN
    /// closes the session and reports peer-close; a repeat SYN from the
    /// current peer is re-answered in place; a SYN that re-binds the session
    /// voids the in-flight transfer and reports migration.  Both sender
    /// loops suspend exclusively here.
    pub(crate) async fn wait_ack(&mut self, wait: Duration) -> Result<AckEvent, ConnError> {
        let deadline = Instant::now() + wait;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.recv_frame(remaining).await? {
                Some((pkt, from)) if from == self.peer => match pkt.kind {
                    PacketType::Ack => return Ok(AckEvent::Ack(pkt.seq)),
                    PacketType::Fin => {
                        self.state = ConnState::Closed;
                        return Ok(AckEvent::PeerClosed);
                    }
                    PacketType::Syn => {
                        self.handle_syn(from).await?;
                    }
                    PacketType::Data => {} // stale cross-traffic, ignore
                },
                Some((pkt, from)) => {
                    if pkt.kind == PacketType::Syn && self.handle_syn(from).await? {
                        return Ok(AckEvent::Migrated);
                    }
                    // Frames from other sources are never ACK candidates.
                }
                None => {}
            }
            if Instant::now() >= deadline {
                return Ok(AckEvent::Timeout);
            }
        }
    }
}
