//! Datagram transport abstraction.
//!
//! The ARQ layer never touches `tokio::net::UdpSocket` directly: it depends
//! on the [`Datagram`] capability trait, so the same send/receive loops run
//! over a real socket ([`UdpTransport`]) or over the deterministic lossy
//! link in [`crate::sim`] used by the reliability tests.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

/// Maximum UDP payload size (theoretical limit; in practice kept much smaller).
pub const MAX_DATAGRAM: usize = 65_535;

/// Minimal capability set the protocol needs from a packet-oriented medium.
///
/// Both methods take `&self` so one endpoint can be shared (`Arc`) between a
/// long-lived server loop and the [`crate::connection::Connection`] bound to
/// the current peer.
pub trait Datagram: Send + Sync + 'static {
    /// Send one datagram to `dest`.
    fn send_to(
        &self,
        buf: &[u8],
        dest: SocketAddr,
    ) -> impl Future<Output = io::Result<usize>> + Send;

    /// Wait for the next inbound datagram; returns `(len, source_address)`.
    ///
    /// Callers bound the wait themselves with `tokio::time::timeout` — the
    /// transport blocks until a datagram arrives.
    fn recv_from<'a>(
        &'a self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send + 'a;

    /// Local address of this endpoint.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// The production transport: a thin wrapper around `tokio::net::UdpSocket`.
#[derive(Debug)]
pub struct UdpTransport {
    inner: UdpSocket,
}

impl UdpTransport {
    /// Bind a new endpoint to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> io::Result<Self> {
        let inner = UdpSocket::bind(local_addr).await?;
        Ok(Self { inner })
    }
}

impl Datagram for UdpTransport {
    async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize> {
        self.inner.send_to(buf, dest).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.recv_from(buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}
