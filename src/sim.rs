//! In-memory lossy link for deterministic testing.
//!
//! Real networks drop and duplicate packets.  To exercise the reliability
//! mechanisms without depending on actual network conditions, this module
//! provides a pair of [`Datagram`] endpoints joined by in-process channels,
//! applying a configurable fault model on every send:
//!
//! | Fault       | Description                                        |
//! |-------------|----------------------------------------------------|
//! | Packet loss | Drop a datagram with probability `loss_rate`.      |
//! | Duplication | Deliver a datagram twice with `duplicate_rate`.    |
//!
//! Faults are drawn from a **seeded** RNG so failing runs are reproducible.
//! Production code talks to [`crate::transport::UdpTransport`]; this link
//! exists for the test suite.

use std::io;
use std::net::SocketAddr;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;

use crate::transport::Datagram;

/// Configuration for the fault-injection model.
///
/// Probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Probability that any given datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a datagram is delivered twice.
    pub duplicate_rate: f64,
    /// RNG seed; identical seeds replay identical fault sequences.
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        // No faults by default — the link is a transparent pass-through.
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            seed: 0,
        }
    }
}

/// One end of a simulated link.
pub struct SimEndpoint {
    addr: SocketAddr,
    config: SimConfig,
    tx: mpsc::UnboundedSender<(Vec<u8>, SocketAddr)>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<(Vec<u8>, SocketAddr)>>,
    rng: Mutex<StdRng>,
}

/// Build a connected pair of endpoints with the given fault model applied
/// independently in each direction.
pub fn pair(config: SimConfig) -> (SimEndpoint, SimEndpoint) {
    let addr_a: SocketAddr = "10.0.0.1:1000".parse().unwrap();
    let addr_b: SocketAddr = "10.0.0.2:2000".parse().unwrap();
    let (a_to_b, from_a) = mpsc::unbounded_channel();
    let (b_to_a, from_b) = mpsc::unbounded_channel();

    let a = SimEndpoint {
        addr: addr_a,
        config: config.clone(),
        tx: a_to_b,
        rx: tokio::sync::Mutex::new(from_b),
        rng: Mutex::new(StdRng::seed_from_u64(config.seed)),
    };
    let b = SimEndpoint {
        addr: addr_b,
        config: config.clone(),
        tx: b_to_a,
        rx: tokio::sync::Mutex::new(from_a),
        // Different stream per direction, still derived from the seed.
        rng: Mutex::new(StdRng::seed_from_u64(config.seed.wrapping_add(1))),
    };
    (a, b)
}

impl Datagram for SimEndpoint {
    async fn send_to(&self, buf: &[u8], _dest: SocketAddr) -> io::Result<usize> {
        let (lost, duplicated) = {
            let mut rng = self.rng.lock().expect("sim rng poisoned");
            (
                rng.gen::<f64>() < self.config.loss_rate,
                rng.gen::<f64>() < self.config.duplicate_rate,
            )
        };
        if lost {
            log::trace!("[sim] dropping {} byte datagram", buf.len());
            return Ok(buf.len()); // the sender never learns about loss
        }
        // A closed far end behaves like an unreachable host: sends succeed,
        // nothing is delivered.
        let _ = self.tx.send((buf.to_vec(), self.addr));
        if duplicated {
            let _ = self.tx.send((buf.to_vec(), self.addr));
        }
        Ok(buf.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let (data, from) = self
            .rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "sim link closed"))?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok((n, from))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn pass_through_delivers_in_order() {
        let (a, b) = pair(SimConfig::default());
        a.send_to(b"one", b.local_addr().unwrap()).await.unwrap();
        a.send_to(b"two", b.local_addr().unwrap()).await.unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"one");
        assert_eq!(from, a.local_addr().unwrap());
        let (n, _) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"two");
    }

    #[tokio::test]
    async fn full_loss_delivers_nothing() {
        let (a, b) = pair(SimConfig {
            loss_rate: 1.0,
            ..SimConfig::default()
        });
        a.send_to(b"gone", b.local_addr().unwrap()).await.unwrap();

        let mut buf = [0u8; 16];
        let got = tokio::time::timeout(Duration::from_millis(50), b.recv_from(&mut buf)).await;
        assert!(got.is_err(), "lossy link must not deliver");
    }

    #[tokio::test]
    async fn full_duplication_delivers_twice() {
        let (a, b) = pair(SimConfig {
            duplicate_rate: 1.0,
            ..SimConfig::default()
        });
        a.send_to(b"twin", b.local_addr().unwrap()).await.unwrap();

        let mut buf = [0u8; 16];
        let (n, _) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"twin");
        let (n, _) = b.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"twin");
    }
}
