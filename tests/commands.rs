//! End-to-end tests for the line-oriented command protocol.
//!
//! Each test runs the real server accept loop in a background task against a
//! scratch directory, connects as a client over loopback, and drives the
//! protocol the same way the interactive client does.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rudp_transfer::{server, ConnConfig, Connection, Datagram, UdpTransport};
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A fresh scratch directory for the server's file root.
fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "rudp-cmd-{tag}-{}-{:08x}",
        std::process::id(),
        rand::random::<u32>()
    ));
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

fn patterned(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut buf = vec![0u8; len];
    rng.fill_bytes(&mut buf);
    buf
}

/// Bind an ephemeral endpoint and run the accept-and-serve loop on it.
async fn start_server(root: &Path) -> (SocketAddr, JoinHandle<()>) {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let transport = Arc::new(UdpTransport::bind(addr).await.expect("bind server"));
    let local = transport.local_addr().expect("server addr");
    let root = root.to_path_buf();
    let handle = tokio::spawn(async move {
        let _ = server::serve(transport, root).await;
    });
    (local, handle)
}

async fn connect(server_addr: SocketAddr) -> Connection<UdpTransport> {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let transport = Arc::new(UdpTransport::bind(addr).await.expect("bind client"));
    Connection::connect(transport, server_addr, ConnConfig::default())
        .await
        .expect("connect")
}

/// Send one command line and return the server's reply as text.
async fn roundtrip(conn: &mut Connection<UdpTransport>, line: &str) -> String {
    conn.send_message(line.as_bytes()).await.expect("send command");
    let reply = conn
        .recv_message(Some(Duration::from_secs(5)))
        .await
        .expect("recv reply")
        .expect("server reply");
    String::from_utf8(reply).expect("utf8 reply")
}

/// Parse an `OK <n>` reply.
fn parse_ok(reply: &str) -> u64 {
    let mut parts = reply.split_whitespace();
    assert_eq!(parts.next(), Some("OK"), "unexpected reply: {reply:?}");
    parts
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or_else(|| panic!("non-numeric OK argument in {reply:?}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn echo_time_and_unknown_commands() {
    let root = scratch_dir("echo");
    let (addr, handle) = start_server(&root).await;
    let mut conn = connect(addr).await;

    assert_eq!(roundtrip(&mut conn, "ECHO hello there\n").await, "hello there\n");

    // TIME replies with a wall-clock stamp: `YYYY-MM-DD HH:MM:SS\n`.
    let time = roundtrip(&mut conn, "TIME\n").await;
    assert_eq!(time.len(), 20, "unexpected TIME shape: {time:?}");
    assert_eq!(&time[4..5], "-");
    assert_eq!(&time[13..14], ":");

    assert_eq!(roundtrip(&mut conn, "FROBNICATE\n").await, "UNKNOWN COMMAND\n");

    // Commands are case-insensitive.
    assert_eq!(roundtrip(&mut conn, "echo lower\n").await, "lower\n");

    conn.close().await;
    handle.abort();
    let _ = std::fs::remove_dir_all(&root);
}

#[tokio::test]
async fn download_streams_file_and_session_survives() {
    const LEN: usize = 1024 * 1024;

    let root = scratch_dir("download");
    let payload = patterned(LEN, 3);
    std::fs::write(root.join("report.bin"), &payload).expect("seed served file");

    let (addr, handle) = start_server(&root).await;
    let mut conn = connect(addr).await;

    // Errors come back as messages, not as transfers.
    assert_eq!(
        roundtrip(&mut conn, "DOWNLOAD missing.bin\n").await,
        "ERROR file not found\n"
    );
    assert_eq!(
        roundtrip(&mut conn, "DOWNLOAD ../etc/passwd\n").await,
        "ERROR invalid file name\n"
    );

    let reply = roundtrip(&mut conn, "DOWNLOAD report.bin 0\n").await;
    let size = parse_ok(&reply);
    assert_eq!(size, LEN as u64);

    conn.send_message(b"READY\n").await.expect("send READY");
    let dst = root.join("client-copy.bin");
    let written = conn
        .recv_file(&dst, size, |_, _| {})
        .await
        .expect("recv_file");
    assert_eq!(written, LEN as u64);
    assert!(std::fs::read(&dst).expect("read copy") == payload, "download corrupted");

    // The session remains usable after a bulk transfer.
    assert_eq!(roundtrip(&mut conn, "ECHO still here\n").await, "still here\n");

    conn.close().await;
    handle.abort();
    let _ = std::fs::remove_dir_all(&root);
}

/// A client that already holds a prefix asks for the remainder only.
#[tokio::test]
async fn download_resumes_at_client_offset() {
    const LEN: usize = 300 * 1024;
    const HAVE: usize = 100 * 1024;

    let root = scratch_dir("dl-resume");
    let payload = patterned(LEN, 5);
    std::fs::write(root.join("big.bin"), &payload).expect("seed served file");
    let dst = root.join("partial.bin");
    std::fs::write(&dst, &payload[..HAVE]).expect("seed partial copy");

    let (addr, handle) = start_server(&root).await;
    let mut conn = connect(addr).await;

    let reply = roundtrip(&mut conn, &format!("DOWNLOAD big.bin {HAVE}\n")).await;
    let size = parse_ok(&reply);
    assert_eq!(size, LEN as u64);

    conn.send_message(b"READY\n").await.expect("send READY");
    let written = conn
        .recv_file(&dst, size - HAVE as u64, |_, _| {})
        .await
        .expect("recv_file");
    assert_eq!(written, (LEN - HAVE) as u64);
    assert!(std::fs::read(&dst).expect("read resumed") == payload, "resumed download differs");

    conn.close().await;
    handle.abort();
    let _ = std::fs::remove_dir_all(&root);
}

/// The server reports how much of the file it already has; the client
/// streams only the remainder, appended in place.
#[tokio::test]
async fn upload_resumes_at_server_offset() {
    const LEN: usize = 300 * 1024;
    const STORED: usize = 120 * 1024;

    let root = scratch_dir("ul-resume");
    let payload = patterned(LEN, 9);
    let stored = root.join("up.bin");
    std::fs::write(&stored, &payload[..STORED]).expect("seed stored prefix");

    let src = root.join("local-src.bin");
    std::fs::write(&src, &payload).expect("write local source");

    let (addr, handle) = start_server(&root).await;
    let mut conn = connect(addr).await;

    let reply = roundtrip(&mut conn, &format!("UPLOAD up.bin {LEN}\n")).await;
    let offset = parse_ok(&reply);
    assert_eq!(offset, STORED as u64);

    let sent = conn.send_file(&src, offset).await.expect("send_file");
    assert_eq!(sent, (LEN - STORED) as u64);

    // The session survives the transfer, which also confirms the server is
    // done writing before we inspect the stored file.
    assert_eq!(roundtrip(&mut conn, "ECHO done\n").await, "done\n");
    assert!(std::fs::read(&stored).expect("read stored") == payload, "uploaded file differs");

    conn.close().await;
    handle.abort();
    let _ = std::fs::remove_dir_all(&root);
}

/// EXIT ends the session and frees the server to admit the next client on
/// the same socket.
#[tokio::test]
async fn exit_frees_server_for_next_client() {
    let root = scratch_dir("exit");
    let (addr, handle) = start_server(&root).await;

    let mut first = connect(addr).await;
    assert_eq!(roundtrip(&mut first, "ECHO one\n").await, "one\n");
    first.send_message(b"EXIT\n").await.expect("send EXIT");

    let mut second = connect(addr).await;
    assert_eq!(roundtrip(&mut second, "ECHO two\n").await, "two\n");

    second.close().await;
    handle.abort();
    let _ = std::fs::remove_dir_all(&root);
}
