//! Interactive client for the command protocol.
//!
//! Reads commands from stdin, ships them over the reliable message channel,
//! and drives the bulk stream transfer for DOWNLOAD/UPLOAD — including the
//! resume offsets: a partially downloaded file picks up where it left off,
//! and the server tells us where to resume an upload.

use std::io::Write as _;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;

use crate::config::ConnConfig;
use crate::connection::Connection;
use crate::error::ConnError;
use crate::fsutil;
use crate::transport::{Datagram, UdpTransport};

/// How long a command waits for its text reply.
const REPLY_WAIT: Duration = Duration::from_secs(5);

/// Connect to `server` and run the interactive prompt until EXIT, stdin EOF,
/// or Ctrl-C.  Ctrl-C aborts the current wait and closes the session with a
/// best-effort FIN before returning.
pub async fn run(server: SocketAddr) -> Result<(), ConnError> {
    let transport = Arc::new(UdpTransport::bind("0.0.0.0:0".parse().unwrap()).await?);
    let mut conn = Connection::connect(transport, server, ConnConfig::default()).await?;
    println!("Connected to {server}. Commands: ECHO, TIME, DOWNLOAD, UPLOAD, EXIT.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => line,
                None => break, // stdin closed
            },
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let outcome = match parts[0].to_uppercase().as_str() {
            "EXIT" | "QUIT" | "CLOSE" => {
                let _ = conn.send_message(format!("{line}\n").as_bytes()).await;
                break;
            }
            "DOWNLOAD" => download(&mut conn, &parts[1..]).await,
            "UPLOAD" => upload(&mut conn, &parts[1..]).await,
            // ECHO, TIME, and anything else: the server answers in text.
            _ => roundtrip(&mut conn, &line).await,
        };
        if let Err(e) = outcome {
            eprintln!("error: {e}");
            if matches!(e, ConnError::PeerClosed) {
                break;
            }
        }
    }

    conn.close().await;
    Ok(())
}

/// Send one text command and print the reply (or a timeout notice).
async fn roundtrip<T: Datagram>(conn: &mut Connection<T>, line: &str) -> Result<(), ConnError> {
    conn.send_message(format!("{line}\n").as_bytes()).await?;
    match conn.recv_message(Some(REPLY_WAIT)).await? {
        Some(reply) => print!("{}", String::from_utf8_lossy(&reply)),
        None => println!("Timeout waiting for reply"),
    }
    Ok(())
}

/// `DOWNLOAD <name>`: resume from the local file size, gate the stream with
/// READY, and append the remainder.
async fn download<T: Datagram>(conn: &mut Connection<T>, args: &[&str]) -> Result<(), ConnError> {
    let Some(name) = args.first() else {
        println!("Usage: DOWNLOAD <filename>");
        return Ok(());
    };
    let path = Path::new(name);
    let offset = fsutil::file_size(path).unwrap_or(0);

    conn.send_message(format!("DOWNLOAD {name} {offset}\n").as_bytes())
        .await?;
    let Some(reply) = conn.recv_message(Some(REPLY_WAIT)).await? else {
        println!("Server not responding");
        return Ok(());
    };
    let Some(size) = parse_ok(&reply) else {
        print!("{}", String::from_utf8_lossy(&reply));
        return Ok(());
    };
    if offset >= size {
        println!("File completely downloaded.");
        return Ok(());
    }

    conn.send_message(b"READY\n").await?;
    println!("Downloading {name} from offset {offset}...");

    let remaining = size - offset;
    let started = Instant::now();
    let written = conn
        .recv_file(path, remaining, |done, total| print_progress(done, total))
        .await?;
    println!();
    print_bitrate(written, started.elapsed());
    Ok(())
}

/// `UPLOAD <name>`: announce the size, resume from the server's offset.
async fn upload<T: Datagram>(conn: &mut Connection<T>, args: &[&str]) -> Result<(), ConnError> {
    let Some(name) = args.first() else {
        println!("Usage: UPLOAD <filename>");
        return Ok(());
    };
    let path = Path::new(name);
    let Some(size) = fsutil::file_size(path) else {
        println!("File not found locally.");
        return Ok(());
    };

    conn.send_message(format!("UPLOAD {name} {size}\n").as_bytes())
        .await?;
    let Some(reply) = conn.recv_message(Some(REPLY_WAIT)).await? else {
        println!("Server not responding");
        return Ok(());
    };
    let Some(offset) = parse_ok(&reply) else {
        print!("{}", String::from_utf8_lossy(&reply));
        return Ok(());
    };
    if offset >= size {
        println!("File completely uploaded.");
        return Ok(());
    }

    println!("Uploading {name} from offset {offset}...");
    let started = Instant::now();
    let sent = conn.send_file(path, offset).await?;
    print_bitrate(sent, started.elapsed());
    Ok(())
}

/// Parse `OK <number>` replies; anything else is an application error line.
fn parse_ok(reply: &[u8]) -> Option<u64> {
    let text = String::from_utf8_lossy(reply);
    let mut words = text.split_whitespace();
    match (words.next(), words.next()) {
        (Some("OK"), Some(n)) => n.parse().ok(),
        _ => None,
    }
}

/// In-place progress line, refreshed on every write-buffer flush.
fn print_progress(done: u64, total: u64) {
    print!("\rProgress: {done}/{total} bytes");
    let _ = std::io::stdout().flush();
}

fn print_bitrate(bytes: u64, elapsed: Duration) {
    let secs = elapsed.as_secs_f64().max(0.001);
    let mbps = (bytes as f64 * 8.0) / secs / 1024.0 / 1024.0;
    println!("Transfer finished. Bitrate: {mbps:.2} Mbps");
}
