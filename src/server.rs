//! Server side of the line-oriented command protocol.
//!
//! Commands arrive over the reliable message channel; file bytes move over
//! the bulk stream transfer:
//!
//! ```text
//! ECHO <text>          → <text>\n
//! TIME                 → YYYY-MM-DD HH:MM:SS\n
//! DOWNLOAD <name> [o]  → OK <filesize>\n, wait for READY\n, stream from o
//! UPLOAD <name> <size> → OK <offset>\n, then accept size − offset bytes
//! EXIT|QUIT|CLOSE      → session ends
//! anything else        → UNKNOWN COMMAND\n
//! ```
//!
//! # One session per socket
//!
//! The server binds one datagram endpoint and serves **one** logical session
//! at a time.  A fresh SYN from a new address migrates the active session to
//! that peer (see [`crate::connection`]) instead of spawning a concurrent
//! one; clients queue behind each other.  A concurrent redesign would key
//! session state by peer address — kept out deliberately to preserve the
//! migration semantics.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ConnConfig;
use crate::connection::Connection;
use crate::error::ConnError;
use crate::fsutil;
use crate::transport::{Datagram, UdpTransport};

/// A session silent for this long is dropped and the server re-enters accept.
const SESSION_IDLE: Duration = Duration::from_secs(300);

/// How long DOWNLOAD waits for the client's READY gate before giving up.
const READY_WAIT: Duration = Duration::from_secs(10);

/// Everything one server instance needs; replaces the process-wide globals
/// (listening flag, current-connection pointer, host/port defaults) of
/// earlier revisions.
#[derive(Debug, Clone)]
pub struct ServerContext {
    /// Address to bind the shared endpoint to.
    pub bind: SocketAddr,
    /// Directory served to DOWNLOAD/UPLOAD; file names never escape it.
    pub root: PathBuf,
}

/// Bind the endpoint and serve sessions forever (until the task is aborted).
pub async fn run(ctx: ServerContext) -> Result<(), ConnError> {
    let transport = Arc::new(UdpTransport::bind(ctx.bind).await?);
    log::info!("server listening on {}", transport.local_addr()?);
    serve(transport, ctx.root).await
}

/// Accept-and-serve loop over an already-bound endpoint.  Split from [`run`]
/// so callers can bind an ephemeral port themselves and learn its address.
pub async fn serve<T: Datagram>(transport: Arc<T>, root: PathBuf) -> Result<(), ConnError> {
    loop {
        let mut conn =
            Connection::accept(Arc::clone(&transport), ConnConfig::default()).await?;
        log::info!("client connected: {}", conn.peer());

        if let Err(e) = serve_session(&mut conn, &root).await {
            log::warn!("session with {} ended: {e}", conn.peer());
        }
        let peer = conn.peer();
        conn.close().await;
        log::info!("client disconnected: {peer}");
    }
}

/// Run the command loop for one established session.
pub async fn serve_session<T: Datagram>(
    conn: &mut Connection<T>,
    root: &Path,
) -> Result<(), ConnError> {
    loop {
        let line = match conn.recv_message(Some(SESSION_IDLE)).await {
            Ok(Some(bytes)) => String::from_utf8_lossy(&bytes).trim().to_string(),
            Ok(None) => {
                log::info!("session idle for {SESSION_IDLE:?}; dropping");
                return Ok(());
            }
            Err(ConnError::PeerClosed) => return Ok(()),
            Err(e) => return Err(e),
        };

        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(cmd) = parts.first() else {
            continue;
        };
        log::debug!("[cmd] {line}");

        let outcome = match cmd.to_uppercase().as_str() {
            "ECHO" => {
                let reply = format!("{}\n", parts[1..].join(" "));
                conn.send_message(reply.as_bytes()).await
            }
            "TIME" => {
                let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
                conn.send_message(format!("{now}\n").as_bytes()).await
            }
            "DOWNLOAD" => handle_download(conn, root, &parts[1..]).await,
            "UPLOAD" => handle_upload(conn, root, &parts[1..]).await,
            "EXIT" | "QUIT" | "CLOSE" => return Ok(()),
            _ => conn.send_message(b"UNKNOWN COMMAND\n").await,
        };
        match outcome {
            Ok(()) => {}
            // The command died with its old peer; the session lives on,
            // re-bound to the new one.
            Err(ConnError::Migrated) => {
                log::info!("command aborted by migration; serving {}", conn.peer())
            }
            Err(e) => return Err(e),
        }
    }
}

/// `DOWNLOAD <name> [offset]`: report the file size, wait for the client's
/// READY gate, then stream the remainder from `offset`.
async fn handle_download<T: Datagram>(
    conn: &mut Connection<T>,
    root: &Path,
    args: &[&str],
) -> Result<(), ConnError> {
    let (Some(name), offset) = (args.first(), args.get(1)) else {
        return conn.send_message(b"ERROR invalid arguments\n").await;
    };
    let offset: u64 = match offset.map(|o| o.parse()).transpose() {
        Ok(o) => o.unwrap_or(0),
        Err(_) => return conn.send_message(b"ERROR invalid arguments\n").await,
    };
    let Some(path) = resolve(root, name) else {
        return conn.send_message(b"ERROR invalid file name\n").await;
    };
    let Some(size) = fsutil::file_size(&path) else {
        return conn.send_message(b"ERROR file not found\n").await;
    };

    conn.send_message(format!("OK {size}\n").as_bytes()).await?;
    if offset >= size {
        return Ok(()); // client already has every byte
    }

    // Gate on READY so the client's stream receiver is in place before the
    // first DATA frame flies.
    match conn.recv_message(Some(READY_WAIT)).await {
        Ok(Some(msg)) if String::from_utf8_lossy(&msg).trim() == "READY" => {}
        Ok(_) => {
            log::warn!("client never sent READY; aborting download of {name}");
            return Ok(());
        }
        Err(ConnError::PeerClosed) => return Ok(()),
        Err(e) => return Err(e),
    }

    match conn.send_file(&path, offset).await {
        Ok(sent) => log::info!("served {name}: {sent} bytes from offset {offset}"),
        // Transfer failures leave the session usable; the client decides
        // whether to retry the command.
        Err(e) => log::warn!("download of {name} failed: {e}"),
    }
    Ok(())
}

/// `UPLOAD <name> <size>`: report the resume offset (existing local size),
/// then accept the remaining bytes appended to the file.
async fn handle_upload<T: Datagram>(
    conn: &mut Connection<T>,
    root: &Path,
    args: &[&str],
) -> Result<(), ConnError> {
    let (Some(name), Some(size)) = (args.first(), args.get(1)) else {
        return conn.send_message(b"ERROR invalid arguments\n").await;
    };
    let Ok(size) = size.parse::<u64>() else {
        return conn.send_message(b"ERROR invalid arguments\n").await;
    };
    let Some(path) = resolve(root, name) else {
        return conn.send_message(b"ERROR invalid file name\n").await;
    };

    let offset = fsutil::file_size(&path).unwrap_or(0);
    conn.send_message(format!("OK {offset}\n").as_bytes()).await?;
    if offset >= size {
        return Ok(()); // nothing left to receive
    }

    match conn
        .recv_file(&path, size - offset, |written, total| {
            log::debug!("[cmd] upload {name}: {written}/{total} bytes");
        })
        .await
    {
        Ok(written) => log::info!("stored {name}: {written} bytes at offset {offset}"),
        Err(e) => log::warn!("upload of {name} failed: {e}"),
    }
    Ok(())
}

/// Join `name` onto the served root, refusing anything that could step
/// outside it.
fn resolve(root: &Path, name: &str) -> Option<PathBuf> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.starts_with('.') {
        return None;
    }
    Some(root.join(name))
}
