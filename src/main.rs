//! Entry point for `rudp-transfer`.
//!
//! Parses CLI arguments and dispatches into either **server** or **client**
//! mode.  All protocol work is delegated to library modules; `main.rs` owns
//! only process setup (logging, signal handling, argument parsing).

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use rudp_transfer::server::ServerContext;
use rudp_transfer::{client, server};

/// Reliable file transfer over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run as a server, admitting one migrating session at a time.
    Server {
        /// Local address to bind (e.g. 0.0.0.0:9090).
        #[arg(short, long, default_value = "0.0.0.0:9090")]
        bind: SocketAddr,
        /// Directory served to DOWNLOAD/UPLOAD.
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
    /// Run as an interactive client.
    Client {
        /// Remote server address (e.g. 127.0.0.1:9090).
        #[arg(short, long)]
        server: SocketAddr,
    },
}

#[tokio::main]
async fn main() {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let outcome = match cli.mode {
        Mode::Server { bind, dir } => {
            log::info!("starting server on {bind}, serving {}", dir.display());
            let ctx = ServerContext { bind, root: dir };
            tokio::select! {
                res = server::run(ctx) => res,
                _ = tokio::signal::ctrl_c() => {
                    log::info!("interrupted; shutting down");
                    Ok(())
                }
            }
        }
        Mode::Client { server } => {
            log::info!("connecting to {server}");
            client::run(server).await
        }
    };

    if let Err(e) = outcome {
        log::error!("{e}");
        std::process::exit(1);
    }
}
