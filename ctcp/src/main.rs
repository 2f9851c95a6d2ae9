//! Entry point for `ctcp`.
//!
//! Parses CLI arguments and runs one connection in either **listen** or
//! **connect** mode, piping stdin into the stream and the peer's stream to
//! stdout.  All protocol work is delegated to the library; `main.rs` owns
//! only process setup (logging, argument parsing, stdio plumbing).

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

use ctcp::config::{Config, MAX_RETRANSMITS};
use ctcp::driver::{Driver, Mode, Output};

/// Reliable byte stream over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Command,

    #[command(flatten)]
    tuning: Tuning,
}

#[derive(Subcommand)]
enum Command {
    /// Wait for a peer; the first datagram's sender becomes the peer.
    Listen {
        /// Local address to bind (e.g. 0.0.0.0:9000).
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
    },
    /// Start streaming to a known peer.
    Connect {
        /// Local address to bind.
        #[arg(short, long, default_value = "0.0.0.0:0")]
        bind: SocketAddr,
        /// Remote address (e.g. 127.0.0.1:9000).
        #[arg(short, long)]
        peer: SocketAddr,
    },
}

#[derive(Args)]
struct Tuning {
    /// Send window, in segments.
    #[arg(long, global = true, default_value_t = 1)]
    send_window: u32,
    /// Receive window, in segments.
    #[arg(long, global = true, default_value_t = 1)]
    recv_window: u32,
    /// Retransmission timeout in milliseconds.
    #[arg(long, global = true, default_value_t = 200)]
    timeout_ms: u64,
    /// Retransmission sweep interval in milliseconds.
    #[arg(long, global = true, default_value_t = 40)]
    timer_ms: u64,
    /// Retransmissions per segment before giving up.
    #[arg(long, global = true, default_value_t = MAX_RETRANSMITS)]
    max_retransmits: u32,
}

impl From<&Tuning> for Config {
    fn from(t: &Tuning) -> Self {
        Self {
            send_window: t.send_window,
            recv_window: t.recv_window,
            retransmission_timeout: Duration::from_millis(t.timeout_ms),
            timer_interval: Duration::from_millis(t.timer_ms),
            max_retransmits: t.max_retransmits,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    let config = Config::from(&cli.tuning);

    let (bind, mode) = match cli.mode {
        Command::Listen { bind } => (bind, Mode::Listen),
        Command::Connect { bind, peer } => (bind, Mode::Connect(peer)),
    };
    let driver = Driver::bind(bind, mode, config)
        .await
        .with_context(|| format!("cannot start on {bind}"))?;
    log::info!("ctcp {:?} on {}", mode, driver.local_addr()?);

    let (input_tx, input_rx) = mpsc::channel::<Vec<u8>>(16);
    let (output_tx, mut output_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut buf = vec![0u8; 4096];
        loop {
            match stdin.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if input_tx.send(buf[..n].to_vec()).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("stdin: {e}");
                    break;
                }
            }
        }
    });

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        let mut failed = false;
        while let Some(out) = output_rx.recv().await {
            match out {
                Output::Data(bytes) => {
                    stdout.write_all(&bytes).await?;
                    stdout.flush().await?;
                }
                Output::End(Ok(())) => log::info!("peer closed its stream"),
                Output::End(Err(e)) => {
                    log::error!("connection failed: {e}");
                    failed = true;
                }
            }
        }
        anyhow::Ok(failed)
    });

    driver.run(input_rx, output_tx).await?;
    let failed = writer.await.context("output task panicked")??;

    // The stdin reader may still be parked in a blocking read.
    std::process::exit(i32::from(failed));
}
