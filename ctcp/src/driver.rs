//! Tokio UDP driver for a single connection.
//!
//! [`Driver::run`] owns one UDP socket and a [`Registry`] holding at most one
//! connection, and serializes every event into it with `tokio::select!`:
//!
//! 1. an inbound datagram → receiver path, then sender path (ACKs may have
//!    opened the window);
//! 2. a chunk of application input → endpoint buffer → sender path, only
//!    while the buffered backlog is below [`MAX_BACKLOG`];
//! 3. a timer tick → [`sweep`].
//!
//! In [`Mode::Listen`] the connection is created when the first datagram
//! arrives, and datagrams from any other address are ignored afterwards.
//! The loop ends once the connection has been destroyed.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

use crate::config::{Config, ConfigError};
use crate::connection::ConnError;
use crate::endpoint::{ByteSink, ByteSource, DatagramSink, Read};
use crate::registry::{ConnId, Registry};
use crate::segment::Segment;
use crate::sweeper::sweep;

/// Largest datagram accepted from the socket.
const MAX_DATAGRAM: usize = 65_535;

/// Application input buffered ahead of the send window before the driver
/// stops pulling from the input channel.
pub const MAX_BACKLOG: usize = 64 * 1024;

/// Errors that stop the driver.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("socket I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// What the driver hands to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// In-order stream bytes.
    Data(Vec<u8>),
    /// The inbound stream ended; sent exactly once.
    End(Result<(), ConnError>),
}

/// How the driver finds its peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Connect(SocketAddr),
    Listen,
}

// ---------------------------------------------------------------------------
// StreamEndpoint
// ---------------------------------------------------------------------------

/// [`crate::endpoint::Endpoint`] over a shared UDP socket and two channels.
#[derive(Debug)]
pub struct StreamEndpoint {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    pending: VecDeque<u8>,
    input_done: bool,
    output: mpsc::UnboundedSender<Output>,
}

impl StreamEndpoint {
    pub fn new(
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
        output: mpsc::UnboundedSender<Output>,
    ) -> Self {
        Self {
            socket,
            peer,
            pending: VecDeque::new(),
            input_done: false,
            output,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Queue application bytes for the sender path.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.pending.extend(chunk.iter().copied());
    }

    /// No more application input will arrive.
    pub fn finish(&mut self) {
        self.input_done = true;
    }

    /// Bytes fed but not yet read by the sender path.
    pub fn backlog(&self) -> usize {
        self.pending.len()
    }
}

impl DatagramSink for StreamEndpoint {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.socket.try_send_to(datagram, self.peer).map(|_| ())
    }
}

impl ByteSource for StreamEndpoint {
    fn read(&mut self, max: usize) -> Read {
        if self.pending.is_empty() {
            return if self.input_done {
                Read::EndOfInput
            } else {
                Read::WouldBlock
            };
        }
        let n = max.min(self.pending.len());
        Read::Data(self.pending.drain(..n).collect())
    }
}

impl ByteSink for StreamEndpoint {
    fn write(&mut self, data: &[u8]) {
        if self.output.send(Output::Data(data.to_vec())).is_err() {
            log::debug!("[ctcp] output receiver gone; discarding {} bytes", data.len());
        }
    }

    fn signal_end_of_input(&mut self, outcome: Result<(), ConnError>) {
        if self.output.send(Output::End(outcome)).is_err() {
            log::debug!("[ctcp] output receiver gone; end-of-input dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Event loop binding one connection to a UDP socket.
#[derive(Debug)]
pub struct Driver {
    socket: Arc<UdpSocket>,
    mode: Mode,
    config: Config,
}

impl Driver {
    /// Bind `local` and prepare to run in `mode`.
    pub async fn bind(local: SocketAddr, mode: Mode, config: Config) -> Result<Self, DriverError> {
        config.validate()?;
        let socket = UdpSocket::bind(local).await?;
        log::info!("[ctcp] bound {}", socket.local_addr()?);
        Ok(Self {
            socket: Arc::new(socket),
            mode,
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DriverError> {
        Ok(self.socket.local_addr()?)
    }

    /// Run until the connection is destroyed.
    ///
    /// Closing `input` ends the outbound stream (our FIN).  The end of the
    /// inbound stream is reported on `output` as [`Output::End`].
    pub async fn run(
        self,
        mut input: mpsc::Receiver<Vec<u8>>,
        output: mpsc::UnboundedSender<Output>,
    ) -> Result<(), DriverError> {
        let mut registry: Registry<StreamEndpoint> = Registry::new();
        let mut conn: Option<ConnId> = match self.mode {
            Mode::Connect(peer) => {
                let endpoint = StreamEndpoint::new(Arc::clone(&self.socket), peer, output.clone());
                Some(registry.open(endpoint, &self.config)?)
            }
            Mode::Listen => None,
        };

        let mut ticker = time::interval(self.config.timer_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut input_open = true;

        loop {
            if let Some(id) = conn {
                if !registry.contains(id) {
                    break;
                }
            }
            let accepting = input_open
                && conn
                    .and_then(|id| registry.get(id))
                    .map_or(false, |c| c.endpoint().backlog() < MAX_BACKLOG);

            tokio::select! {
                // ── inbound datagram ─────────────────────────────────────
                result = self.socket.recv_from(&mut buf) => {
                    let (n, from) = match result {
                        Ok(v) => v,
                        Err(e) if is_transient(&e) => {
                            log::debug!("[ctcp] recv_from: {e}");
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    };
                    let id = match conn {
                        Some(id) => {
                            let peer = registry.get(id).map(|c| c.endpoint().peer());
                            if peer != Some(from) {
                                log::debug!("[ctcp] ignoring datagram from {from}");
                                continue;
                            }
                            id
                        }
                        None => {
                            // Only a well-formed segment may claim the listener.
                            if let Err(e) = Segment::decode(&buf[..n]) {
                                log::debug!("[ctcp] ignoring malformed datagram from {from}: {e}");
                                continue;
                            }
                            let endpoint =
                                StreamEndpoint::new(Arc::clone(&self.socket), from, output.clone());
                            let id = registry.open(endpoint, &self.config)?;
                            log::info!("[ctcp {id}] accepted peer {from}");
                            conn = Some(id);
                            id
                        }
                    };
                    registry.on_segment(id, &buf[..n]);
                    registry.on_readable(id, Instant::now());
                }

                // ── application input ────────────────────────────────────
                chunk = input.recv(), if accepting => {
                    let Some(id) = conn else { continue };
                    if let Some(c) = registry.get_mut(id) {
                        match chunk {
                            Some(bytes) => c.endpoint_mut().feed(&bytes),
                            None => {
                                input_open = false;
                                c.endpoint_mut().finish();
                            }
                        }
                    }
                    registry.on_readable(id, Instant::now());
                }

                // ── retransmission timer ─────────────────────────────────
                _ = ticker.tick() => {
                    let report = sweep(&mut registry, Instant::now());
                    for id in &report.destroyed {
                        log::warn!("[ctcp {id}] gave up on peer");
                    }
                    if let Some(id) = conn {
                        registry.on_readable(id, Instant::now());
                    }
                }
            }
        }

        log::info!("[ctcp] driver finished");
        Ok(())
    }
}

/// ICMP-induced errors some platforms surface on unconnected UDP sockets.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused | io::ErrorKind::WouldBlock
    )
}
