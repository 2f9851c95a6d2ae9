//! Per-connection protocol state and its three entry points.
//!
//! A [`Connection`] owns the complete state for one byte stream:
//! - the [`Sender`] (sequence counters, send window, retransmission queue),
//! - the [`Receiver`] (`recv_next`, receive window, reassembly buffer),
//! - the close-state machine (see [`crate::state`]),
//! - the [`Endpoint`] through which it reaches the network and application.
//!
//! The driver calls exactly three methods, never concurrently:
//!
//! | Event                         | Method                       |
//! |-------------------------------|------------------------------|
//! | application input may be ready | [`Connection::on_readable`] |
//! | a datagram arrived            | [`Connection::on_segment`]   |
//! | timer tick (via the sweeper)  | [`Connection::on_timer`]     |
//!
//! None of them blocks.  Destruction is decided here but carried out by the
//! [`crate::registry::Registry`], which owns the connection.

use std::io;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::{Config, ConfigError};
use crate::endpoint::Endpoint;
use crate::receiver::{Arrival, FinArrival, Receiver};
use crate::registry::ConnId;
use crate::retransmit::Exhausted;
use crate::segment::Segment;
use crate::sender::{AckInfo, Fill, Sender};
use crate::state::ConnectionState;

/// Why a connection ended abnormally.  Delivered to the application sink.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnError {
    /// A segment stayed unacknowledged through every allowed retransmission.
    #[error("segment seq={seqno} unacknowledged after {attempts} retransmissions")]
    RetriesExhausted { seqno: u32, attempts: u32 },
    /// Explicit teardown requested by the embedding application.
    #[error("connection aborted")]
    Aborted,
}

impl From<Exhausted> for ConnError {
    fn from(e: Exhausted) -> Self {
        Self::RetriesExhausted {
            seqno: e.seqno,
            attempts: e.attempts,
        }
    }
}

/// Whether a connection should keep living after an inbound segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Open,
    /// Both directions are closed and our FIN is acknowledged.
    Finished,
}

/// One reliable byte stream over an unreliable datagram channel.
#[derive(Debug)]
pub struct Connection<E> {
    id: ConnId,
    endpoint: E,
    state: ConnectionState,
    sender: Sender,
    receiver: Receiver,
    rto: Duration,
    max_retransmits: u32,
    /// Retransmissions across all segments, for diagnostics.
    retransmissions: u64,
    eof_signalled: bool,
}

impl<E: Endpoint> Connection<E> {
    /// Create a connection in the `Established` state.
    ///
    /// The configuration is validated here; an unusable one never produces
    /// a connection.
    pub fn new(endpoint: E, config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            id: ConnId::default(),
            endpoint,
            state: ConnectionState::Established,
            sender: Sender::new(config.send_window_bytes()),
            receiver: Receiver::new(config.recv_window_bytes()),
            rto: config.retransmission_timeout,
            max_retransmits: config.max_retransmits,
            retransmissions: 0,
            eof_signalled: false,
        })
    }

    // -----------------------------------------------------------------------
    // Sender path
    // -----------------------------------------------------------------------

    /// Move as much application input onto the wire as the window allows.
    ///
    /// When the input has ended this sends our FIN (once).  Returns
    /// immediately if the source has nothing ready.
    pub fn on_readable(&mut self, now: Instant) -> Fill {
        if self.state == ConnectionState::Closed || self.sender.half_closed() {
            return Fill::default();
        }
        let ack = self.ack_info();
        let fill = self.sender.fill(&mut self.endpoint, ack, now);
        if fill.fin_sent {
            self.state = self.state.on_local_fin();
            log::info!(
                "[ctcp {}] local input ended; FIN sent, state={}",
                self.id,
                self.state
            );
        }
        fill
    }

    // -----------------------------------------------------------------------
    // Receiver path
    // -----------------------------------------------------------------------

    /// Process one datagram received from the peer.
    ///
    /// Corrupt or malformed datagrams are dropped as if lost.  Otherwise the
    /// ACK is applied first, then payload, then FIN, and a single cumulative
    /// ACK is returned if the segment occupied sequence space.
    pub fn on_segment(&mut self, datagram: &[u8]) -> Disposition {
        if self.state == ConnectionState::Closed {
            return Disposition::Finished;
        }

        let segment = match Segment::decode(datagram) {
            Ok(s) => s,
            Err(e) => {
                log::debug!("[ctcp {}] dropping datagram: {e}", self.id);
                return Disposition::Open;
            }
        };
        let (is_ack, is_fin) = (segment.is_ack(), segment.is_fin());
        let Segment {
            seqno,
            ackno,
            window,
            payload,
            ..
        } = segment;

        if is_ack {
            let released = self.sender.on_ack(ackno, window);
            if released > 0 {
                log::debug!(
                    "[ctcp {}] ← ACK ack={ackno} (released {released} seg, {} in flight)",
                    self.id,
                    self.sender.queue().len()
                );
            }
        }

        let mut reply = false;
        let payload_len = payload.len() as u32;

        if !payload.is_empty() {
            reply = true;
            let arrival = self.receiver.on_payload(seqno, payload, &mut self.endpoint);
            log::debug!(
                "[ctcp {}] ← DATA seq={seqno} len={payload_len} {arrival:?}",
                self.id
            );
        }

        if is_fin {
            reply = true;
            match self.receiver.on_fin(seqno.wrapping_add(payload_len)) {
                FinArrival::Accepted => {
                    self.signal_end_of_input(Ok(()));
                    self.state = self.state.on_peer_fin();
                    log::info!("[ctcp {}] ← FIN; state={}", self.id, self.state);
                }
                other => log::debug!("[ctcp {}] ← FIN {other:?}", self.id),
            }
        }

        if reply {
            self.send_ack();
        }

        if self.state.peer_closed() && self.sender.fin_acked() {
            Disposition::Finished
        } else {
            Disposition::Open
        }
    }

    // -----------------------------------------------------------------------
    // Timer path
    // -----------------------------------------------------------------------

    /// Retransmit every in-flight segment whose timeout has elapsed.
    ///
    /// Returns the number of segments resent, or an error once any segment
    /// has used up its retransmissions; the caller must then destroy the
    /// connection.
    pub fn on_timer(&mut self, now: Instant) -> Result<usize, ConnError> {
        if self.state == ConnectionState::Closed {
            return Ok(0);
        }
        let result = self.sender.queue_mut().resend_expired(
            &mut self.endpoint,
            now,
            self.rto,
            self.max_retransmits,
        );
        match result {
            Ok(0) => Ok(0),
            Ok(resent) => {
                self.retransmissions += resent as u64;
                log::debug!(
                    "[ctcp {}] timeout, retransmitted {resent} segment(s)",
                    self.id
                );
                Ok(resent)
            }
            Err(exhausted) => {
                self.retransmissions += exhausted.resent as u64;
                log::warn!(
                    "[ctcp {}] seq={} unacknowledged after {} retransmissions; giving up",
                    self.id,
                    exhausted.seqno,
                    exhausted.attempts
                );
                Err(exhausted.into())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Release the queues and end the inbound stream.
    ///
    /// The sink receives `outcome` unless it was already told the stream
    /// ended.  Calling this more than once is harmless.
    pub fn teardown(&mut self, outcome: Result<(), ConnError>) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.sender.clear();
        self.receiver.clear();
        if let Err(ref e) = outcome {
            log::warn!("[ctcp {}] torn down: {e}", self.id);
        } else {
            log::info!("[ctcp {}] closed", self.id);
        }
        self.signal_end_of_input(outcome);
        self.state = ConnectionState::Closed;
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: ConnId) {
        self.id = id;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Our FIN has been sent.
    pub fn half_closed(&self) -> bool {
        self.sender.half_closed()
    }

    pub fn next_seqno(&self) -> u32 {
        self.sender.next_seqno()
    }

    pub fn send_base(&self) -> u32 {
        self.sender.send_base()
    }

    pub fn recv_next(&self) -> u32 {
        self.receiver.recv_next()
    }

    pub fn send_window_bytes(&self) -> u32 {
        self.sender.window_bytes()
    }

    pub fn recv_window_bytes(&self) -> u32 {
        self.receiver.window_bytes()
    }

    pub fn retransmission_timeout(&self) -> Duration {
        self.rto
    }

    /// Segments awaiting acknowledgement.
    pub fn in_flight(&self) -> usize {
        self.sender.queue().len()
    }

    /// Highest retransmission count among in-flight segments.
    pub fn max_retransmit_count(&self) -> u32 {
        self.sender
            .queue()
            .iter()
            .map(|e| e.retransmit_count)
            .max()
            .unwrap_or(0)
    }

    /// Payload bytes parked in the reassembly buffer.
    pub fn buffered_bytes(&self) -> usize {
        self.receiver.reassembly().buffered_bytes()
    }

    pub fn retransmissions(&self) -> u64 {
        self.retransmissions
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn endpoint_mut(&mut self) -> &mut E {
        &mut self.endpoint
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn ack_info(&self) -> AckInfo {
        AckInfo {
            ackno: self.receiver.ack_number(),
            window: self.receiver.advertised_window(),
        }
    }

    fn send_ack(&mut self) {
        let AckInfo { ackno, window } = self.ack_info();
        let ack = Segment::ack(self.sender.next_seqno(), ackno, window);
        let sent = ack
            .encode()
            .map_err(io::Error::other)
            .and_then(|datagram| self.endpoint.send(&datagram));
        if let Err(e) = sent {
            log::debug!("[ctcp {}] ACK send failed: {e}", self.id);
        }
        log::debug!("[ctcp {}] → ACK ack={ackno} wnd={window}", self.id);
    }

    fn signal_end_of_input(&mut self, outcome: Result<(), ConnError>) {
        if self.eof_signalled {
            return;
        }
        self.eof_signalled = true;
        self.endpoint.signal_end_of_input(outcome);
    }
}
