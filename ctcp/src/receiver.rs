//! Inbound segment ordering and receive-window management.
//!
//! The [`Receiver`] handles everything between a decoded segment and the
//! application sink:
//! - Delivering in-order payload immediately and advancing `recv_next`.
//! - Holding out-of-order payload in a [`Reassembly`] buffer until the gap
//!   closes, then flushing the contiguous run.
//! - Discarding duplicates of already-delivered data.
//! - Accepting the peer's FIN once every byte before it has been delivered.
//! - Computing the ACK number and advertised window for outbound ACKs.
//!
//! The [`Receiver`] does **not** send ACKs itself; it provides the values
//! that [`crate::connection::Connection`] uses when constructing them.

use crate::endpoint::ByteSink;
use crate::reassembly::Reassembly;
use crate::seq::{seq_distance, seq_lt, INITIAL_SEQNO};

/// What happened to an inbound payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// In order: this payload plus any flushed run went to the sink.
    Delivered { bytes: usize },
    /// Ahead of `recv_next`: held until the gap closes.
    Buffered,
    /// Already delivered or already buffered.
    Duplicate,
    /// Ahead of `recv_next` but past the right edge of the receive window.
    OutOfWindow,
    /// The peer's FIN was already accepted; inbound payload is ignored.
    AfterFin,
}

/// What happened to an inbound FIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinArrival {
    /// In order: the inbound stream is now complete.
    Accepted,
    /// A retransmission of a FIN that was already accepted.
    Repeated,
    /// Bytes before the FIN are still missing; ignored for now.
    Early,
}

/// Receive-side state for one connection.
#[derive(Debug)]
pub struct Receiver {
    /// Next sequence number expected in order (`RCV.NXT`).
    recv_next: u32,
    /// Configured receive window in bytes.
    window_bytes: u32,
    reassembly: Reassembly,
    fin_received: bool,
}

impl Receiver {
    pub fn new(window_bytes: u32) -> Self {
        Self {
            recv_next: INITIAL_SEQNO,
            window_bytes,
            reassembly: Reassembly::new(),
            fin_received: false,
        }
    }

    pub fn recv_next(&self) -> u32 {
        self.recv_next
    }

    pub fn window_bytes(&self) -> u32 {
        self.window_bytes
    }

    pub fn fin_received(&self) -> bool {
        self.fin_received
    }

    pub fn reassembly(&self) -> &Reassembly {
        &self.reassembly
    }

    /// Cumulative ACK number: every byte before it has been delivered.
    pub fn ack_number(&self) -> u32 {
        self.recv_next
    }

    /// Free receive space: the window minus bytes parked out of order.
    pub fn advertised_window(&self) -> u16 {
        let free = (self.window_bytes as usize).saturating_sub(self.reassembly.buffered_bytes());
        free.min(u16::MAX as usize) as u16
    }

    /// Process an inbound, non-empty payload starting at `seqno`.
    pub fn on_payload<S: ByteSink + ?Sized>(
        &mut self,
        seqno: u32,
        payload: Vec<u8>,
        sink: &mut S,
    ) -> Arrival {
        if self.fin_received {
            return Arrival::AfterFin;
        }

        if seqno == self.recv_next {
            let mut delivered = payload.len();
            self.deliver(&payload, sink);
            while let Some(next) = self.reassembly.take(self.recv_next) {
                delivered += next.len();
                self.deliver(&next, sink);
            }
            self.reassembly.discard_before(self.recv_next);
            return Arrival::Delivered { bytes: delivered };
        }

        if seq_lt(self.recv_next, seqno) {
            let reach = u64::from(seq_distance(self.recv_next, seqno)) + payload.len() as u64;
            if reach > u64::from(self.window_bytes) {
                return Arrival::OutOfWindow;
            }
            return if self.reassembly.insert(seqno, payload) {
                Arrival::Buffered
            } else {
                Arrival::Duplicate
            };
        }

        Arrival::Duplicate
    }

    /// Process a FIN occupying sequence number `fin_seqno`.
    ///
    /// Accepted only when every byte before it has been delivered; the FIN
    /// then consumes one sequence number.
    pub fn on_fin(&mut self, fin_seqno: u32) -> FinArrival {
        if self.fin_received {
            return FinArrival::Repeated;
        }
        if fin_seqno != self.recv_next {
            return FinArrival::Early;
        }
        self.fin_received = true;
        self.recv_next = self.recv_next.wrapping_add(1);
        self.reassembly.clear();
        FinArrival::Accepted
    }

    /// Release the reassembly buffer.
    pub fn clear(&mut self) {
        self.reassembly.clear();
    }

    fn deliver<S: ByteSink + ?Sized>(&mut self, payload: &[u8], sink: &mut S) {
        sink.write(payload);
        self.recv_next = self.recv_next.wrapping_add(payload.len() as u32);
    }
}
