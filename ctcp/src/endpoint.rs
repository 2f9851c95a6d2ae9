//! Collaborator interfaces consumed by the protocol core.
//!
//! A [`crate::connection::Connection`] never touches a socket, a file
//! descriptor or a clock on its own.  Everything outside the state machine is
//! reached through three traits:
//!
//! | Trait            | Direction            | Used by                      |
//! |------------------|----------------------|------------------------------|
//! | [`DatagramSink`] | segments → network   | sender, receiver (ACKs), sweeper |
//! | [`ByteSource`]   | application → stream | sender path                  |
//! | [`ByteSink`]     | stream → application | receiver path, teardown      |
//!
//! Inbound datagrams are not pulled through a trait: the driver polls its
//! channel and pushes each datagram into
//! [`crate::connection::Connection::on_segment`].
//!
//! [`MemoryEndpoint`] implements all three over in-memory buffers; the
//! tests and the fault simulator are built on it.

use std::collections::VecDeque;
use std::io;

use crate::connection::ConnError;

/// Outcome of a non-blocking read from the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Read {
    /// Between 1 and `max` bytes of stream data.
    Data(Vec<u8>),
    /// The application will never produce more bytes.
    EndOfInput,
    /// Nothing ready right now; the driver will call again later.
    WouldBlock,
}

/// Outbound half of the unreliable datagram channel.
pub trait DatagramSink {
    /// Hand one encoded segment to the network.  Failures count as loss.
    fn send(&mut self, datagram: &[u8]) -> io::Result<()>;
}

/// Application byte stream feeding the sender path.
pub trait ByteSource {
    /// Read up to `max` bytes without blocking.
    fn read(&mut self, max: usize) -> Read;
}

/// Application byte stream fed by the receiver path.
pub trait ByteSink {
    /// Deliver in-order stream bytes.
    fn write(&mut self, data: &[u8]);

    /// The inbound stream is over: `Ok` after the peer's FIN, `Err` when the
    /// connection was torn down abnormally.  Called at most once.
    fn signal_end_of_input(&mut self, outcome: Result<(), ConnError>);
}

/// Everything a connection needs from the outside world.
pub trait Endpoint: DatagramSink + ByteSource + ByteSink {}

impl<T: DatagramSink + ByteSource + ByteSink> Endpoint for T {}

// ---------------------------------------------------------------------------
// MemoryEndpoint
// ---------------------------------------------------------------------------

/// An [`Endpoint`] backed entirely by in-memory buffers.
///
/// Datagrams "sent" are queued in an outbox for the caller to carry to the
/// peer; application input is whatever was pushed with [`push_input`];
/// delivered bytes and end-of-input signals are recorded for inspection.
///
/// [`push_input`]: MemoryEndpoint::push_input
#[derive(Debug, Default)]
pub struct MemoryEndpoint {
    outbox: VecDeque<Vec<u8>>,
    input: VecDeque<u8>,
    input_closed: bool,
    /// Bytes delivered to the application, in delivery order.
    pub delivered: Vec<u8>,
    /// Every end-of-input signal received, in order.
    pub end_signals: Vec<Result<(), ConnError>>,
}

impl MemoryEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `data` available to the next reads.
    pub fn push_input(&mut self, data: &[u8]) {
        self.input.extend(data.iter().copied());
    }

    /// Once the buffered input is drained, reads report end-of-input.
    pub fn close_input(&mut self) {
        self.input_closed = true;
    }

    /// Bytes pushed but not yet read by the sender path.
    pub fn pending_input(&self) -> usize {
        self.input.len()
    }

    /// Remove and return every datagram sent since the last call.
    pub fn take_outbox(&mut self) -> Vec<Vec<u8>> {
        self.outbox.drain(..).collect()
    }

    pub fn outbox_len(&self) -> usize {
        self.outbox.len()
    }
}

impl DatagramSink for MemoryEndpoint {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.outbox.push_back(datagram.to_vec());
        Ok(())
    }
}

impl ByteSource for MemoryEndpoint {
    fn read(&mut self, max: usize) -> Read {
        if self.input.is_empty() {
            return if self.input_closed {
                Read::EndOfInput
            } else {
                Read::WouldBlock
            };
        }
        let n = max.min(self.input.len());
        Read::Data(self.input.drain(..n).collect())
    }
}

impl ByteSink for MemoryEndpoint {
    fn write(&mut self, data: &[u8]) {
        self.delivered.extend_from_slice(data);
    }

    fn signal_end_of_input(&mut self, outcome: Result<(), ConnError>) {
        self.end_signals.push(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_respects_max_and_reports_would_block() {
        let mut ep = MemoryEndpoint::new();
        assert_eq!(ep.read(10), Read::WouldBlock);

        ep.push_input(b"hello world");
        assert_eq!(ep.read(5), Read::Data(b"hello".to_vec()));
        assert_eq!(ep.pending_input(), 6);
        assert_eq!(ep.read(100), Read::Data(b" world".to_vec()));
        assert_eq!(ep.read(100), Read::WouldBlock);
    }

    #[test]
    fn end_of_input_only_after_drain() {
        let mut ep = MemoryEndpoint::new();
        ep.push_input(b"ab");
        ep.close_input();
        assert_eq!(ep.read(1), Read::Data(b"a".to_vec()));
        assert_eq!(ep.read(1), Read::Data(b"b".to_vec()));
        assert_eq!(ep.read(1), Read::EndOfInput);
        assert_eq!(ep.read(1), Read::EndOfInput);
    }

    #[test]
    fn outbox_collects_datagrams() {
        let mut ep = MemoryEndpoint::new();
        ep.send(b"one").unwrap();
        ep.send(b"two").unwrap();
        assert_eq!(ep.outbox_len(), 2);
        assert_eq!(ep.take_outbox(), vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(ep.outbox_len(), 0);
    }
}
