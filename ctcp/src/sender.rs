//! Send-side sliding window.
//!
//! [`Sender`] slices the application byte stream into segments, transmits
//! them while the window has room, and keeps every transmitted segment in a
//! [`RetransmitQueue`] until a cumulative ACK covers it.
//!
//! # Sequence-number layout
//!
//! ```text
//!  send_base          next_seqno         send_base + window
//!      │                  │                     │
//!  ────┼──────────────────┼─────────────────────┼────▶ seq space
//!      │ <── in flight ──▶│ <──── sendable ────▶│
//! ```
//!
//! Invariant: `send_base ≤ next_seqno ≤ send_base + window_bytes`.
//!
//! The window actually used is the smaller of the configured send window and
//! the window most recently advertised by the peer.

use std::time::Instant;

use crate::endpoint::{ByteSource, DatagramSink, Read};
use crate::retransmit::{InFlight, RetransmitQueue};
use crate::segment::{Segment, MAX_SEGMENT_DATA_SIZE};
use crate::seq::{seq_distance, seq_le, seq_lt, INITIAL_SEQNO};

/// Receive-side values piggybacked on every outbound segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckInfo {
    pub ackno: u32,
    pub window: u16,
}

/// What one [`Sender::fill`] call put on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fill {
    /// Data segments transmitted.
    pub segments: usize,
    /// Payload bytes transmitted.
    pub bytes: usize,
    /// The FIN went out during this call.
    pub fin_sent: bool,
}

/// Send-side state for one connection.
#[derive(Debug)]
pub struct Sender {
    /// Oldest unacknowledged sequence number (left window edge).
    send_base: u32,
    /// Sequence number assigned to the next new byte.
    next_seqno: u32,
    /// Configured send window in bytes.
    window_bytes: u32,
    /// Last window advertised by the peer.
    peer_window: u32,
    queue: RetransmitQueue,
    /// Sequence number of our FIN, once sent.
    fin_seqno: Option<u32>,
}

impl Sender {
    /// A window of zero is raised to one byte; [`crate::Config::validate`]
    /// rejects it before a connection gets here.
    pub(crate) fn new(window_bytes: u32) -> Self {
        let window_bytes = window_bytes.max(1);
        Self {
            send_base: INITIAL_SEQNO,
            next_seqno: INITIAL_SEQNO,
            window_bytes,
            peer_window: window_bytes,
            queue: RetransmitQueue::new(),
            fin_seqno: None,
        }
    }

    pub fn send_base(&self) -> u32 {
        self.send_base
    }

    pub fn next_seqno(&self) -> u32 {
        self.next_seqno
    }

    pub fn window_bytes(&self) -> u32 {
        self.window_bytes
    }

    pub fn peer_window(&self) -> u32 {
        self.peer_window
    }

    pub fn queue(&self) -> &RetransmitQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut RetransmitQueue {
        &mut self.queue
    }

    /// Our FIN has been sent.
    pub fn half_closed(&self) -> bool {
        self.fin_seqno.is_some()
    }

    /// Our FIN has been sent and is no longer in the retransmission queue.
    pub fn fin_acked(&self) -> bool {
        self.fin_seqno.is_some() && !self.queue.contains_fin()
    }

    /// Sequence space still available for new segments.
    pub fn room(&self) -> u32 {
        let limit = self.window_bytes.min(self.peer_window);
        seq_distance(self.next_seqno, self.send_base.wrapping_add(limit))
    }

    /// Pull bytes from `io` and transmit them until the window is full, the
    /// source would block, or the input ends (which sends the FIN).
    ///
    /// Never blocks.  After the FIN has gone out this is a no-op.
    pub fn fill<E>(&mut self, io: &mut E, ack: AckInfo, now: Instant) -> Fill
    where
        E: ByteSource + DatagramSink + ?Sized,
    {
        let mut fill = Fill::default();

        while !self.half_closed() {
            let room = self.room();
            if room == 0 {
                break;
            }
            let max = (room as usize).min(MAX_SEGMENT_DATA_SIZE);

            let segment = match io.read(max) {
                Read::WouldBlock => break,
                Read::Data(bytes) if bytes.is_empty() => break,
                Read::Data(bytes) => {
                    debug_assert!(bytes.len() <= max, "source returned more than requested");
                    fill.segments += 1;
                    fill.bytes += bytes.len();
                    Segment::data(self.next_seqno, ack.ackno, ack.window, bytes)
                }
                Read::EndOfInput => {
                    fill.fin_sent = true;
                    self.fin_seqno = Some(self.next_seqno);
                    Segment::fin(self.next_seqno, ack.ackno, ack.window)
                }
            };
            self.transmit(io, segment, now);
        }

        debug_assert!(seq_le(self.send_base, self.next_seqno));
        debug_assert!(seq_le(
            self.next_seqno,
            self.send_base.wrapping_add(self.window_bytes)
        ));
        fill
    }

    /// Process a cumulative ACK carrying the peer's advertised `window`.
    ///
    /// ACKs for data never sent are ignored.  Returns the number of queued
    /// segments released.
    pub fn on_ack(&mut self, ackno: u32, window: u16) -> usize {
        if !seq_le(ackno, self.next_seqno) {
            log::debug!(
                "[ctcp] ignoring ACK {ackno} beyond next_seqno {}",
                self.next_seqno
            );
            return 0;
        }
        if !seq_le(self.send_base, ackno) {
            // Stale ACK, reordered behind a newer one.
            return 0;
        }
        self.peer_window = u32::from(window);
        if !seq_lt(self.send_base, ackno) {
            return 0;
        }
        self.send_base = ackno;
        self.queue.acknowledge(ackno)
    }

    /// Release the retransmission queue.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    fn transmit<C: DatagramSink + ?Sized>(&mut self, channel: &mut C, segment: Segment, now: Instant) {
        let datagram = match segment.encode() {
            Ok(d) => d,
            Err(e) => {
                log::error!("[ctcp] cannot encode seq={}: {e}", segment.seqno);
                return;
            }
        };
        if let Err(e) = channel.send(&datagram) {
            // Indistinguishable from loss; the sweeper will resend it.
            log::debug!("[ctcp] send of seq={} failed: {e}", segment.seqno);
        }
        log::debug!(
            "[ctcp] → {} seq={} len={} in_flight={} ({} bytes)",
            if segment.is_fin() { "FIN" } else { "DATA" },
            segment.seqno,
            segment.payload.len(),
            self.queue.len() + 1,
            self.queue.bytes_in_flight() + segment.seq_len()
        );
        self.next_seqno = segment.end();
        self.queue.push(InFlight::new(&segment, datagram, now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::MemoryEndpoint;

    const MSS: usize = MAX_SEGMENT_DATA_SIZE;
    const ACK: AckInfo = AckInfo { ackno: 1, window: 1440 };

    fn decoded(ep: &mut MemoryEndpoint) -> Vec<Segment> {
        ep.take_outbox()
            .iter()
            .map(|d| Segment::decode(d).unwrap())
            .collect()
    }

    #[test]
    fn initial_state() {
        let s = Sender::new(4 * MSS as u32);
        assert_eq!(s.send_base(), 1);
        assert_eq!(s.next_seqno(), 1);
        assert_eq!(s.room(), 4 * MSS as u32);
        assert!(!s.half_closed());
        assert!(s.queue().is_empty());
    }

    #[test]
    fn fill_slices_into_max_sized_segments() {
        let mut s = Sender::new(4 * MSS as u32);
        let mut ep = MemoryEndpoint::new();
        ep.push_input(&vec![7u8; MSS + 100]);

        let fill = s.fill(&mut ep, ACK, Instant::now());
        assert_eq!(fill, Fill { segments: 2, bytes: MSS + 100, fin_sent: false });

        let segs = decoded(&mut ep);
        assert_eq!(segs[0].seqno, 1);
        assert_eq!(segs[0].payload.len(), MSS);
        assert_eq!(segs[1].seqno, 1 + MSS as u32);
        assert_eq!(segs[1].payload.len(), 100);
        assert!(segs.iter().all(|s| s.is_ack() && s.ackno == 1));
        assert_eq!(s.next_seqno(), 1 + MSS as u32 + 100);
        assert_eq!(s.queue().len(), 2);
    }

    #[test]
    fn two_segment_window_holds_back_the_third() {
        let mut s = Sender::new(2 * MSS as u32);
        let mut ep = MemoryEndpoint::new();
        ep.push_input(&vec![1u8; 3 * MSS]);
        let now = Instant::now();

        assert_eq!(s.fill(&mut ep, ACK, now).segments, 2);
        assert_eq!(ep.take_outbox().len(), 2);
        assert_eq!(s.room(), 0);

        // Nothing moves until an ACK arrives.
        assert_eq!(s.fill(&mut ep, ACK, now).segments, 0);
        assert_eq!(ep.outbox_len(), 0);

        // ACK past the first segment frees exactly one segment of room.
        assert_eq!(s.on_ack(1 + MSS as u32, 2 * MSS as u16), 1);
        assert_eq!(s.fill(&mut ep, ACK, now).segments, 1);
        let third = decoded(&mut ep);
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].seqno, 1 + 2 * MSS as u32);
    }

    #[test]
    fn end_of_input_sends_single_fin() {
        let mut s = Sender::new(MSS as u32);
        let mut ep = MemoryEndpoint::new();
        ep.push_input(b"bye");
        ep.close_input();

        let fill = s.fill(&mut ep, ACK, Instant::now());
        assert!(fill.fin_sent);
        let segs = decoded(&mut ep);
        assert_eq!(segs.len(), 2);
        assert!(segs[1].is_fin());
        assert_eq!(segs[1].seqno, 4);
        assert!(segs[1].payload.is_empty());
        assert_eq!(s.next_seqno(), 5);
        assert!(s.half_closed());
        assert!(!s.fin_acked());

        // Further calls never emit anything.
        assert_eq!(s.fill(&mut ep, ACK, Instant::now()), Fill::default());
        assert_eq!(ep.outbox_len(), 0);

        assert_eq!(s.on_ack(5, 1440), 2);
        assert!(s.fin_acked());
    }

    #[test]
    fn would_block_returns_immediately() {
        let mut s = Sender::new(MSS as u32);
        let mut ep = MemoryEndpoint::new();
        assert_eq!(s.fill(&mut ep, ACK, Instant::now()), Fill::default());
        assert_eq!(s.next_seqno(), 1);
    }

    #[test]
    fn zero_window_is_raised_to_one_byte() {
        let mut s = Sender::new(0);
        assert_eq!(s.window_bytes(), 1);
        let mut ep = MemoryEndpoint::new();
        ep.push_input(b"ab");
        assert_eq!(s.fill(&mut ep, ACK, Instant::now()).bytes, 1);
    }

    #[test]
    fn read_never_exceeds_window_room() {
        let mut s = Sender::new(100);
        let mut ep = MemoryEndpoint::new();
        ep.push_input(&[0u8; 250]);
        let fill = s.fill(&mut ep, ACK, Instant::now());
        assert_eq!(fill.bytes, 100);
        assert_eq!(ep.pending_input(), 150);
    }

    #[test]
    fn peer_window_limits_room() {
        let mut s = Sender::new(4 * MSS as u32);
        s.on_ack(1, 500);
        assert_eq!(s.room(), 500);
        s.on_ack(1, 0);
        assert_eq!(s.room(), 0);
    }

    #[test]
    fn shrunken_peer_window_below_in_flight_gives_no_room() {
        let mut s = Sender::new(4 * MSS as u32);
        let mut ep = MemoryEndpoint::new();
        ep.push_input(&[0u8; 1000]);
        s.fill(&mut ep, ACK, Instant::now());
        s.on_ack(1, 200);
        assert_eq!(s.room(), 0);
        ep.push_input(&[0u8; 10]);
        assert_eq!(s.fill(&mut ep, ACK, Instant::now()).segments, 0);
    }

    #[test]
    fn send_base_never_moves_backwards() {
        let mut s = Sender::new(4 * MSS as u32);
        let mut ep = MemoryEndpoint::new();
        ep.push_input(&[0u8; 40]);
        s.fill(&mut ep, ACK, Instant::now());

        let mut last = s.send_base();
        for ackno in [11, 5, 41, 30, 1000, 41, 2] {
            s.on_ack(ackno, 1440);
            assert!(seq_le(last, s.send_base()));
            assert!(s.queue().iter().all(|e| !seq_le(e.end(), s.send_base())));
            last = s.send_base();
        }
        assert_eq!(s.send_base(), 41);
    }

    #[test]
    fn ack_beyond_next_seqno_ignored() {
        let mut s = Sender::new(MSS as u32);
        let mut ep = MemoryEndpoint::new();
        ep.push_input(b"12345");
        s.fill(&mut ep, ACK, Instant::now());
        assert_eq!(s.on_ack(1000, 1440), 0);
        assert_eq!(s.send_base(), 1);
        assert_eq!(s.queue().len(), 1);
    }
}
