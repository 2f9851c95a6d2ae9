//! In-flight segment bookkeeping.
//!
//! [`RetransmitQueue`] holds every segment that has been transmitted but not
//! yet cumulatively acknowledged, ordered by sequence number (front = oldest).
//! Each [`InFlight`] entry keeps the exact bytes that went on the wire plus
//! its **own** send timestamp and retransmission count, so one slow segment
//! never drags its neighbours into an early resend.
//!
//! The queue owns its entries exclusively: an acknowledged segment is popped
//! and dropped, never flagged and left in place.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::endpoint::DatagramSink;
use crate::segment::Segment;
use crate::seq::seq_le;

/// A single transmitted, unacknowledged segment.
#[derive(Debug, Clone)]
pub struct InFlight {
    /// Sequence number of the first byte (or of the FIN).
    pub seqno: u32,
    /// Sequence space consumed (payload length, plus one for FIN).
    pub seq_len: u32,
    pub fin: bool,
    /// Encoded segment, resent verbatim on timeout.
    pub datagram: Vec<u8>,
    /// Time of the most recent transmission.
    pub last_sent_at: Instant,
    /// Number of retransmissions so far (0 = only the original send).
    pub retransmit_count: u32,
}

impl InFlight {
    pub fn new(segment: &Segment, datagram: Vec<u8>, now: Instant) -> Self {
        Self {
            seqno: segment.seqno,
            seq_len: segment.seq_len(),
            fin: segment.is_fin(),
            datagram,
            last_sent_at: now,
            retransmit_count: 0,
        }
    }

    /// First sequence number after this segment.
    pub fn end(&self) -> u32 {
        self.seqno.wrapping_add(self.seq_len)
    }
}

/// A segment ran out of retransmission attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted {
    pub seqno: u32,
    pub attempts: u32,
    /// Entries resent during the failing scan, the exhausted one included.
    pub resent: usize,
}

/// Ordered queue of in-flight segments for one connection.
#[derive(Debug, Default)]
pub struct RetransmitQueue {
    entries: VecDeque<InFlight>,
}

impl RetransmitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Enroll a just-transmitted segment.  Sequence numbers must increase.
    pub fn push(&mut self, entry: InFlight) {
        debug_assert!(
            self.entries
                .back()
                .map_or(true, |last| seq_le(last.end(), entry.seqno)),
            "retransmit queue entries must be pushed in sequence order"
        );
        self.entries.push_back(entry);
    }

    /// Drop every entry fully covered by the cumulative `ackno`.
    ///
    /// An entry is covered when `seqno + seq_len ≤ ackno`; partially covered
    /// entries stay whole.  Returns the number of entries removed.
    pub fn acknowledge(&mut self, ackno: u32) -> usize {
        let mut removed = 0;
        while let Some(front) = self.entries.front() {
            if !seq_le(front.end(), ackno) {
                break;
            }
            self.entries.pop_front();
            removed += 1;
        }
        removed
    }

    /// Resend every entry idle for longer than `rto`.
    ///
    /// Each resent entry gets `last_sent_at = now` and one more
    /// `retransmit_count`.  As soon as an entry's count reaches
    /// `max_retransmits` the scan stops and [`Exhausted`] is returned; later
    /// entries are left untouched for this tick.
    pub fn resend_expired<C: DatagramSink + ?Sized>(
        &mut self,
        channel: &mut C,
        now: Instant,
        rto: Duration,
        max_retransmits: u32,
    ) -> Result<usize, Exhausted> {
        let mut resent = 0;
        for entry in self.entries.iter_mut() {
            if now.saturating_duration_since(entry.last_sent_at) <= rto {
                continue;
            }
            if let Err(e) = channel.send(&entry.datagram) {
                log::debug!("retransmit of seq={} failed: {e}", entry.seqno);
            }
            entry.last_sent_at = now;
            entry.retransmit_count += 1;
            resent += 1;

            if entry.retransmit_count >= max_retransmits {
                return Err(Exhausted {
                    seqno: entry.seqno,
                    attempts: entry.retransmit_count,
                    resent,
                });
            }
        }
        Ok(resent)
    }

    /// `true` while a FIN is still awaiting acknowledgement.
    pub fn contains_fin(&self) -> bool {
        self.entries.iter().any(|e| e.fin)
    }

    /// Sequence space occupied by unacknowledged entries.
    pub fn bytes_in_flight(&self) -> u32 {
        self.entries.iter().map(|e| e.seq_len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InFlight> {
        self.entries.iter()
    }

    /// Release every entry.  Used on teardown.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
