//! Holding area for segments that arrive ahead of `recv_next`.
//!
//! Entries are keyed by sequence number.  The receiver inserts out-of-order
//! payloads here and pulls them back out one at a time as `recv_next`
//! reaches each key, so every stored entry always starts at or beyond
//! `recv_next`.

use std::collections::BTreeMap;

use crate::seq::seq_lt;

#[derive(Debug, Default)]
pub struct Reassembly {
    segments: BTreeMap<u32, Vec<u8>>,
    buffered: usize,
}

impl Reassembly {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `payload` at `seqno`.
    ///
    /// Returns `false` (and stores nothing) when an entry already exists at
    /// that sequence number, i.e. the segment is a duplicate.
    pub fn insert(&mut self, seqno: u32, payload: Vec<u8>) -> bool {
        if self.segments.contains_key(&seqno) {
            return false;
        }
        self.buffered += payload.len();
        self.segments.insert(seqno, payload);
        true
    }

    /// Remove and return the entry starting exactly at `seqno`.
    pub fn take(&mut self, seqno: u32) -> Option<Vec<u8>> {
        let payload = self.segments.remove(&seqno)?;
        self.buffered -= payload.len();
        Some(payload)
    }

    /// Drop entries that start before `recv_next` (they can no longer be
    /// delivered without duplicating bytes).  Returns how many were dropped.
    pub fn discard_before(&mut self, recv_next: u32) -> usize {
        let stale: Vec<u32> = self
            .segments
            .keys()
            .copied()
            .filter(|&seqno| seq_lt(seqno, recv_next))
            .collect();
        for seqno in &stale {
            self.take(*seqno);
        }
        stale.len()
    }

    /// Payload bytes currently held.
    pub fn buffered_bytes(&self) -> usize {
        self.buffered
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn contains(&self, seqno: u32) -> bool {
        self.segments.contains_key(&seqno)
    }

    pub fn clear(&mut self) {
        self.segments.clear();
        self.buffered = 0;
    }
}
