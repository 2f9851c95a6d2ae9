//! Wrap-around comparisons for 32-bit sequence numbers.
//!
//! Two sequence numbers are comparable as long as they are less than
//! `u32::MAX / 2` apart, which always holds for a window-bounded stream.

/// Initial sequence number of every stream (1-based numbering).
pub const INITIAL_SEQNO: u32 = 1;

/// `a ≤ b` in wrap-around space.
#[inline]
pub fn seq_le(a: u32, b: u32) -> bool {
    b.wrapping_sub(a) <= (u32::MAX / 2)
}

/// `a < b` in wrap-around space.
#[inline]
pub fn seq_lt(a: u32, b: u32) -> bool {
    a != b && seq_le(a, b)
}

/// Distance from `from` forward to `to`; zero when `to` is behind `from`.
#[inline]
pub fn seq_distance(from: u32, to: u32) -> u32 {
    if seq_le(from, to) {
        to.wrapping_sub(from)
    } else {
        0
    }
}
