//! Wire-format definitions for cTCP segments.
//!
//! Every datagram exchanged between peers carries exactly one [`Segment`].
//! This module is responsible for:
//! - Defining the on-wire binary layout (header fields, flags, payload).
//! - Serialising a [`Segment`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Segment`], returning errors
//!   for malformed, truncated or corrupted input.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                    Acknowledgment Number                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |         Total Length          |     Flags     |    Window     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Window     |           Checksum            |  Payload ...  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 15 bytes.
//! seq(4) + ack(4) + length(2) + flags(1) + window(2) + checksum(2)

use thiserror::Error;

/// Bit-flag constants for the `flags` header field.
pub mod flags {
    /// Acknowledgement field is valid.
    pub const ACK: u8 = 0b0000_0001;
    /// Finish: the sender has no more data to send.
    pub const FIN: u8 = 0b0000_0010;
}

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 15;

/// Largest payload a single segment may carry.
pub const MAX_SEGMENT_DATA_SIZE: usize = 1440;

/// Largest datagram a well-formed segment can occupy.
pub const MAX_SEGMENT_LEN: usize = HEADER_LEN + MAX_SEGMENT_DATA_SIZE;

// Byte offsets of each field within the serialised header.
const OFF_SEQ: usize = 0;
const OFF_ACK: usize = 4;
const OFF_LEN: usize = 8;
const OFF_FLAGS: usize = 10;
const OFF_WINDOW: usize = 11;
const OFF_CHECKSUM: usize = 13;

/// A complete cTCP datagram: header fields + payload bytes.
///
/// The `length` and `checksum` wire fields are not stored: [`Segment::encode`]
/// derives them from the payload and [`Segment::decode`] verifies them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Segment {
    /// Stream offset of the first payload byte (or of the FIN).
    pub seqno: u32,
    /// Cumulative acknowledgement; meaningful only when [`flags::ACK`] is set.
    pub ackno: u32,
    /// Bitmask of [`flags`] constants.
    pub flags: u8,
    /// Free receive-buffer space advertised by the sender of this segment.
    pub window: u16,
    pub payload: Vec<u8>,
}

impl Segment {
    /// A data segment carrying `payload` at `seqno`, piggybacking an ACK.
    pub fn data(seqno: u32, ackno: u32, window: u16, payload: Vec<u8>) -> Self {
        Self {
            seqno,
            ackno,
            flags: flags::ACK,
            window,
            payload,
        }
    }

    /// A pure cumulative acknowledgement.
    pub fn ack(seqno: u32, ackno: u32, window: u16) -> Self {
        Self {
            seqno,
            ackno,
            flags: flags::ACK,
            window,
            payload: Vec::new(),
        }
    }

    /// A zero-payload FIN at `seqno`.
    pub fn fin(seqno: u32, ackno: u32, window: u16) -> Self {
        Self {
            seqno,
            ackno,
            flags: flags::FIN | flags::ACK,
            window,
            payload: Vec::new(),
        }
    }

    pub fn is_ack(&self) -> bool {
        self.flags & flags::ACK != 0
    }

    pub fn is_fin(&self) -> bool {
        self.flags & flags::FIN != 0
    }

    /// Size of the segment on the wire, header included.
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Sequence space consumed by this segment: payload bytes, plus one for FIN.
    pub fn seq_len(&self) -> u32 {
        self.payload.len() as u32 + u32::from(self.is_fin())
    }

    /// First sequence number after this segment.
    pub fn end(&self) -> u32 {
        self.seqno.wrapping_add(self.seq_len())
    }

    /// Serialise this segment into a newly allocated byte vector.
    ///
    /// The length and checksum fields are computed last, from the bytes
    /// actually written.  A payload over [`MAX_SEGMENT_DATA_SIZE`] is
    /// rejected with [`SegmentError::PayloadTooLarge`].
    pub fn encode(&self) -> Result<Vec<u8>, SegmentError> {
        if self.payload.len() > MAX_SEGMENT_DATA_SIZE {
            return Err(SegmentError::PayloadTooLarge {
                len: self.payload.len(),
            });
        }
        let total = self.wire_len();
        let mut buf = vec![0u8; total];

        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.seqno.to_be_bytes());
        buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&self.ackno.to_be_bytes());
        buf[OFF_LEN..OFF_LEN + 2].copy_from_slice(&(total as u16).to_be_bytes());
        buf[OFF_FLAGS] = self.flags;
        buf[OFF_WINDOW..OFF_WINDOW + 2].copy_from_slice(&self.window.to_be_bytes());
        buf[HEADER_LEN..].copy_from_slice(&self.payload);

        // Checksum field is still zero here.
        let csum = internet_checksum(&buf);
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&csum.to_be_bytes());

        Ok(buf)
    }

    /// Parse a [`Segment`] from one received datagram.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`HEADER_LEN`],
    /// - the length field disagrees with `buf.len()`,
    /// - the payload exceeds [`MAX_SEGMENT_DATA_SIZE`], or
    /// - the checksum does not verify.
    pub fn decode(buf: &[u8]) -> Result<Self, SegmentError> {
        if buf.len() < HEADER_LEN {
            return Err(SegmentError::Truncated { len: buf.len() });
        }

        let length = usize::from(read_u16(buf, OFF_LEN));
        if length != buf.len() {
            return Err(SegmentError::LengthMismatch {
                declared: length,
                actual: buf.len(),
            });
        }
        if length - HEADER_LEN > MAX_SEGMENT_DATA_SIZE {
            return Err(SegmentError::PayloadTooLarge {
                len: length - HEADER_LEN,
            });
        }

        // Verify checksum: zero the stored field, recompute, compare.
        let stored = read_u16(buf, OFF_CHECKSUM);
        let mut scratch = buf.to_vec();
        scratch[OFF_CHECKSUM..OFF_CHECKSUM + 2].fill(0);
        let computed = internet_checksum(&scratch);
        if computed != stored {
            return Err(SegmentError::Checksum { stored, computed });
        }

        Ok(Segment {
            seqno: read_u32(buf, OFF_SEQ),
            ackno: read_u32(buf, OFF_ACK),
            flags: buf[OFF_FLAGS],
            window: read_u16(buf, OFF_WINDOW),
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

/// Reasons a datagram is not a valid segment.
///
/// The receive path treats every variant as loss.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SegmentError {
    #[error("datagram of {len} bytes is shorter than the {HEADER_LEN}-byte header")]
    Truncated { len: usize },
    #[error("length field says {declared} bytes but datagram has {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("payload of {len} bytes exceeds the {MAX_SEGMENT_DATA_SIZE}-byte limit")]
    PayloadTooLarge { len: usize },
    #[error("checksum mismatch: stored {stored:#06x}, computed {computed:#06x}")]
    Checksum { stored: u16, computed: u16 },
}

fn read_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([buf[off], buf[off + 1]])
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// Compute the Internet checksum (RFC 1071) over `data`.
///
/// Sum consecutive 16-bit big-endian words, fold the carry, return the
/// one's-complement.  The caller must zero any checksum field within `data`
/// before calling this function.
fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut words = data.chunks_exact(2);

    for w in &mut words {
        sum += u32::from(u16::from_be_bytes([w[0], w[1]]));
    }
    // Odd trailing byte: pad with a zero byte on the right.
    if let [last] = words.remainder() {
        sum += u32::from(*last) << 8;
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    !(sum as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_segment(seqno: u32, ackno: u32, flags: u8, window: u16, payload: &[u8]) -> Segment {
        Segment {
            seqno,
            ackno,
            flags,
            window,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let seg = make_segment(42, 7, flags::ACK, 4096, b"hello");
        assert_eq!(Segment::decode(&seg.encode().unwrap()).unwrap(), seg);
    }

    #[test]
    fn fin_and_max_payload_roundtrip() {
        let fin = Segment::fin(9, 3, 1440);
        assert_eq!(Segment::decode(&fin.encode().unwrap()).unwrap(), fin);

        let full = make_segment(1, 0, flags::ACK, 0, &[0xab; MAX_SEGMENT_DATA_SIZE]);
        let bytes = full.encode().unwrap();
        assert_eq!(bytes.len(), MAX_SEGMENT_LEN);
        assert_eq!(Segment::decode(&bytes).unwrap(), full);
    }

    #[test]
    fn encode_rejects_oversize_payload() {
        let seg = make_segment(1, 0, flags::ACK, 0, &[0u8; MAX_SEGMENT_DATA_SIZE + 1]);
        assert_eq!(
            seg.encode(),
            Err(SegmentError::PayloadTooLarge {
                len: MAX_SEGMENT_DATA_SIZE + 1
            })
        );
    }

    #[test]
    fn encode_sets_total_length() {
        let bytes = make_segment(1, 2, flags::ACK, 8192, b"world").encode().unwrap();
        assert_eq!(read_u16(&bytes, OFF_LEN) as usize, HEADER_LEN + 5);
    }

    #[test]
    fn decode_empty_buffer_returns_error() {
        assert_eq!(Segment::decode(&[]), Err(SegmentError::Truncated { len: 0 }));
    }

    #[test]
    fn decode_short_header_returns_error() {
        assert_eq!(
            Segment::decode(&[0u8; HEADER_LEN - 1]),
            Err(SegmentError::Truncated { len: HEADER_LEN - 1 })
        );
    }

    #[test]
    fn decode_truncated_payload_returns_error() {
        let mut bytes = make_segment(1, 0, 0, 0, b"data").encode().unwrap();
        bytes.pop();
        assert_eq!(
            Segment::decode(&bytes),
            Err(SegmentError::LengthMismatch {
                declared: HEADER_LEN + 4,
                actual: HEADER_LEN + 3
            })
        );
    }

    #[test]
    fn decode_oversized_payload_returns_error() {
        let mut bytes = vec![0u8; MAX_SEGMENT_LEN + 1];
        bytes[OFF_LEN..OFF_LEN + 2].copy_from_slice(&((MAX_SEGMENT_LEN + 1) as u16).to_be_bytes());
        assert_eq!(
            Segment::decode(&bytes),
            Err(SegmentError::PayloadTooLarge {
                len: MAX_SEGMENT_DATA_SIZE + 1
            })
        );
    }

    #[test]
    fn decode_corrupt_byte_returns_checksum_error() {
        let mut bytes = make_segment(99, 0, flags::ACK, 1024, b"test").encode().unwrap();
        bytes[0] ^= 0xff;
        assert!(matches!(
            Segment::decode(&bytes),
            Err(SegmentError::Checksum { .. })
        ));
    }

    #[test]
    fn every_single_bit_flip_is_rejected() {
        // Odd payload length exercises the padded trailing byte.
        let bytes = make_segment(0x0102_0304, 77, flags::ACK | flags::FIN, 512, b"abcdefg").encode().unwrap();
        for bit in 0..bytes.len() * 8 {
            let mut flipped = bytes.clone();
            flipped[bit / 8] ^= 1 << (bit % 8);
            assert!(Segment::decode(&flipped).is_err(), "bit {bit} flip accepted");
        }
    }

    #[test]
    fn header_layout_is_big_endian() {
        let bytes = make_segment(0x0102_0304, 0x0506_0708, flags::FIN, 0x0a0b, b"").encode().unwrap();
        assert_eq!(&bytes[OFF_SEQ..OFF_SEQ + 4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[OFF_ACK..OFF_ACK + 4], &[0x05, 0x06, 0x07, 0x08]);
        assert_eq!(&bytes[OFF_LEN..OFF_LEN + 2], &[0x00, HEADER_LEN as u8]);
        assert_eq!(bytes[OFF_FLAGS], flags::FIN);
        assert_eq!(&bytes[OFF_WINDOW..OFF_WINDOW + 2], &[0x0a, 0x0b]);
    }

    #[test]
    fn checksum_matches_reference_value() {
        // Header words summed by hand: 0x0000 0x0001 0x0000 0x0000 0x000f
        // 0x0100 0x0000 0x0000 -> 0x0110, complement 0xfeef.
        let bytes = make_segment(1, 0, flags::ACK, 0, b"").encode().unwrap();
        assert_eq!(read_u16(&bytes, OFF_CHECKSUM), 0xfeef);
    }

    #[test]
    fn seq_len_counts_fin() {
        assert_eq!(make_segment(10, 0, flags::ACK, 0, b"abc").seq_len(), 3);
        assert_eq!(Segment::fin(10, 0, 0).seq_len(), 1);
        assert_eq!(Segment::fin(10, 0, 0).end(), 11);
        assert_eq!(Segment::ack(10, 4, 0).seq_len(), 0);
    }
}
