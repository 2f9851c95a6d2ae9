//! `ctcp`: a reliable, ordered byte stream over an unreliable datagram
//! channel.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐   segments   ┌──────────┐
//!  │  Sender  │─────────────▶│ Receiver │
//!  └────┬─────┘              └─────┬────┘
//!       │        ACKs              │
//!       │◀─────────────────────────┘
//!       │
//!  ┌────▼──────────────────────────────┐      ┌──────────┐
//!  │           Connection              │◀─────│ Sweeper  │ timer tick
//!  │  (sender + receiver + close FSM)  │      └────┬─────┘
//!  └────┬──────────────────────────────┘           │
//!       │ owned by                                 │
//!  ┌────▼──────┐◀──────────────────────────────────┘
//!  │ Registry  │
//!  └────┬──────┘
//!       │ Endpoint traits (datagrams, app input, app output)
//!  ┌────▼──────┐
//!  │  Driver   │  (tokio UdpSocket, or MemoryEndpoint in tests)
//!  └───────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`segment`]: wire format and checksum
//! - [`seq`]: wrap-around sequence-number arithmetic
//! - [`config`]: tuning knobs and their validation
//! - [`endpoint`]: collaborator traits and an in-memory endpoint
//! - [`retransmit`]: per-segment in-flight bookkeeping
//! - [`reassembly`]: out-of-order payload buffer
//! - [`sender`]: send-side sliding window
//! - [`receiver`]: in-order delivery and FIN acceptance
//! - [`state`]: close-state machine
//! - [`connection`]: per-connection composition of the above
//! - [`registry`]: owner of live connections
//! - [`sweeper`]: periodic retransmission and retry enforcement
//! - [`simulator`]: seeded lossy/reordering link for tests
//! - [`driver`]: tokio UDP event loop

pub mod config;
pub mod connection;
pub mod driver;
pub mod endpoint;
pub mod reassembly;
pub mod receiver;
pub mod registry;
pub mod retransmit;
pub mod segment;
pub mod sender;
pub mod seq;
pub mod simulator;
pub mod state;
pub mod sweeper;

pub use config::{Config, ConfigError};
pub use connection::{ConnError, Connection, Disposition};
pub use endpoint::{ByteSink, ByteSource, DatagramSink, Endpoint, MemoryEndpoint, Read};
pub use registry::{ConnId, Registry};
pub use segment::{Segment, SegmentError, MAX_SEGMENT_DATA_SIZE};
pub use sweeper::{sweep, SweepReport};
