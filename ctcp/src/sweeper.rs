//! Periodic retransmission sweep over every live connection.
//!
//! The driver calls [`sweep`] once per timer tick.  Each connection resends
//! whatever has timed out; connections whose oldest segment has run out of
//! retransmissions are collected during the pass and destroyed only after it
//! completes, so the registry never changes shape mid-traversal.

use std::time::Instant;

use crate::connection::ConnError;
use crate::endpoint::Endpoint;
use crate::registry::{ConnId, Registry};

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Segments retransmitted across all connections.
    pub retransmitted: usize,
    /// Connections destroyed because a segment exhausted its retries.
    pub destroyed: Vec<ConnId>,
}

/// Retransmit expired segments on every connection in `registry`.
pub fn sweep<E: Endpoint>(registry: &mut Registry<E>, now: Instant) -> SweepReport {
    let mut report = SweepReport::default();
    let mut doomed: Vec<(ConnId, ConnError)> = Vec::new();

    registry.for_each(|id, conn| {
        // Counted from the connection so a fatal tick's resends are included.
        let before = conn.retransmissions();
        let outcome = conn.on_timer(now);
        report.retransmitted += (conn.retransmissions() - before) as usize;
        if let Err(e) = outcome {
            doomed.push((id, e));
        }
    });

    for (id, err) in doomed {
        if registry.destroy(id, Err(err)) {
            report.destroyed.push(id);
        }
    }
    report
}
