//! Connection close-state machine.
//!
//! There is no handshake, so a connection is born `Established`.  The only
//! transitions are the two independent FINs: ours (sent by the sender path
//! when the application input ends) and the peer's (accepted in order by the
//! receiver path).  Teardown for any reason moves to `Closed`.
//!
//! ```text
//!                   local FIN sent
//!   ESTABLISHED ───────────────────▶ FIN_SENT
//!        │                               │
//!        │ peer FIN                      │ peer FIN
//!        ▼                               ▼
//!   CLOSE_WAIT ────────────────────▶ CLOSING ──local FIN acked──▶ (destroyed)
//!                   local FIN sent
//! ```

/// All possible states of the connection FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Both directions open.
    #[default]
    Established,
    /// Our FIN has been sent (half-closed); the peer may still send data.
    FinSent,
    /// The peer's FIN has been received; we may still send data.
    CloseWait,
    /// Both FINs exchanged; waiting for ours to be acknowledged.
    Closing,
    /// Torn down; no further events are processed.
    Closed,
}

impl ConnectionState {
    /// Transition taken when the sender path emits our FIN.
    pub fn on_local_fin(self) -> Self {
        match self {
            Self::Established => Self::FinSent,
            Self::CloseWait => Self::Closing,
            other => other,
        }
    }

    /// Transition taken when the peer's FIN is accepted in order.
    pub fn on_peer_fin(self) -> Self {
        match self {
            Self::Established => Self::CloseWait,
            Self::FinSent => Self::Closing,
            other => other,
        }
    }

    /// The peer's FIN has been received.
    pub fn peer_closed(self) -> bool {
        matches!(self, Self::CloseWait | Self::Closing)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Established => "ESTABLISHED",
            Self::FinSent => "FIN_SENT",
            Self::CloseWait => "CLOSE_WAIT",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_then_peer_fin() {
        let s = ConnectionState::default().on_local_fin();
        assert_eq!(s, ConnectionState::FinSent);
        assert!(!s.peer_closed());
        let s = s.on_peer_fin();
        assert_eq!(s, ConnectionState::Closing);
        assert!(s.peer_closed());
    }

    #[test]
    fn peer_then_local_fin() {
        let s = ConnectionState::Established.on_peer_fin();
        assert_eq!(s, ConnectionState::CloseWait);
        assert_eq!(s.on_local_fin(), ConnectionState::Closing);
    }

    #[test]
    fn closed_is_terminal() {
        let s = ConnectionState::Closed;
        assert_eq!(s.on_local_fin(), ConnectionState::Closed);
        assert_eq!(s.on_peer_fin(), ConnectionState::Closed);
        assert_eq!(s.to_string(), "CLOSED");
    }
}
