//! Per-connection tuning knobs.
//!
//! Windows are configured in **segments** and stored by the connection in
//! **bytes** (`segments × MAX_SEGMENT_DATA_SIZE`).  Every value is checked
//! once, when the connection is created, so a bad configuration never
//! surfaces mid-stream.

use std::time::Duration;

use thiserror::Error;

use crate::segment::MAX_SEGMENT_DATA_SIZE;

/// Default number of retransmissions after which a connection is abandoned.
pub const MAX_RETRANSMITS: u32 = 5;

// Windows larger than this could not be told apart in wrap-around
// sequence space.
const MAX_WINDOW_BYTES: u64 = (u32::MAX / 4) as u64;

/// Adjustable protocol parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Send window, in segments.
    pub send_window: u32,
    /// Receive window, in segments.
    pub recv_window: u32,
    /// Idle time after which an unacknowledged segment is resent.
    pub retransmission_timeout: Duration,
    /// Period at which the driver runs the retransmission sweeper.
    pub timer_interval: Duration,
    /// Retransmissions allowed per segment before the connection is torn down.
    pub max_retransmits: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            send_window: 1,
            recv_window: 1,
            retransmission_timeout: Duration::from_millis(200),
            timer_interval: Duration::from_millis(40),
            max_retransmits: MAX_RETRANSMITS,
        }
    }
}

impl Config {
    /// Reject configurations the protocol cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.send_window == 0 {
            return Err(ConfigError::ZeroWindow("send"));
        }
        if self.recv_window == 0 {
            return Err(ConfigError::ZeroWindow("receive"));
        }
        for (which, segments) in [("send", self.send_window), ("receive", self.recv_window)] {
            if u64::from(segments) * MAX_SEGMENT_DATA_SIZE as u64 > MAX_WINDOW_BYTES {
                return Err(ConfigError::WindowTooLarge { which, segments });
            }
        }
        if self.retransmission_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("retransmission"));
        }
        if self.timer_interval.is_zero() {
            return Err(ConfigError::ZeroTimeout("timer"));
        }
        if self.max_retransmits == 0 {
            return Err(ConfigError::ZeroRetransmits);
        }
        Ok(())
    }

    pub fn send_window_bytes(&self) -> u32 {
        self.send_window * MAX_SEGMENT_DATA_SIZE as u32
    }

    pub fn recv_window_bytes(&self) -> u32 {
        self.recv_window * MAX_SEGMENT_DATA_SIZE as u32
    }
}

/// A configuration rejected at connection creation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} window must be at least one segment")]
    ZeroWindow(&'static str),
    #[error("{which} window of {segments} segments is too large for the sequence space")]
    WindowTooLarge { which: &'static str, segments: u32 },
    #[error("{0} interval must be non-zero")]
    ZeroTimeout(&'static str),
    #[error("at least one retransmission must be allowed")]
    ZeroRetransmits,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let cfg = Config::default();
        assert_eq!(cfg.validate(), Ok(()));
        assert_eq!(cfg.send_window_bytes(), MAX_SEGMENT_DATA_SIZE as u32);
    }

    #[test]
    fn windows_are_stored_in_bytes() {
        let cfg = Config {
            send_window: 4,
            recv_window: 8,
            ..Config::default()
        };
        assert_eq!(cfg.send_window_bytes(), 4 * 1440);
        assert_eq!(cfg.recv_window_bytes(), 8 * 1440);
    }

    #[test]
    fn zero_window_rejected() {
        let cfg = Config {
            send_window: 0,
            ..Config::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroWindow("send")));

        let cfg = Config {
            recv_window: 0,
            ..Config::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroWindow("receive")));
    }

    #[test]
    fn huge_window_rejected() {
        let cfg = Config {
            recv_window: 1_000_000,
            ..Config::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::WindowTooLarge { which: "receive", .. })
        ));
    }

    #[test]
    fn zero_timeouts_and_retries_rejected() {
        let cfg = Config {
            retransmission_timeout: Duration::ZERO,
            ..Config::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroTimeout("retransmission")));

        let cfg = Config {
            max_retransmits: 0,
            ..Config::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroRetransmits));
    }
}
