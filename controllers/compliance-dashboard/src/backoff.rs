//! # Watch Backoff
//!
//! Reconnect delay for watch subscriptions.
//!
//! Ordinary open failures back off exponentially: 1s, 2s, 4s ... capped at
//! 60s, and reset to 1s after any successful open. A resource kind the API
//! server does not recognize (operator not installed yet) will not come back
//! until an install finishes, so it always waits the fixed long interval and
//! leaves the exponential sequence untouched. A watch the server closes
//! cleanly is reopened after the base interval.

use std::time::Duration;

pub const BASE_DELAY: Duration = Duration::from_secs(1);
pub const MAX_DELAY: Duration = Duration::from_secs(60);
pub const NOT_RECOGNIZED_DELAY: Duration = Duration::from_secs(60);

/// Why the last open attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    NotRecognized,
    Other,
}

/// Exponential backoff calculator with a fixed lane for unrecognized kinds
#[derive(Debug, Clone)]
pub struct WatchBackoff {
    base: Duration,
    max: Duration,
    not_recognized: Duration,
    /// Delay handed out on the next ordinary failure
    current: Duration,
}

impl Default for WatchBackoff {
    fn default() -> Self {
        Self::new(BASE_DELAY, MAX_DELAY, NOT_RECOGNIZED_DELAY)
    }
}

impl WatchBackoff {
    #[must_use]
    pub fn new(base: Duration, max: Duration, not_recognized: Duration) -> Self {
        Self {
            base,
            max,
            not_recognized,
            current: base,
        }
    }

    /// Delay before the next attempt, advancing the sequence for ordinary failures
    pub fn next_delay(&mut self, failure: FailureKind) -> Duration {
        match failure {
            FailureKind::NotRecognized => self.not_recognized,
            FailureKind::Other => {
                let delay = self.current;
                self.current = std::cmp::min(self.current.saturating_mul(2), self.max);
                delay
            }
        }
    }

    /// Pause before reopening a watch the server closed cleanly
    #[must_use]
    pub fn reopen_delay(&self) -> Duration {
        self.base
    }

    /// Back to the base interval after a successful open
    pub fn reset(&mut self) {
        self.current = self.base;
    }
}
