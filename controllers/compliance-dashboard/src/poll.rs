//! Bounded convergence polling.
//!
//! Every wait on asynchronous cluster state (CSV phase, pod readiness, bundle
//! validity, namespace deletion, pool rollout) goes through [`poll_until`],
//! which owns the attempt bound and observes cancellation while sleeping.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Interval and attempt bound for one convergence wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    /// Sleep one interval before the first attempt
    pub initial_delay: bool,
}

impl PollPolicy {
    #[must_use]
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            initial_delay: false,
        }
    }

    #[must_use]
    pub const fn with_initial_delay(mut self) -> Self {
        self.initial_delay = true;
        self
    }

    /// Upper bound on wall time spent sleeping
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// Result of one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    Ready(T),
    /// Not there yet; the reason is kept for the exhaustion message
    Pending(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("condition not met after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("cancelled while waiting")]
    Cancelled,
}

/// Sleeps for `duration` unless `cancel` fires first. Returns false when cancelled.
pub async fn sleep_unless_cancelled(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}

/// Polls until it reports ready, the attempt bound is hit, or `cancel` fires.
pub async fn poll_until<T, F, Fut>(policy: PollPolicy, cancel: &CancellationToken, mut check: F) -> Result<T, PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    if policy.initial_delay && !sleep_unless_cancelled(policy.interval, cancel).await {
        return Err(PollError::Cancelled);
    }

    let mut last = String::from("no attempts made");
    for attempt in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }
        match check().await {
            Attempt::Ready(value) => return Ok(value),
            Attempt::Pending(reason) => {
                debug!(attempt, max_attempts = policy.max_attempts, %reason, "Condition not met yet");
                last = reason;
            }
        }
        if attempt < policy.max_attempts && !sleep_unless_cancelled(policy.interval, cancel).await {
            return Err(PollError::Cancelled);
        }
    }

    Err(PollError::Exhausted {
        attempts: policy.max_attempts,
        last,
    })
}
