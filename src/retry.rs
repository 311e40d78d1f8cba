//! Busy-status retry around CDR submissions
//!
//! Only `429` is retried. The wait before each retry is whatever the service
//! asked for in `Retry-After`, or a fixed fallback when it did not say.

use crate::error::{CdrError, Result};
use crate::types::HttpOutcome;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retries allowed after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Wait used when a 429 carries no `Retry-After`
pub const DEFAULT_FALLBACK_DELAY: Duration = Duration::from_secs(10);

/// Retry contract for one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    fallback_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_FALLBACK_DELAY)
    }
}

/// Attempt bookkeeping for a single submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempts_made: u32,
    max_retries: u32,
}

impl RetryState {
    fn new(max_retries: u32) -> Self {
        Self {
            attempts_made: 0,
            max_retries,
        }
    }

    /// Attempts sent so far, including the first
    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    /// Retries sent so far
    pub fn retries_made(&self) -> u32 {
        self.attempts_made.saturating_sub(1)
    }

    /// Retries still available
    pub fn retries_remaining(&self) -> u32 {
        self.max_retries.saturating_sub(self.retries_made())
    }
}

/// Terminal outcome of a retried submission
///
/// `state` is kept on the error path too, so callers can report how many
/// requests went out before a transport failure or cancellation.
#[derive(Debug)]
pub struct RetryRun {
    pub outcome: Result<HttpOutcome>,
    pub state: RetryState,
}

impl RetryPolicy {
    /// Create a policy with `max_retries` retries after the first attempt
    pub fn new(max_retries: u32, fallback_delay: Duration) -> Self {
        Self {
            max_retries,
            fallback_delay,
        }
    }

    /// Retries allowed after the first attempt
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Wait used when a 429 carries no `Retry-After`
    pub fn fallback_delay(&self) -> Duration {
        self.fallback_delay
    }

    /// Whether `outcome` should be sent again given what was already spent
    pub fn should_retry(&self, outcome: &HttpOutcome, state: &RetryState) -> bool {
        outcome.is_busy() && state.retries_remaining() > 0
    }

    /// Wait before retrying after `outcome`
    pub fn delay_for(&self, outcome: &HttpOutcome) -> Duration {
        outcome.retry_after.unwrap_or(self.fallback_delay)
    }

    /// Run `attempt` until it returns a non-429 status or retries run out
    ///
    /// Errors from `attempt` end the run immediately and are never retried.
    /// The cancellation token aborts both an in-flight attempt and the wait.
    pub async fn execute<F, Fut>(&self, mut attempt: F, cancel: &CancellationToken) -> RetryRun
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<HttpOutcome>>,
    {
        let mut state = RetryState::new(self.max_retries);
        let finish = |outcome: Result<HttpOutcome>, state: RetryState| RetryRun { outcome, state };

        loop {
            state.attempts_made += 1;

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return finish(Err(CdrError::Cancelled("CDR submission".to_string())), state);
                }
                outcome = attempt() => outcome,
            };
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => return finish(Err(e), state),
            };

            if !self.should_retry(&outcome, &state) {
                if outcome.is_busy() {
                    tracing::warn!(
                        attempts = state.attempts_made,
                        "CDR service still busy, giving up"
                    );
                }
                return finish(Ok(outcome), state);
            }

            let delay = self.delay_for(&outcome);
            tracing::warn!(
                retry = state.attempts_made,
                delay_secs = delay.as_secs_f64(),
                server_directed = outcome.retry_after.is_some(),
                "CDR service returned busy status - retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return finish(Err(CdrError::Cancelled("CDR retry wait".to_string())), state);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
