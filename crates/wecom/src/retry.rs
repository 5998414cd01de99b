// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded retry with capped exponential backoff.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{code_of, Cancelled, Error, Result};

/// Backoff schedule: `min(initial * 2^attempt, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    initial: Duration,
    max: Duration,
}

impl RetryPolicy {
    pub fn new(initial: Duration, max: Duration) -> Result<Self> {
        if initial > max {
            return Err(Error::config(format!(
                "initial backoff {initial:?} exceeds max backoff {max:?}"
            )));
        }
        Ok(Self { initial, max })
    }

    /// Delay after the 0-indexed `attempt` fails.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial.checked_mul(factor).map_or(self.max, |d| d.min(self.max))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { initial: Duration::from_secs(1), max: Duration::from_secs(30) }
    }
}

/// Runs an operation up to `max_retries + 1` times.
///
/// Each call to [`RetryExecutor::run`] is independent; the executor holds no
/// state between calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryExecutor {
    max_retries: u32,
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(max_retries: u32, policy: RetryPolicy) -> Self {
        Self { max_retries, policy }
    }

    /// Run `op` until it succeeds, fails terminally, exhausts its attempts,
    /// or `cancel` fires during a backoff wait.
    ///
    /// `op` receives the 0-indexed attempt number. `retriable` decides whether
    /// a failure may be retried. Log events carry the remote code found in
    /// the error's source chain, if any. Cancellation during a wait returns the
    /// cancellation error and discards the operation's error.
    pub async fn run<T, E, F, Fut, C>(
        &self,
        cancel: &CancellationToken,
        retriable: C,
        mut op: F,
    ) -> std::result::Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        C: Fn(&E) -> bool,
        E: From<Cancelled> + std::error::Error + 'static,
    {
        let mut attempt = 0;
        loop {
            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            let code = code_of(&err);
            if !retriable(&err) {
                tracing::debug!(attempt, code = ?code, err = %err, "terminal error, not retrying");
                return Err(err);
            }
            if attempt >= self.max_retries {
                tracing::warn!(attempt, code = ?code, err = %err, "retries exhausted");
                return Err(err);
            }

            let delay = self.policy.backoff(attempt);
            tracing::debug!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                code = ?code,
                err = %err,
                "retriable error, backing off"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(attempt, "retry wait cancelled");
                    return Err(Cancelled.into());
                }
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

/// The default classifier: retry only classified remote codes.
pub fn is_retriable(err: &Error) -> bool {
    err.is_retriable()
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
