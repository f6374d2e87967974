//! Retry with a fixed backoff schedule.
//!
//! Auto-saves are retried on a fixed schedule rather than an exponential
//! one: attempt 0 runs immediately, then one retry after each configured
//! delay. With the default schedule a save gets six attempts over roughly
//! 37.5 seconds.

use crate::config::DEFAULT_RETRY_DELAYS_MS;
use crate::error::{SyncError, SyncResult};
use crate::shutdown::Shutdown;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// How a retried operation ended.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// An attempt succeeded.
    Succeeded {
        /// The operation's result.
        value: T,
        /// Attempts made, including the successful one.
        attempts: usize,
    },
    /// Every attempt failed.
    Exhausted {
        /// The final attempt's error.
        error: SyncError,
        /// Attempts made.
        attempts: usize,
    },
    /// Shutdown fired or the gate refused before the next attempt.
    Interrupted {
        /// Attempts made before stopping.
        attempts: usize,
        /// The error of the last attempt made.
        last_error: Option<SyncError>,
    },
}

impl<T> RetryOutcome<T> {
    /// Returns the number of attempts made.
    pub fn attempts(&self) -> usize {
        match self {
            Self::Succeeded { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Interrupted { attempts, .. } => *attempts,
        }
    }
}

/// Fixed-schedule retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl RetryPolicy {
    /// Creates a policy that waits `delays[i]` before retry `i + 1`.
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// A policy with a single attempt.
    pub fn no_retry() -> Self {
        Self { delays: Vec::new() }
    }

    /// Returns the maximum number of attempts.
    pub fn max_attempts(&self) -> usize {
        self.delays.len() + 1
    }

    /// Returns the delay before `attempt` (0-indexed); zero for the first.
    pub fn delay_before(&self, attempt: usize) -> Duration {
        match attempt {
            0 => Duration::ZERO,
            n => self.delays.get(n - 1).copied().unwrap_or(Duration::ZERO),
        }
    }

    /// Runs `operation` until it succeeds or the schedule is exhausted.
    ///
    /// Before every retry the policy waits out the delay, then asks `gate`
    /// whether retrying still makes sense. A shutdown during the delay or a
    /// refusing gate ends the run with [`RetryOutcome::Interrupted`].
    pub async fn run<T, Op, OpFut, Gate, GateFut>(
        &self,
        label: &str,
        shutdown: &mut Shutdown,
        mut gate: Gate,
        mut operation: Op,
    ) -> RetryOutcome<T>
    where
        Op: FnMut(usize) -> OpFut,
        OpFut: Future<Output = SyncResult<T>>,
        Gate: FnMut() -> GateFut,
        GateFut: Future<Output = bool>,
    {
        let max_attempts = self.max_attempts();
        let mut last_error = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = self.delay_before(attempt);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.triggered() => {
                        info!("Retry of '{}' cancelled by shutdown", label);
                        return RetryOutcome::Interrupted { attempts: attempt, last_error };
                    }
                }
                if !gate().await {
                    info!("Retry of '{}' no longer wanted, stopping", label);
                    return RetryOutcome::Interrupted { attempts: attempt, last_error };
                }
            }

            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        info!("'{}' succeeded after {} retries", label, attempt);
                    }
                    return RetryOutcome::Succeeded {
                        value,
                        attempts: attempt + 1,
                    };
                }
                Err(err) => {
                    let attempts = attempt + 1;
                    if attempts >= max_attempts {
                        warn!("'{}' failed after {} attempts: {}", label, attempts, err);
                        return RetryOutcome::Exhausted { error: err, attempts };
                    }
                    warn!(
                        "'{}' failed (attempt {}/{}): {}. Retrying in {:?}",
                        label,
                        attempts,
                        max_attempts,
                        err,
                        self.delay_before(attempts)
                    );
                    last_error = Some(err);
                }
            }
        }

        // max_attempts is at least 1, so the loop always returns
        RetryOutcome::Interrupted {
            attempts: max_attempts,
            last_error,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_RETRY_DELAYS_MS
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
        )
    }
}
