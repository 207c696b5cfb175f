//! Bounded retry with exponential backoff.
//!
//! Expected transient failures travel as [`AttemptOutcome`] values
//! rather than errors-as-control-flow: a single attempt reports whether
//! it succeeded, should be retried, or has failed for good, and the
//! orchestrator decides what happens next.

use crate::config::RetrySettings;
use crate::error::{RelayError, Result};
use crate::logging::SharedLogger;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            backoff_factor: settings.backoff_factor,
        }
    }

    #[must_use]
    pub fn backoff(&self) -> Backoff {
        Backoff {
            delay: self.initial_delay,
            factor: self.backoff_factor,
        }
    }
}

/// Compounding delay between attempts. The delay grows after every wait
/// and is never reset within one logical request.
#[derive(Debug)]
pub struct Backoff {
    delay: Duration,
    factor: f64,
}

impl Backoff {
    #[must_use]
    pub fn current(&self) -> Duration {
        self.delay
    }

    /// Suspend the task for the current delay, then compound it.
    pub async fn wait(&mut self) {
        tokio::time::sleep(self.delay).await;
        self.delay = self.delay.mul_f64(self.factor);
    }
}

/// Outcome of one full attempt against the upstream.
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Success(T),
    Retry(RelayError),
    Fatal(RelayError),
}

impl<T> AttemptOutcome<T> {
    /// Fold an error into an outcome using its retryability class.
    #[must_use]
    pub fn from_error(err: RelayError) -> Self {
        if err.is_retryable() {
            Self::Retry(err)
        } else {
            Self::Fatal(err)
        }
    }
}

/// Drive `op` until it succeeds, fails terminally, or the attempt budget
/// runs out. `op` receives the 1-based attempt number.
pub async fn run_with_retry<T, F, Fut>(
    policy: RetryPolicy,
    logger: &SharedLogger,
    component: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AttemptOutcome<T>>,
{
    let mut backoff = policy.backoff();
    let mut last_err = RelayError::other("retry budget was zero");

    for attempt in 1..=policy.max_attempts {
        match op(attempt).await {
            AttemptOutcome::Success(value) => return Ok(value),
            AttemptOutcome::Fatal(err) => {
                logger.error(
                    component,
                    format!("Attempt {attempt}/{} failed terminally: {err}", policy.max_attempts),
                );
                return Err(err);
            }
            AttemptOutcome::Retry(err) => {
                logger.warn(
                    component,
                    format!("Attempt {attempt}/{} failed: {err}", policy.max_attempts),
                );
                last_err = err;
                if attempt < policy.max_attempts {
                    logger.info(
                        component,
                        format!("Retrying in {:?}", backoff.current()),
                    );
                    backoff.wait().await;
                }
            }
        }
    }

    logger.error(
        component,
        format!("All {} attempts failed: {last_err}", policy.max_attempts),
    );
    Err(last_err)
}
