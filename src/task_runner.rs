//! Periodic Task Runner with Backoff
//!
//! Repeats a background task on a fixed interval. Failures are retried with
//! capped exponential backoff; too many consecutive failures stop the runner
//! with an error instead of letting it run degraded.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Retry configuration for background tasks
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Consecutive failures tolerated before the runner gives up
    pub max_consecutive_failures: u32,
    /// Delay before the first retry
    pub initial_retry_delay: Duration,
    /// Maximum delay between retries
    pub max_retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 5,
            initial_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TaskError {
    #[error("Task '{task}' exceeded maximum consecutive failures ({failures}). Last error: {last_error}")]
    TooManyFailures {
        task: String,
        failures: u32,
        last_error: String,
    },
}

#[derive(Debug)]
struct BackoffState {
    consecutive_failures: u32,
    current_retry_delay: Duration,
}

impl BackoffState {
    fn new(initial_delay: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            current_retry_delay: initial_delay,
        }
    }

    /// Returns the delay to wait before the next attempt.
    fn record_failure(&mut self, max_delay: Duration) -> Duration {
        self.consecutive_failures += 1;
        let delay = self.current_retry_delay;
        self.current_retry_delay = std::cmp::min(self.current_retry_delay * 2, max_delay);
        delay
    }

    fn reset(&mut self, initial_delay: Duration) {
        self.consecutive_failures = 0;
        self.current_retry_delay = initial_delay;
    }
}

/// Run `task_fn` every `interval` until it fails too often.
///
/// # Arguments
/// * `task_name` - Name of the task for logging purposes
/// * `policy` - Retry configuration
/// * `interval` - Pause after each successful run
/// * `task_fn` - Async function that executes one iteration of the task
///
/// # Errors
/// Returns [`TaskError::TooManyFailures`] after `max_consecutive_failures`
/// consecutive failures.
pub async fn run_periodic<F, Fut, E>(
    task_name: &str,
    policy: RetryPolicy,
    interval: Duration,
    mut task_fn: F,
) -> Result<(), TaskError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let mut state = BackoffState::new(policy.initial_retry_delay);

    loop {
        match task_fn().await {
            Ok(()) => {
                if state.consecutive_failures > 0 {
                    warn!(
                        "Task '{}' recovered after {} failures",
                        task_name, state.consecutive_failures
                    );
                }
                state.reset(policy.initial_retry_delay);
                debug!("Task '{}' completed, next run in {:?}", task_name, interval);
                sleep(interval).await;
            }
            Err(e) => {
                let delay = state.record_failure(policy.max_retry_delay);
                error!(
                    "Task '{}' failed (attempt {}/{}): {}",
                    task_name, state.consecutive_failures, policy.max_consecutive_failures, e
                );

                if state.consecutive_failures >= policy.max_consecutive_failures {
                    return Err(TaskError::TooManyFailures {
                        task: task_name.to_string(),
                        failures: state.consecutive_failures,
                        last_error: e.to_string(),
                    });
                }

                warn!("Task '{}' will retry in {:?}", task_name, delay);
                sleep(delay).await;
            }
        }
    }
}
