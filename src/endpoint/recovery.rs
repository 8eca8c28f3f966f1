//! Retry and recovery utilities
//!
//! The single retry policy in the system: a bounded retry with a configurable
//! delay schedule. Transient transport failures are retried; policy and
//! contract errors fail fast (see [`EndpointError::is_recoverable`]).
//!
//! Directory resolution uses a bounded linear schedule: 12s, 21s, 30s across
//! three attempts, then the lookup is reported as failed.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::error::{EndpointError, EndpointResult};

/// Delay growth strategy between attempts
#[derive(Debug, Clone, Copy)]
pub enum Backoff {
    /// Multiply the delay after each failure
    Exponential {
        /// Growth factor
        multiplier: f64,
    },
    /// Add a fixed increment after each failure
    Linear {
        /// Added to the delay after each failure
        increment: Duration,
    },
}

/// Configuration for retry behavior
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use softphone_core::endpoint::recovery::RetryConfig;
///
/// let config = RetryConfig::directory();
/// assert_eq!(config.max_attempts, 3);
/// assert_eq!(config.initial_delay, Duration::from_secs(12));
///
/// // The directory schedule grows linearly: 12s, 21s, 30s
/// let second = config.delay_after(config.initial_delay);
/// assert_eq!(second, Duration::from_secs(21));
/// assert_eq!(config.delay_after(second), Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound on any delay
    pub max_delay: Duration,
    /// How the delay grows between attempts
    pub backoff: Backoff,
    /// Whether to add jitter to delays
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff: Backoff::Exponential { multiplier: 2.0 },
            use_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Quick retries for short signaling commands
    pub fn quick() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            backoff: Backoff::Exponential { multiplier: 1.5 },
            use_jitter: true,
        }
    }

    /// Bounded linear schedule for directory lookups
    ///
    /// Three attempts with delays of 12s, then 21s, then 30s before the
    /// lookup is reported as timed out. No jitter; the schedule is part of
    /// the observable contract.
    pub fn directory() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(12),
            max_delay: Duration::from_secs(30),
            backoff: Backoff::Linear {
                increment: Duration::from_secs(9),
            },
            use_jitter: false,
        }
    }

    /// The delay following `current` under this configuration's schedule
    pub fn delay_after(&self, current: Duration) -> Duration {
        let next = match self.backoff {
            Backoff::Exponential { multiplier } => {
                Duration::from_millis((current.as_millis() as f64 * multiplier) as u64)
            }
            Backoff::Linear { increment } => current + increment,
        };
        next.min(self.max_delay)
    }
}

/// Retry an operation under a bounded delay schedule
///
/// Runs `operation` up to `config.max_attempts` times, sleeping the scheduled
/// delay between attempts. Only errors whose
/// [`is_recoverable`](EndpointError::is_recoverable) returns true are
/// retried; anything else returns immediately.
pub async fn retry_with_backoff<T, F, Fut>(
    operation_name: &str,
    config: RetryConfig,
    mut operation: F,
) -> EndpointResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = EndpointResult<T>>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;
        debug!(
            operation = operation_name,
            attempt,
            max_attempts = config.max_attempts,
            "attempting operation"
        );

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "operation succeeded after retries");
                }
                return Ok(result);
            }
            Err(e) if e.is_recoverable() && attempt < config.max_attempts => {
                warn!(
                    operation = operation_name,
                    attempt,
                    error = %e,
                    category = e.category(),
                    next_delay_ms = delay.as_millis() as u64,
                    "recoverable error, will retry"
                );

                let actual_delay = if config.use_jitter {
                    let jitter = (rand::random::<f64>() - 0.5) * 0.2;
                    let millis = delay.as_millis() as f64;
                    Duration::from_millis((millis * (1.0 + jitter)) as u64)
                } else {
                    delay
                };
                sleep(actual_delay).await;

                delay = config.delay_after(delay);
            }
            Err(e) => {
                if attempt >= config.max_attempts {
                    error!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %e,
                        "operation failed after all retry attempts"
                    );
                } else {
                    error!(
                        operation = operation_name,
                        error = %e,
                        category = e.category(),
                        "non-recoverable error, not retrying"
                    );
                }
                return Err(e);
            }
        }
    }
}
