//! Retry strategies.
//!
//! A [`RetryStrategy`] is a pure decision and delay policy. It never sends
//! anything; [`RetryPolicy`](crate::policy::RetryPolicy) asks it whether an
//! outcome is worth another attempt and how long to wait first.
//!
//! # Overview
//!
//! - [`ExponentialBackoff`]: `min(jittered_base * 2^attempt, max_delay)`
//! - [`FixedDelay`]: the same delay before every retry
//!
//! # Retryable Outcomes
//!
//! By default both strategies retry:
//! - Responses with status 408, 429, 500, 502, 503 or 504
//! - Transient errors: transport failures, timeouts and connection-level
//!   I/O errors (see [`PipelineError::is_transient`])
//!
//! # Example
//!
//! ```
//! use httpipe_client::{ExponentialBackoff, RetryStrategy};
//! use std::time::Duration;
//!
//! let backoff = ExponentialBackoff::new(5, Duration::from_millis(100), Duration::from_secs(2))?;
//! assert_eq!(backoff.max_retries(), 5);
//! assert!(backoff.delay(10) <= Duration::from_secs(2));
//! # Ok::<(), httpipe_client::PipelineError>(())
//! ```

use std::fmt;
use std::time::Duration;

use http::StatusCode;
use serde::Deserialize;

use crate::{HttpResponse, PipelineError};

/// Default configuration values.
pub mod defaults {
    use std::time::Duration;

    /// Default base delay for exponential backoff.
    pub const BASE_DELAY: Duration = Duration::from_millis(800);

    /// Default cap for exponential backoff.
    pub const MAX_DELAY: Duration = Duration::from_secs(8);

    /// Jitter applied to the base delay (0.05 means +/- 5%).
    pub const JITTER: f64 = 0.05;

    /// Default maximum number of retries when the environment does not say.
    pub const MAX_RETRIES: u32 = 3;

    /// Environment variable overriding [`MAX_RETRIES`].
    pub const MAX_RETRIES_ENV: &str = "HTTPIPE_MAX_RETRIES";

    /// Statuses retried by default.
    pub const RETRY_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];
}

/// Default maximum retry count, honoring `HTTPIPE_MAX_RETRIES`.
pub fn default_max_retries() -> u32 {
    max_retries_from(std::env::var(defaults::MAX_RETRIES_ENV).ok().as_deref())
}

fn max_retries_from(value: Option<&str>) -> u32 {
    let Some(value) = value else {
        return defaults::MAX_RETRIES;
    };
    match value.trim().parse::<u32>() {
        Ok(n) => n,
        Err(_) => {
            tracing::warn!(
                env = defaults::MAX_RETRIES_ENV,
                value,
                "ignoring invalid max retry override"
            );
            defaults::MAX_RETRIES
        }
    }
}

/// Returns whether `status` is retried by default.
pub fn is_retryable_status(status: StatusCode) -> bool {
    defaults::RETRY_STATUSES.contains(&status.as_u16())
}

/// Decides whether and when to retry.
pub trait RetryStrategy: Send + Sync + fmt::Debug {
    /// Maximum number of retries, not counting the first attempt.
    fn max_retries(&self) -> u32;

    /// Delay before retry number `attempt + 1`, where `attempt` starts at 0.
    fn delay(&self, attempt: u32) -> Duration;

    /// Whether a response should be retried.
    fn should_retry(&self, response: &HttpResponse) -> bool {
        is_retryable_status(response.status())
    }

    /// Whether an error should be retried.
    fn should_retry_error(&self, error: &PipelineError) -> bool {
        error.is_transient()
    }
}

fn check_max_retries(max_retries: i32) -> Result<u32, PipelineError> {
    u32::try_from(max_retries).map_err(|_| {
        PipelineError::configuration(format!("max_retries must be >= 0, got {}", max_retries))
    })
}

/// Exponential backoff with jitter on the base delay.
///
/// `delay(attempt) = min(base * (1 +/- 5%) * 2^attempt, max_delay)`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExponentialBackoff {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl ExponentialBackoff {
    /// Create a backoff strategy.
    ///
    /// Fails when `max_retries` is negative, `base_delay` is zero or
    /// `base_delay` exceeds `max_delay`.
    pub fn new(
        max_retries: i32,
        base_delay: Duration,
        max_delay: Duration,
    ) -> Result<Self, PipelineError> {
        let max_retries = check_max_retries(max_retries)?;
        if base_delay.is_zero() {
            return Err(PipelineError::configuration("base_delay must be greater than zero"));
        }
        if base_delay > max_delay {
            return Err(PipelineError::configuration("base_delay must not exceed max_delay"));
        }
        Ok(Self {
            max_retries,
            base_delay,
            max_delay,
        })
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay: defaults::BASE_DELAY,
            max_delay: defaults::MAX_DELAY,
        }
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn delay(&self, attempt: u32) -> Duration {
        let jitter = 1.0 - defaults::JITTER + rand::random::<f64>() * 2.0 * defaults::JITTER;
        let base = self.base_delay.as_secs_f64() * jitter;
        // 2^64 seconds already exceeds any sane cap
        let delay = base * 2f64.powi(attempt.min(64) as i32);
        Duration::try_from_secs_f64(delay)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// The same delay before every retry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixedDelay {
    max_retries: u32,
    delay: Duration,
}

impl FixedDelay {
    /// Create a fixed delay strategy. Fails when `max_retries` is negative.
    pub fn new(max_retries: i32, delay: Duration) -> Result<Self, PipelineError> {
        Ok(Self {
            max_retries: check_max_retries(max_retries)?,
            delay,
        })
    }
}

impl RetryStrategy for FixedDelay {
    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn delay(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

/// Unit of an explicitly configured retry-after header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryAfterUnit {
    Millis,
    #[default]
    Seconds,
}

impl RetryAfterUnit {
    pub fn to_duration(self, value: u64) -> Duration {
        match self {
            RetryAfterUnit::Millis => Duration::from_millis(value),
            RetryAfterUnit::Seconds => Duration::from_secs(value),
        }
    }
}
