//! Retry policy.
//!
//! Re-runs the remainder of the chain according to a [`RetryStrategy`].
//! Every attempt starts from a fresh copy of the request the policy first
//! saw, so policies further down cannot leak edits from one attempt into
//! the next.
//!
//! Delay before the next attempt, in priority order:
//! 1. The explicitly configured retry-after header, read in its configured unit
//! 2. The well-known headers: `retry-after-ms`, `x-ms-retry-after-ms`, `Retry-After`
//! 3. [`RetryStrategy::delay`]
//!
//! Errors only ever use the strategy delay.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use http::HeaderName;

use crate::config::{ExponentialBackoff, RetryAfterUnit, RetryStrategy};
use crate::pipeline::{BoxFuture, Next, PipelinePolicy};
use crate::{CallContext, HttpResponse, PipelineError};

/// Headers consulted for a server-provided delay, in order.
pub fn default_retry_after_headers() -> Vec<(HeaderName, RetryAfterUnit)> {
    vec![
        (HeaderName::from_static("retry-after-ms"), RetryAfterUnit::Millis),
        (HeaderName::from_static("x-ms-retry-after-ms"), RetryAfterUnit::Millis),
        (http::header::RETRY_AFTER, RetryAfterUnit::Seconds),
    ]
}

/// Parse a retry-after value.
///
/// Integers and decimals are read in `unit`. Values in seconds may also be
/// an HTTP date; dates in the past yield a zero delay.
pub fn parse_retry_after(value: &str, unit: RetryAfterUnit, now: SystemTime) -> Option<Duration> {
    let value = value.trim();
    if let Ok(n) = value.parse::<u64>() {
        return Some(unit.to_duration(n));
    }
    if let Ok(n) = value.parse::<f64>() {
        if n.is_finite() && n >= 0.0 {
            let secs = match unit {
                RetryAfterUnit::Millis => n / 1000.0,
                RetryAfterUnit::Seconds => n,
            };
            return Duration::try_from_secs_f64(secs).ok();
        }
        return None;
    }
    if unit == RetryAfterUnit::Seconds {
        let date = httpdate::parse_http_date(value).ok()?;
        return Some(date.duration_since(now).unwrap_or(Duration::ZERO));
    }
    None
}

/// Retries failed attempts with delays from a [`RetryStrategy`].
///
/// # Example
///
/// ```
/// use httpipe_client::{FixedDelay, RetryAfterUnit, RetryPolicy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(FixedDelay::new(2, Duration::from_millis(500))?)
///     .retry_after_header("x-throttle-wait", RetryAfterUnit::Millis)?;
/// # Ok::<(), httpipe_client::PipelineError>(())
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    strategy: Arc<dyn RetryStrategy>,
    retry_after: Option<(HeaderName, RetryAfterUnit)>,
    well_known: Vec<(HeaderName, RetryAfterUnit)>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(ExponentialBackoff::default())
    }
}

impl RetryPolicy {
    pub fn new(strategy: impl RetryStrategy + 'static) -> Self {
        Self::with_shared_strategy(Arc::new(strategy))
    }

    pub fn with_shared_strategy(strategy: Arc<dyn RetryStrategy>) -> Self {
        Self {
            strategy,
            retry_after: None,
            well_known: default_retry_after_headers(),
        }
    }

    /// Read the delay from `name` in `unit` before any well-known header.
    pub fn retry_after_header(
        mut self,
        name: &str,
        unit: RetryAfterUnit,
    ) -> Result<Self, PipelineError> {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            PipelineError::configuration(format!("invalid retry-after header: {}", name))
        })?;
        self.retry_after = Some((name, unit));
        Ok(self)
    }

    /// Replace the list of well-known retry-after headers.
    pub fn well_known_headers(mut self, headers: Vec<(HeaderName, RetryAfterUnit)>) -> Self {
        self.well_known = headers;
        self
    }

    pub fn strategy(&self) -> &dyn RetryStrategy {
        self.strategy.as_ref()
    }

    /// Delay before retrying after `response` on attempt `attempt`.
    fn response_delay(&self, response: &HttpResponse, attempt: u32) -> Duration {
        let now = SystemTime::now();
        self.retry_after
            .iter()
            .chain(self.well_known.iter())
            .find_map(|(name, unit)| {
                response
                    .header_str(name)
                    .and_then(|value| parse_retry_after(value, *unit, now))
            })
            .unwrap_or_else(|| self.strategy.delay(attempt))
    }
}

/// Sleep unless the call is cancelled first.
async fn wait(ctx: &CallContext, delay: Duration) -> Result<(), PipelineError> {
    if delay.is_zero() {
        return Ok(());
    }
    tokio::select! {
        _ = ctx.cancellation().cancelled() => Err(PipelineError::Canceled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

impl PipelinePolicy for RetryPolicy {
    fn process<'a>(
        &'a self,
        ctx: &'a mut CallContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, PipelineError>> {
        Box::pin(async move {
            let original = ctx.request().clone();
            let max_retries = self.strategy.max_retries();
            let mut suppressed = Vec::new();
            let mut attempt = 0u32;

            loop {
                ctx.set_request(original.clone());
                ctx.set_retry_count(attempt + 1);

                match next.run(ctx).await {
                    Ok(response) => {
                        if !self.strategy.should_retry(&response) {
                            return Ok(response);
                        }
                        if attempt >= max_retries {
                            tracing::warn!(
                                status = response.status().as_u16(),
                                try_count = attempt + 1,
                                caller_method = ctx.caller_method(),
                                "retries exhausted"
                            );
                            return Ok(response);
                        }
                        let delay = self.response_delay(&response, attempt);
                        tracing::debug!(
                            status = response.status().as_u16(),
                            try_count = attempt + 1,
                            caller_method = ctx.caller_method(),
                            delay_ms = delay.as_millis() as u64,
                            "retrying after response"
                        );
                        response.close().await;
                        if let Err(err) = wait(ctx, delay).await {
                            return Err(err.with_suppressed(suppressed));
                        }
                    }
                    Err(err) => {
                        if attempt >= max_retries || !self.strategy.should_retry_error(&err) {
                            if attempt > 0 {
                                tracing::warn!(
                                    error = %err,
                                    try_count = attempt + 1,
                                    caller_method = ctx.caller_method(),
                                    "giving up after error"
                                );
                            }
                            return Err(err.with_suppressed(suppressed));
                        }
                        let delay = self.strategy.delay(attempt);
                        tracing::debug!(
                            error = %err,
                            try_count = attempt + 1,
                            caller_method = ctx.caller_method(),
                            delay_ms = delay.as_millis() as u64,
                            "retrying after error"
                        );
                        suppressed.push(err);
                        if let Err(err) = wait(ctx, delay).await {
                            return Err(err.with_suppressed(suppressed));
                        }
                    }
                }
                attempt += 1;
            }
        })
    }
}
