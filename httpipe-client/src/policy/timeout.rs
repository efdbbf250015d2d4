//! Per-attempt timeout.

use std::time::Duration;

use crate::pipeline::{BoxFuture, Next, PipelinePolicy};
use crate::{CallContext, HttpResponse, PipelineError};

/// Bounds each pass through the rest of the chain.
///
/// Placed after the retry policy, an attempt that runs out of time fails
/// with [`PipelineError::Timeout`], which is transient and therefore
/// retried. Use [`CallContext::with_timeout`] to bound the whole call.
#[derive(Clone, Copy, Debug)]
pub struct TimeoutPolicy {
    timeout: Duration,
}

impl TimeoutPolicy {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl PipelinePolicy for TimeoutPolicy {
    fn process<'a>(
        &'a self,
        ctx: &'a mut CallContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, PipelineError>> {
        Box::pin(async move {
            tokio::time::timeout(self.timeout, next.run(ctx))
                .await
                .map_err(|_| PipelineError::Timeout(self.timeout))?
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FixedDelay, FnPolicy, HttpPipeline, HttpRequest, RetryPolicy};
    use crate::test_support::ScriptedClient;
    use http::Method;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_slow_attempt_times_out_and_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        // First attempt hangs, second goes straight through
        let slow_once = FnPolicy::new(move |ctx, next| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if n == 0 {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                next.run(ctx).await
            })
        });
        let client = Arc::new(ScriptedClient::new().respond(200));
        let pipeline = HttpPipeline::new(
            client.clone(),
            vec![
                Arc::new(RetryPolicy::new(FixedDelay::new(1, Duration::ZERO).unwrap())),
                Arc::new(TimeoutPolicy::new(Duration::from_millis(20))),
                Arc::new(slow_once),
            ],
        );

        let response = pipeline
            .send(HttpRequest::try_new(Method::GET, "https://a.example/").unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(client.send_count(), 1);
    }

    #[tokio::test]
    async fn test_timeout_error() {
        let hang = FnPolicy::new(|_ctx, _next| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err::<HttpResponse, _>(PipelineError::transport("unreachable"))
            })
        });
        let pipeline = HttpPipeline::new(
            Arc::new(ScriptedClient::new()),
            vec![Arc::new(TimeoutPolicy::new(Duration::from_millis(10))), Arc::new(hang)],
        );

        let err = pipeline
            .send(HttpRequest::try_new(Method::GET, "https://a.example/").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Timeout(d) if d == Duration::from_millis(10)));
    }
}
