//! Policy chain and the `Next` continuation that drives it.
//!
//! A pipeline is an ordered, immutable list of [`PipelinePolicy`] values in
//! front of an [`HttpClient`]. Each policy sees the shared [`CallContext`] and
//! a [`Next`] handle for the remainder of the chain:
//!
//! ```text
//! caller -> p0 -> p1 -> ... -> pn -> HttpClient::send
//! ```
//!
//! `Next` is `Copy`, so a policy can run the remainder of the chain zero
//! times (short-circuit), once, or in a loop (retry, redirect) without
//! growing the call stack.
//!
//! # Example
//!
//! ```ignore
//! use httpipe_client::{FnPolicy, HttpPipeline, HyperTransport, HttpRequest};
//!
//! let pipeline = HttpPipeline::builder()
//!     .http_client(HyperTransport::new()?)
//!     .policy(FnPolicy::new(|ctx, next| {
//!         Box::pin(async move {
//!             tracing::info!(url = %ctx.request().url(), "sending");
//!             next.run(ctx).await
//!         })
//!     }))
//!     .build()?;
//!
//! let response = pipeline.send(HttpRequest::get(url)).await?;
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::builder::HttpPipelineBuilder;
use crate::{CallContext, HttpRequest, HttpResponse, PipelineError};

/// Type alias for a boxed future returning a result.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The transport at the end of the chain.
pub trait HttpClient: Send + Sync + fmt::Debug {
    /// Send one request and return the response head with a streaming body.
    ///
    /// HTTP error statuses are responses, not errors.
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, PipelineError>>;
}

/// One link of the pipeline.
///
/// Policies are shared across concurrent calls and must not keep per-call
/// state in `self`; use [`CallContext`] or locals of the returned future.
pub trait PipelinePolicy: Send + Sync + fmt::Debug {
    fn process<'a>(
        &'a self,
        ctx: &'a mut CallContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, PipelineError>>;
}

/// Continuation for the remainder of the chain.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    policies: &'a [Arc<dyn PipelinePolicy>],
    client: &'a dyn HttpClient,
}

impl<'a> Next<'a> {
    pub(crate) fn new(policies: &'a [Arc<dyn PipelinePolicy>], client: &'a dyn HttpClient) -> Self {
        Self { policies, client }
    }

    /// Run the remainder of the chain with the context's current request.
    pub fn run<'c>(
        self,
        ctx: &'c mut CallContext,
    ) -> BoxFuture<'c, Result<HttpResponse, PipelineError>>
    where
        'a: 'c,
    {
        match self.policies.split_first() {
            Some((policy, rest)) => policy.process(ctx, Next::new(rest, self.client)),
            None => self.client.send(ctx.request().clone()),
        }
    }

    /// Number of policies left before the transport.
    pub fn remaining(&self) -> usize {
        self.policies.len()
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.policies.len())
            .field("client", &self.client)
            .finish()
    }
}

/// A built pipeline: `Send + Sync + Clone`, cheap to share.
#[derive(Clone)]
pub struct HttpPipeline {
    policies: Arc<[Arc<dyn PipelinePolicy>]>,
    client: Arc<dyn HttpClient>,
}

impl fmt::Debug for HttpPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpPipeline")
            .field("policies", &self.policies)
            .field("client", &self.client)
            .finish()
    }
}

impl HttpPipeline {
    pub fn new(client: Arc<dyn HttpClient>, policies: Vec<Arc<dyn PipelinePolicy>>) -> Self {
        Self {
            policies: policies.into(),
            client,
        }
    }

    pub fn builder() -> HttpPipelineBuilder {
        HttpPipelineBuilder::new()
    }

    pub fn policies(&self) -> &[Arc<dyn PipelinePolicy>] {
        &self.policies
    }

    pub fn http_client(&self) -> &Arc<dyn HttpClient> {
        &self.client
    }

    /// Send a request with a fresh [`CallContext`].
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, PipelineError> {
        let mut ctx = CallContext::new(request);
        self.send_with_context(&mut ctx).await
    }

    /// Send the context's request through the chain.
    ///
    /// The call fails with [`PipelineError::Canceled`] as soon as the
    /// context's token is cancelled, and with [`PipelineError::Timeout`] once
    /// the context's timeout elapses. In-flight attempts and retry delays are
    /// dropped in both cases.
    pub async fn send_with_context(
        &self,
        ctx: &mut CallContext,
    ) -> Result<HttpResponse, PipelineError> {
        let token = ctx.cancellation().clone();
        if token.is_cancelled() {
            return Err(PipelineError::Canceled);
        }
        let timeout = ctx.timeout();
        let next = Next::new(&self.policies, self.client.as_ref());

        let call = async move {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, next.run(ctx))
                    .await
                    .map_err(|_| PipelineError::Timeout(limit))?,
                None => next.run(ctx).await,
            }
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(PipelineError::Canceled),
            result = call => result,
        }
    }
}

/// A policy built from a closure.
///
/// # Example
///
/// ```
/// use httpipe_client::FnPolicy;
/// use http::HeaderValue;
///
/// let policy = FnPolicy::new(|ctx, next| {
///     Box::pin(async move {
///         ctx.request_mut()
///             .headers_mut()
///             .insert("x-tenant", HeaderValue::from_static("contoso"));
///         next.run(ctx).await
///     })
/// });
/// ```
pub struct FnPolicy<F> {
    func: F,
}

impl<F> FnPolicy<F>
where
    F: for<'a> Fn(
            &'a mut CallContext,
            Next<'a>,
        ) -> BoxFuture<'a, Result<HttpResponse, PipelineError>>
        + Send
        + Sync
        + 'static,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> fmt::Debug for FnPolicy<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPolicy").finish_non_exhaustive()
    }
}

impl<F> PipelinePolicy for FnPolicy<F>
where
    F: for<'a> Fn(
            &'a mut CallContext,
            Next<'a>,
        ) -> BoxFuture<'a, Result<HttpResponse, PipelineError>>
        + Send
        + Sync
        + 'static,
{
    fn process<'a>(
        &'a self,
        ctx: &'a mut CallContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, PipelineError>> {
        (self.func)(ctx, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedClient;
    use http::{HeaderValue, Method, StatusCode};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[derive(Debug)]
    struct Tag(&'static str, Arc<Mutex<Vec<String>>>);

    impl PipelinePolicy for Tag {
        fn process<'a>(
            &'a self,
            ctx: &'a mut CallContext,
            next: Next<'a>,
        ) -> BoxFuture<'a, Result<HttpResponse, PipelineError>> {
            Box::pin(async move {
                self.1.lock().unwrap().push(format!("{}:before", self.0));
                let response = next.run(ctx).await;
                self.1.lock().unwrap().push(format!("{}:after", self.0));
                response
            })
        }
    }

    fn request() -> HttpRequest {
        HttpRequest::try_new(Method::GET, "https://a.example/").unwrap()
    }

    #[tokio::test]
    async fn test_policies_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let client = Arc::new(ScriptedClient::new().respond(200));
        let pipeline = HttpPipeline::new(
            client.clone(),
            vec![
                Arc::new(Tag("p0", log.clone())),
                Arc::new(Tag("p1", log.clone())),
            ],
        );

        let response = pipeline.send(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["p0:before", "p1:before", "p1:after", "p0:after"]
        );
        assert_eq!(client.send_count(), 1);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_transport() {
        let client = Arc::new(ScriptedClient::new());
        let policy = FnPolicy::new(|ctx, _next| {
            let request = ctx.request().clone();
            Box::pin(async move {
                Ok(HttpResponse::new(
                    request,
                    StatusCode::NO_CONTENT,
                    http::HeaderMap::new(),
                    crate::ResponseBody::Empty,
                ))
            })
        });
        let pipeline = HttpPipeline::new(client.clone(), vec![Arc::new(policy)]);

        let response = pipeline.send(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(client.send_count(), 0);
    }

    #[tokio::test]
    async fn test_next_is_reentrant() {
        let client = Arc::new(ScriptedClient::new().respond(500).respond(200));
        let twice = FnPolicy::new(|ctx, next| {
            Box::pin(async move {
                let first = next.run(ctx).await?;
                first.close().await;
                next.run(ctx).await
            })
        });
        let pipeline = HttpPipeline::new(client.clone(), vec![Arc::new(twice)]);

        let response = pipeline.send(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(client.send_count(), 2);
    }

    #[tokio::test]
    async fn test_policy_mutation_reaches_transport() {
        let client = Arc::new(ScriptedClient::new().respond(200));
        let policy = FnPolicy::new(|ctx, next| {
            Box::pin(async move {
                ctx.request_mut()
                    .headers_mut()
                    .insert("x-tenant", HeaderValue::from_static("contoso"));
                next.run(ctx).await
            })
        });
        let pipeline = HttpPipeline::new(client.clone(), vec![Arc::new(policy)]);

        pipeline.send(request()).await.unwrap();
        assert_eq!(client.requests()[0].header_str("x-tenant"), Some("contoso"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let client = Arc::new(ScriptedClient::new().respond(200));
        let pipeline = HttpPipeline::new(client.clone(), Vec::new());
        let token = CancellationToken::new();
        token.cancel();

        let mut ctx = CallContext::new(request()).with_cancellation(token);
        let err = pipeline.send_with_context(&mut ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::Canceled));
        assert_eq!(client.send_count(), 0);
    }

    #[tokio::test]
    async fn test_call_timeout() {
        let client = Arc::new(ScriptedClient::new().respond(200));
        let slow = FnPolicy::new(|ctx, next| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                next.run(ctx).await
            })
        });
        let pipeline = HttpPipeline::new(client.clone(), vec![Arc::new(slow)]);

        let mut ctx = CallContext::new(request()).with_timeout(Duration::from_millis(20));
        let err = pipeline.send_with_context(&mut ctx).await.unwrap_err();
        assert!(matches!(err, PipelineError::Timeout(_)));
        assert_eq!(client.send_count(), 0);
    }

    #[test]
    fn test_pipeline_is_send_sync_clone() {
        fn assert_traits<T: Send + Sync + Clone>() {}
        assert_traits::<HttpPipeline>();
    }
}
