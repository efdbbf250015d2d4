//! Per-call state threaded through the policy chain.

use std::time::Duration;

use http::Extensions;
use tokio_util::sync::CancellationToken;

use crate::HttpRequest;

/// Number of the attempt currently in flight, starting at 1.
///
/// Set by [`RetryPolicy`](crate::policy::RetryPolicy) before every attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryCount(pub u32);

/// Name of the client method that started the call, for log correlation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallerMethod(pub String);

/// Mutable state for one logical call.
///
/// Holds the request for the current attempt, a typed side-channel store,
/// a cancellation signal and an optional deadline for the whole call.
///
/// # Example
///
/// ```
/// use httpipe_client::{CallContext, CallerMethod, HttpRequest};
/// use http::Method;
/// use std::time::Duration;
///
/// let request = HttpRequest::try_new(Method::GET, "https://a.example/items")?;
/// let ctx = CallContext::new(request)
///     .with_caller_method("ItemsClient::list")
///     .with_timeout(Duration::from_secs(30));
///
/// assert_eq!(ctx.caller_method(), Some("ItemsClient::list"));
/// # Ok::<(), httpipe_client::PipelineError>(())
/// ```
#[derive(Debug)]
pub struct CallContext {
    request: HttpRequest,
    extensions: Extensions,
    cancellation: CancellationToken,
    timeout: Option<Duration>,
}

impl CallContext {
    pub fn new(request: HttpRequest) -> Self {
        Self {
            request,
            extensions: Extensions::new(),
            cancellation: CancellationToken::new(),
            timeout: None,
        }
    }

    /// Bound the whole call, all attempts and delays included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Use a caller-owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn with_caller_method(mut self, method: impl Into<String>) -> Self {
        self.extensions.insert(CallerMethod(method.into()));
        self
    }

    /// Store arbitrary typed data for policies to read.
    pub fn with_data<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.extensions.insert(value);
        self
    }

    /// The request for the current attempt.
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut HttpRequest {
        &mut self.request
    }

    /// Replace the request, returning the previous one.
    pub fn set_request(&mut self, request: HttpRequest) -> HttpRequest {
        std::mem::replace(&mut self.request, request)
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    pub fn data<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Attempt number, or 0 before the first attempt has been tagged.
    pub fn retry_count(&self) -> u32 {
        self.extensions.get::<RetryCount>().map_or(0, |c| c.0)
    }

    pub fn set_retry_count(&mut self, count: u32) {
        self.extensions.insert(RetryCount(count));
    }

    pub fn caller_method(&self) -> Option<&str> {
        self.extensions
            .get::<CallerMethod>()
            .map(|m| m.0.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn request(url: &str) -> HttpRequest {
        HttpRequest::try_new(Method::GET, url).unwrap()
    }

    #[test]
    fn test_set_request_replaces() {
        let mut ctx = CallContext::new(request("https://a.example/"));
        let previous = ctx.set_request(request("https://b.example/"));

        assert_eq!(previous.url().host_str(), Some("a.example"));
        assert_eq!(ctx.request().url().host_str(), Some("b.example"));
    }

    #[test]
    fn test_typed_data() {
        #[derive(Clone, Debug, PartialEq)]
        struct Tenant(&'static str);

        let mut ctx = CallContext::new(request("https://a.example/")).with_data(Tenant("t1"));
        assert_eq!(ctx.data::<Tenant>(), Some(&Tenant("t1")));
        assert_eq!(ctx.retry_count(), 0);

        ctx.set_retry_count(2);
        assert_eq!(ctx.retry_count(), 2);
    }

    #[test]
    fn test_cancellation_token_is_shared() {
        let token = CancellationToken::new();
        let ctx = CallContext::new(request("https://a.example/")).with_cancellation(token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }
}
