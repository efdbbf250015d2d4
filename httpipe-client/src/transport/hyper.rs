//! Hyper-based HTTP transport.
//!
//! This module provides [`HyperTransport`], the [`HttpClient`] used at the
//! end of production pipelines, built on hyper_util's legacy pooled client.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::TryStreamExt;
use http::header::CONTENT_LENGTH;
use http::HeaderValue;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::ClientConfig;
use tower_service::Service;

use super::body::TransportBody;
use super::connector::{build_https_connector, default_tls_config};
use crate::pipeline::{BoxFuture, HttpClient};
use crate::{HttpRequest, HttpResponse, PipelineError, RequestBody, ResponseBody};

/// Type alias for the hyper client with HTTPS connector.
type HyperClient = Client<HttpsConnector<HttpConnector>, TransportBody>;

/// HTTP transport using hyper_util's legacy client.
///
/// Supports HTTP/1.1 and HTTP/2 (negotiated via ALPN), TLS through rustls
/// and connection pooling. Response bodies are streamed; the pipeline
/// drains them when a response is discarded so the connection returns to
/// the pool.
///
/// # Example
///
/// ```ignore
/// use httpipe_client::{HttpPipeline, HyperTransport};
/// use std::time::Duration;
///
/// let transport = HyperTransport::builder()
///     .pool_idle_timeout(Duration::from_secs(60))
///     .build()?;
///
/// let pipeline = HttpPipeline::builder()
///     .http_client(transport)
///     .build()?;
/// ```
#[derive(Clone)]
pub struct HyperTransport {
    client: HyperClient,
    http2_only: bool,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("http2_only", &self.http2_only)
            .finish_non_exhaustive()
    }
}

impl HyperTransport {
    pub fn builder() -> HyperTransportBuilder {
        HyperTransportBuilder::new()
    }

    /// Create a transport with default settings.
    pub fn new() -> Result<Self, PipelineError> {
        Self::builder().build()
    }

    /// Send a raw HTTP request.
    pub async fn request(
        &self,
        request: http::Request<TransportBody>,
    ) -> Result<http::Response<Incoming>, PipelineError> {
        self.client.request(request).await.map_err(map_client_error)
    }

    pub fn is_http2_only(&self) -> bool {
        self.http2_only
    }
}

fn map_client_error(err: hyper_util::client::legacy::Error) -> PipelineError {
    if err.is_connect() {
        PipelineError::transport(format!("connect failed: {}", err))
    } else {
        PipelineError::transport(format!("request failed: {}", err))
    }
}

/// Convert a pipeline request into the form hyper sends.
pub(crate) fn to_http_request(
    request: &HttpRequest,
) -> Result<http::Request<TransportBody>, PipelineError> {
    let uri: http::Uri = request
        .url()
        .as_str()
        .parse()
        .map_err(|e| PipelineError::invalid_request(format!("invalid uri: {}", e)))?;

    let body = request.get_body();
    let mut http_request = http::Request::new(TransportBody::from(body));
    *http_request.method_mut() = request.method().clone();
    *http_request.uri_mut() = uri;
    *http_request.headers_mut() = request.headers().clone();

    // Empty bodies get no header so GET requests stay bare
    let length = match body {
        RequestBody::Empty => None,
        other => other.content_length(),
    };
    if let Some(len) = length {
        if !http_request.headers().contains_key(CONTENT_LENGTH) {
            http_request
                .headers_mut()
                .insert(CONTENT_LENGTH, HeaderValue::from(len));
        }
    }
    Ok(http_request)
}

/// Wrap a hyper response, keeping the body as a stream.
pub(crate) fn from_http_response(
    request: HttpRequest,
    response: http::Response<Incoming>,
) -> HttpResponse {
    let (parts, incoming) = response.into_parts();
    let stream = incoming
        .into_data_stream()
        .map_err(|e| PipelineError::body(e.to_string()));
    HttpResponse::new(
        request,
        parts.status,
        parts.headers,
        ResponseBody::streaming(stream),
    )
}

impl HttpClient for HyperTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, PipelineError>> {
        Box::pin(async move {
            let http_request = to_http_request(&request)?;
            let response = self.request(http_request).await?;
            Ok(from_http_response(request, response))
        })
    }
}

/// Builder for [`HyperTransport`].
///
/// # Example
///
/// ```ignore
/// use httpipe_client::HyperTransportBuilder;
/// use std::time::Duration;
///
/// let transport = HyperTransportBuilder::new()
///     .http2_only(true)
///     .pool_idle_timeout(Duration::from_secs(90))
///     .build()?;
/// ```
pub struct HyperTransportBuilder {
    /// Custom TLS configuration.
    tls_config: Option<ClientConfig>,
    /// Force HTTP/2 only.
    http2_only: bool,
    /// Connection pool idle timeout.
    pool_idle_timeout: Option<Duration>,
    /// Maximum idle connections per host.
    pool_max_idle_per_host: usize,
    /// HTTP/2 keep-alive interval.
    h2_keep_alive_interval: Option<Duration>,
    /// HTTP/2 keep-alive timeout.
    h2_keep_alive_timeout: Option<Duration>,
}

impl Default for HyperTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperTransportBuilder {
    pub fn new() -> Self {
        Self {
            tls_config: None,
            http2_only: false,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
            h2_keep_alive_interval: None,
            h2_keep_alive_timeout: None,
        }
    }

    /// Set a custom TLS configuration (custom roots, client certificates).
    pub fn tls_config(mut self, config: ClientConfig) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Use HTTP/2 without negotiation.
    pub fn http2_only(mut self, enabled: bool) -> Self {
        self.http2_only = enabled;
        self
    }

    /// Close pooled connections idle for longer than `timeout`.
    ///
    /// Default: 90 seconds.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Default: 32.
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.pool_max_idle_per_host = max;
        self
    }

    /// Send HTTP/2 PING frames at this interval.
    pub fn h2_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.h2_keep_alive_interval = Some(interval);
        self
    }

    /// Only effective if `h2_keep_alive_interval` is also set.
    pub fn h2_keep_alive_timeout(mut self, timeout: Duration) -> Self {
        self.h2_keep_alive_timeout = Some(timeout);
        self
    }

    /// Build the transport.
    ///
    /// Fails when no TLS configuration was given and none can be derived
    /// from the enabled features.
    pub fn build(self) -> Result<HyperTransport, PipelineError> {
        let tls_config = match self.tls_config {
            Some(config) => config,
            None => default_tls_config()?,
        };
        let https_connector = build_https_connector(tls_config);

        let mut builder = Client::builder(TokioExecutor::new());
        // Required for pool_idle_timeout to take effect
        builder.pool_timer(TokioTimer::new());
        if let Some(timeout) = self.pool_idle_timeout {
            builder.pool_idle_timeout(timeout);
        }
        builder.pool_max_idle_per_host(self.pool_max_idle_per_host);

        if self.http2_only {
            builder.http2_only(true);
        }
        if let Some(interval) = self.h2_keep_alive_interval {
            builder.http2_keep_alive_interval(interval);
        }
        if let Some(timeout) = self.h2_keep_alive_timeout {
            builder.http2_keep_alive_timeout(timeout);
        }

        Ok(HyperTransport {
            client: builder.build(https_connector),
            http2_only: self.http2_only,
        })
    }
}

impl std::fmt::Debug for HyperTransportBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransportBuilder")
            .field("tls_config", &self.tls_config.is_some())
            .field("http2_only", &self.http2_only)
            .field("pool_idle_timeout", &self.pool_idle_timeout)
            .field("pool_max_idle_per_host", &self.pool_max_idle_per_host)
            .field("h2_keep_alive_interval", &self.h2_keep_alive_interval)
            .field("h2_keep_alive_timeout", &self.h2_keep_alive_timeout)
            .finish()
    }
}

impl Service<http::Request<TransportBody>> for HyperTransport {
    type Response = http::Response<Incoming>;
    type Error = PipelineError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // legacy::Client is always ready
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<TransportBody>) -> Self::Future {
        let client = self.client.clone();
        Box::pin(async move { client.request(req).await.map_err(map_client_error) })
    }
}
