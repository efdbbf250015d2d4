//! Request and response logging.
//!
//! [`HttpLoggingPolicy`] writes one `tracing` event per request and one per
//! response (or error). Header values and query parameter values that are
//! not allow-listed are printed as `REDACTED`.
//!
//! Bodies are logged at [`HttpLogDetailLevel::Body`] and above when their
//! size is known, at most [`MAX_BODY_LOG_SIZE`], and the content type is
//! not binary. Streaming response bodies are passed through a tee that
//! emits the body event once the caller has read the stream to its end.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use futures::Stream;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::HeaderMap;
use serde::Deserialize;
use url::Url;

use crate::cache::BoundedCache;
use crate::pipeline::{BoxFuture, Next, PipelinePolicy};
use crate::{BodyStream, CallContext, HttpResponse, PipelineError, RequestBody, ResponseBody};

/// Bodies larger than this are never logged.
pub const MAX_BODY_LOG_SIZE: usize = 16 * 1024;

/// Replacement for values that are not allow-listed.
pub const REDACTED: &str = "REDACTED";

const URL_CACHE_CAPACITY: usize = 1000;

const DEFAULT_ALLOWED_HEADERS: &[&str] = &[
    "accept",
    "cache-control",
    "connection",
    "content-length",
    "content-type",
    "date",
    "etag",
    "expires",
    "if-match",
    "if-modified-since",
    "if-none-match",
    "if-unmodified-since",
    "last-modified",
    "location",
    "pragma",
    "request-id",
    "retry-after",
    "retry-after-ms",
    "server",
    "traceparent",
    "transfer-encoding",
    "user-agent",
    "www-authenticate",
    "x-ms-client-request-id",
    "x-ms-request-id",
    "x-ms-retry-after-ms",
    "x-ms-return-client-request-id",
];

const DEFAULT_ALLOWED_QUERY_PARAMS: &[&str] = &["api-version"];

/// How much of each exchange is logged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpLogDetailLevel {
    #[default]
    None,
    /// Method, URL, status and duration.
    Basic,
    Headers,
    Body,
    BodyAndHeaders,
}

impl HttpLogDetailLevel {
    pub fn is_enabled(self) -> bool {
        self != HttpLogDetailLevel::None
    }

    pub fn logs_headers(self) -> bool {
        matches!(
            self,
            HttpLogDetailLevel::Headers | HttpLogDetailLevel::BodyAndHeaders
        )
    }

    pub fn logs_body(self) -> bool {
        matches!(
            self,
            HttpLogDetailLevel::Body | HttpLogDetailLevel::BodyAndHeaders
        )
    }
}

/// Options for [`HttpLoggingPolicy`].
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpLogOptions {
    pub level: HttpLogDetailLevel,
    /// Header names printed with their value, case-insensitive.
    pub allowed_header_names: HashSet<String>,
    /// Query parameters printed with their value, case-sensitive.
    pub allowed_query_params: HashSet<String>,
}

impl Default for HttpLogOptions {
    fn default() -> Self {
        Self {
            level: HttpLogDetailLevel::None,
            allowed_header_names: DEFAULT_ALLOWED_HEADERS.iter().map(|s| s.to_string()).collect(),
            allowed_query_params: DEFAULT_ALLOWED_QUERY_PARAMS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl HttpLogOptions {
    pub fn with_level(mut self, level: HttpLogDetailLevel) -> Self {
        self.level = level;
        self
    }

    pub fn allow_header(mut self, name: impl Into<String>) -> Self {
        self.allowed_header_names.insert(name.into());
        self
    }

    pub fn allow_query_param(mut self, name: impl Into<String>) -> Self {
        self.allowed_query_params.insert(name.into());
        self
    }
}

/// Logs requests and responses through `tracing`.
#[derive(Debug)]
pub struct HttpLoggingPolicy {
    level: HttpLogDetailLevel,
    allowed_headers: HashSet<String>,
    allowed_query_params: HashSet<String>,
    url_cache: BoundedCache<String, String>,
}

impl Default for HttpLoggingPolicy {
    fn default() -> Self {
        Self::new(HttpLogOptions::default())
    }
}

impl HttpLoggingPolicy {
    pub fn new(options: HttpLogOptions) -> Self {
        Self {
            level: options.level,
            allowed_headers: options
                .allowed_header_names
                .iter()
                .map(|name| name.to_ascii_lowercase())
                .collect(),
            allowed_query_params: options.allowed_query_params,
            url_cache: BoundedCache::new(URL_CACHE_CAPACITY),
        }
    }

    pub fn level(&self) -> HttpLogDetailLevel {
        self.level
    }

    /// The URL with credentials removed and non-allowed query values redacted.
    pub fn redact_url(&self, url: &Url) -> String {
        self.url_cache
            .get_or_insert_with(url.to_string(), |_| {
                redact_url(url, &self.allowed_query_params)
            })
    }

    /// Render headers as `name: value` pairs with redaction applied.
    pub fn format_headers(&self, headers: &HeaderMap) -> String {
        let mut out = String::new();
        for (name, value) in headers {
            if !out.is_empty() {
                out.push_str(", ");
            }
            let value = if self.allowed_headers.contains(name.as_str()) {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            } else {
                REDACTED.to_string()
            };
            let _ = write!(out, "{}: {}", name, value);
        }
        out
    }

    fn log_request(&self, ctx: &CallContext, url: &str) {
        let request = ctx.request();
        let headers = self
            .level
            .logs_headers()
            .then(|| self.format_headers(request.headers()));
        tracing::info!(
            method = %request.method(),
            url,
            try_count = ctx.retry_count(),
            caller_method = ctx.caller_method(),
            headers = headers.as_deref(),
            "sending request"
        );

        if !self.level.logs_body() {
            return;
        }
        if let RequestBody::Full(data) = request.get_body() {
            if data.len() <= MAX_BODY_LOG_SIZE
                && !data.is_empty()
                && !is_binary(request.header_str(CONTENT_TYPE))
            {
                tracing::info!(
                    url,
                    try_count = ctx.retry_count(),
                    caller_method = ctx.caller_method(),
                    body = %String::from_utf8_lossy(data),
                    "request body"
                );
            }
        }
    }

    fn log_response(
        &self,
        ctx: &CallContext,
        url: &str,
        response: &mut HttpResponse,
        start: Instant,
    ) {
        let headers = self
            .level
            .logs_headers()
            .then(|| self.format_headers(response.headers()));
        tracing::info!(
            status = response.status().as_u16(),
            url,
            elapsed_ms = start.elapsed().as_millis() as u64,
            try_count = ctx.retry_count(),
            caller_method = ctx.caller_method(),
            headers = headers.as_deref(),
            "received response"
        );

        if !self.level.logs_body() || is_binary(response.header_str(CONTENT_TYPE)) {
            return;
        }
        let length = response
            .header_str(CONTENT_LENGTH)
            .and_then(|v| v.trim().parse::<usize>().ok());
        let body = response.take_body();
        let body = match body {
            ResponseBody::Full(data) => {
                if data.len() <= MAX_BODY_LOG_SIZE && !data.is_empty() {
                    log_response_body(url, ctx.retry_count(), ctx.caller_method(), &data);
                }
                ResponseBody::Full(data)
            }
            ResponseBody::Streaming(stream) => match length {
                Some(len) if len > 0 && len <= MAX_BODY_LOG_SIZE => {
                    ResponseBody::streaming(LoggedStream {
                        inner: stream,
                        buffer: BytesMut::with_capacity(len),
                        url: url.to_string(),
                        try_count: ctx.retry_count(),
                        caller_method: ctx.caller_method().map(str::to_string),
                        done: false,
                    })
                }
                _ => ResponseBody::Streaming(stream),
            },
            empty => empty,
        };
        response.set_body(body);
    }
}

fn log_response_body(url: &str, try_count: u32, caller_method: Option<&str>, data: &[u8]) {
    tracing::info!(
        url,
        try_count,
        caller_method,
        body = %String::from_utf8_lossy(data),
        "response body"
    );
}

/// Returns whether a content type should never be logged as text.
pub fn is_binary(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return false;
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/octet-stream"
        || essence == "application/zip"
        || essence == "application/gzip"
        || essence == "application/pdf"
        || essence.ends_with("+proto")
        || essence == "application/proto"
        || essence == "application/grpc"
        || ["image/", "audio/", "video/", "font/"]
            .iter()
            .any(|prefix| essence.starts_with(prefix))
}

fn redact_url(url: &Url, allowed: &HashSet<String>) -> String {
    let mut redacted = url.clone();
    let _ = redacted.set_username("");
    let _ = redacted.set_password(None);
    redacted.set_fragment(None);

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(key, value)| {
            let value = if allowed.contains(key.as_ref()) {
                value.into_owned()
            } else {
                REDACTED.to_string()
            };
            (key.into_owned(), value)
        })
        .collect();
    if pairs.is_empty() {
        redacted.set_query(None);
    } else {
        redacted.query_pairs_mut().clear().extend_pairs(pairs);
    }
    redacted.to_string()
}

/// Copies up to [`MAX_BODY_LOG_SIZE`] bytes aside and logs them at end of stream.
struct LoggedStream {
    inner: BodyStream,
    buffer: BytesMut,
    url: String,
    try_count: u32,
    caller_method: Option<String>,
    done: bool,
}

impl Stream for LoggedStream {
    type Item = Result<Bytes, PipelineError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let item = std::task::ready!(this.inner.as_mut().poll_next(cx));
        match &item {
            Some(Ok(chunk)) => {
                let room = MAX_BODY_LOG_SIZE.saturating_sub(this.buffer.len());
                this.buffer
                    .extend_from_slice(&chunk[..chunk.len().min(room)]);
            }
            Some(Err(_)) => this.done = true,
            None if !this.done => {
                this.done = true;
                log_response_body(
                    &this.url,
                    this.try_count,
                    this.caller_method.as_deref(),
                    &this.buffer,
                );
            }
            None => {}
        }
        Poll::Ready(item)
    }
}

impl PipelinePolicy for HttpLoggingPolicy {
    fn process<'a>(
        &'a self,
        ctx: &'a mut CallContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, PipelineError>> {
        Box::pin(async move {
            if !self.level.is_enabled() {
                return next.run(ctx).await;
            }
            let url = self.redact_url(ctx.request().url());
            self.log_request(ctx, &url);

            let start = Instant::now();
            match next.run(ctx).await {
                Ok(mut response) => {
                    self.log_response(ctx, &url, &mut response, start);
                    Ok(response)
                }
                Err(err) => {
                    tracing::warn!(
                        url,
                        error = %err,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        try_count = ctx.retry_count(),
                        caller_method = ctx.caller_method(),
                        "request failed"
                    );
                    Err(err)
                }
            }
        })
    }
}
