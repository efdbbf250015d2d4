//! Outgoing request model.
//!
//! [`HttpRequest`] is cheap to clone: header maps are copied, buffered bodies
//! share their [`Bytes`], and streaming bodies are produced by a shared
//! factory so every attempt gets its own fresh stream.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::BoxStream;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

use crate::PipelineError;

/// Stream of body chunks.
pub type BodyStream = BoxStream<'static, Result<Bytes, PipelineError>>;

type StreamFactory = Arc<dyn Fn() -> BodyStream + Send + Sync>;

/// A request body that can be sent more than once.
///
/// Retries and redirects resend the same body, so streaming bodies are held
/// as a factory rather than a one-shot stream.
#[derive(Clone, Default)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// Fully buffered body.
    Full(Bytes),
    /// Streaming body, recreated for every attempt.
    Replayable {
        factory: StreamFactory,
        length: Option<u64>,
    },
}

impl RequestBody {
    /// Create an empty body.
    pub fn empty() -> Self {
        RequestBody::Empty
    }

    /// Create a buffered body.
    pub fn full(data: impl Into<Bytes>) -> Self {
        RequestBody::Full(data.into())
    }

    /// Create a streaming body from a factory.
    ///
    /// `length` is used for `Content-Length` and for body logging decisions.
    pub fn replayable<F>(length: Option<u64>, factory: F) -> Self
    where
        F: Fn() -> BodyStream + Send + Sync + 'static,
    {
        RequestBody::Replayable {
            factory: Arc::new(factory),
            length,
        }
    }

    /// Length in bytes, if known up front.
    pub fn content_length(&self) -> Option<u64> {
        match self {
            RequestBody::Empty => Some(0),
            RequestBody::Full(data) => Some(data.len() as u64),
            RequestBody::Replayable { length, .. } => *length,
        }
    }

    /// Buffered bytes, if the body is not streaming.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            RequestBody::Full(data) => Some(data),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }

    /// Open a fresh stream over the body contents.
    pub fn stream(&self) -> BodyStream {
        match self {
            RequestBody::Empty => Box::pin(futures::stream::empty()),
            RequestBody::Full(data) => Box::pin(futures::stream::once(futures::future::ready(
                Ok(data.clone()),
            ))),
            RequestBody::Replayable { factory, .. } => factory(),
        }
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => write!(f, "RequestBody::Empty"),
            RequestBody::Full(data) => f
                .debug_struct("RequestBody::Full")
                .field("data_len", &data.len())
                .finish(),
            RequestBody::Replayable { length, .. } => f
                .debug_struct("RequestBody::Replayable")
                .field("length", length)
                .finish(),
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(data: Bytes) -> Self {
        RequestBody::Full(data)
    }
}

impl From<String> for RequestBody {
    fn from(data: String) -> Self {
        RequestBody::Full(Bytes::from(data))
    }
}

impl From<&'static str> for RequestBody {
    fn from(data: &'static str) -> Self {
        RequestBody::Full(Bytes::from_static(data.as_bytes()))
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(data: Vec<u8>) -> Self {
        RequestBody::Full(Bytes::from(data))
    }
}

/// An HTTP request travelling through the pipeline.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: RequestBody,
}

impl HttpRequest {
    /// Create a request with no headers and an empty body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    /// Create a request from a URL string.
    pub fn try_new(method: Method, url: &str) -> Result<Self, PipelineError> {
        Ok(Self::new(method, Url::parse(url)?))
    }

    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Add a header, replacing any existing values for the name.
    ///
    /// # Panics
    ///
    /// Panics if the header name or value is invalid.
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        K::Error: fmt::Debug,
        V: TryInto<HeaderValue>,
        V::Error: fmt::Debug,
    {
        let name = name.try_into().expect("invalid header name");
        let value = value.try_into().expect("invalid header value");
        self.headers.insert(name, value);
        self
    }

    /// Try to add a header, returning an error if the name or value is invalid.
    pub fn try_header(mut self, name: &str, value: &str) -> Result<Self, PipelineError> {
        let name: HeaderName = name
            .parse()
            .map_err(|_| PipelineError::invalid_request(format!("invalid header name: {}", name)))?;
        let value: HeaderValue = value.parse().map_err(|_| {
            PipelineError::invalid_request(format!("invalid header value for {}", name))
        })?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Set the body.
    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn url_mut(&mut self) -> &mut Url {
        &mut self.url
    }

    pub fn set_url(&mut self, url: Url) {
        self.url = url;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Get a header value as a string.
    ///
    /// Returns `None` if the header is absent or not valid UTF-8.
    pub fn header_str(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn get_body(&self) -> &RequestBody {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<RequestBody>) {
        self.body = body.into();
    }
}
