//! Incoming response model.
//!
//! A response owns its body. Responses that will not reach the caller must be
//! released with [`HttpResponse::close`] so the transport can reuse the
//! underlying connection.

use std::fmt;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use http::{HeaderMap, StatusCode};

use crate::request::{BodyStream, HttpRequest};
use crate::PipelineError;

/// Maximum number of bytes read from a discarded body before giving up on
/// connection reuse and dropping it.
pub const DRAIN_LIMIT: usize = 64 * 1024;

/// A response body.
#[derive(Default)]
pub enum ResponseBody {
    /// No body.
    #[default]
    Empty,
    /// Fully buffered body.
    Full(Bytes),
    /// Body still being received.
    Streaming(BodyStream),
}

impl ResponseBody {
    /// Create a buffered body.
    pub fn full(data: impl Into<Bytes>) -> Self {
        ResponseBody::Full(data.into())
    }

    /// Create a streaming body.
    pub fn streaming<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, PipelineError>> + Send + 'static,
    {
        ResponseBody::Streaming(Box::pin(stream))
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, ResponseBody::Streaming(_))
    }

    /// Read the whole body into memory.
    pub async fn collect(self) -> Result<Bytes, PipelineError> {
        match self {
            ResponseBody::Empty => Ok(Bytes::new()),
            ResponseBody::Full(data) => Ok(data),
            ResponseBody::Streaming(mut stream) => {
                let mut buf = BytesMut::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }

    /// Drain up to [`DRAIN_LIMIT`] bytes and release the body.
    ///
    /// Errors while draining are ignored: the body is being thrown away.
    pub async fn drain(self) {
        let ResponseBody::Streaming(mut stream) = self else {
            return;
        };
        let mut drained = 0usize;
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(chunk) => {
                    drained += chunk.len();
                    if drained >= DRAIN_LIMIT {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Empty => write!(f, "ResponseBody::Empty"),
            ResponseBody::Full(data) => f
                .debug_struct("ResponseBody::Full")
                .field("data_len", &data.len())
                .finish(),
            ResponseBody::Streaming(_) => write!(f, "ResponseBody::Streaming"),
        }
    }
}

impl From<Bytes> for ResponseBody {
    fn from(data: Bytes) -> Self {
        ResponseBody::Full(data)
    }
}

impl From<&'static str> for ResponseBody {
    fn from(data: &'static str) -> Self {
        ResponseBody::Full(Bytes::from_static(data.as_bytes()))
    }
}

/// An HTTP response together with the request that produced it.
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    request: HttpRequest,
    body: ResponseBody,
}

impl HttpResponse {
    pub fn new(
        request: HttpRequest,
        status: StatusCode,
        headers: HeaderMap,
        body: impl Into<ResponseBody>,
    ) -> Self {
        Self {
            status,
            headers,
            request,
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Get a header value as a string.
    pub fn header_str(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The request as it was handed to the transport.
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Take the body out, leaving an empty one behind.
    pub fn take_body(&mut self) -> ResponseBody {
        std::mem::take(&mut self.body)
    }

    pub fn set_body(&mut self, body: impl Into<ResponseBody>) {
        self.body = body.into();
    }

    /// Decompose into request, status, headers and body.
    pub fn into_parts(self) -> (HttpRequest, StatusCode, HeaderMap, ResponseBody) {
        (self.request, self.status, self.headers, self.body)
    }

    /// Read the whole body.
    pub async fn bytes(self) -> Result<Bytes, PipelineError> {
        self.body.collect().await
    }

    /// Read the whole body as UTF-8 text, replacing invalid sequences.
    pub async fn text(self) -> Result<String, PipelineError> {
        let bytes = self.body.collect().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Buffer a streaming body in place so it can be read more than once.
    pub async fn buffer(mut self) -> Result<Self, PipelineError> {
        if self.body.is_streaming() {
            let data = self.take_body().collect().await?;
            self.body = ResponseBody::Full(data);
        }
        Ok(self)
    }

    /// Release the response, draining a bounded amount of the body first.
    pub async fn close(self) {
        self.body.drain().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request() -> HttpRequest {
        HttpRequest::try_new(Method::GET, "https://a.example/").unwrap()
    }

    #[tokio::test]
    async fn test_collect_streaming_body() {
        let body = ResponseBody::streaming(futures::stream::iter(vec![
            Ok(Bytes::from("ab")),
            Ok(Bytes::from("cd")),
        ]));
        let response = HttpResponse::new(request(), StatusCode::OK, HeaderMap::new(), body);
        assert_eq!(response.text().await.unwrap(), "abcd");
    }

    #[tokio::test]
    async fn test_collect_propagates_stream_error() {
        let body = ResponseBody::streaming(futures::stream::iter(vec![
            Ok(Bytes::from("ab")),
            Err(PipelineError::body("reset")),
        ]));
        assert!(body.collect().await.is_err());
    }

    #[tokio::test]
    async fn test_buffer_makes_body_full() {
        let body = ResponseBody::streaming(futures::stream::iter(vec![Ok(Bytes::from("x"))]));
        let response = HttpResponse::new(request(), StatusCode::OK, HeaderMap::new(), body)
            .buffer()
            .await
            .unwrap();
        assert!(matches!(response.body(), ResponseBody::Full(_)));
    }

    #[tokio::test]
    async fn test_drain_stops_at_limit() {
        let polled = Arc::new(AtomicUsize::new(0));
        let counter = polled.clone();
        let chunk = Bytes::from(vec![0u8; 16 * 1024]);
        let stream = futures::stream::repeat(chunk).map(move |c| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(c)
        });
        ResponseBody::streaming(stream).drain().await;
        assert_eq!(polled.load(Ordering::SeqCst), DRAIN_LIMIT / (16 * 1024));
    }

    #[test]
    fn test_response_keeps_request() {
        let response = HttpResponse::new(request(), StatusCode::ACCEPTED, HeaderMap::new(), "ok");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.request().url().as_str(), "https://a.example/");
    }
}
