//! Request body type for the hyper transport.
//!
//! [`TransportBody`] is what hyper sees: each attempt turns the pipeline's
//! [`RequestBody`] into a fresh one.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use http_body::{Body, Frame};
use pin_project_lite::pin_project;

use crate::{BodyStream, PipelineError, RequestBody};

pin_project! {
    /// An outgoing body for one attempt.
    #[project = TransportBodyProj]
    pub enum TransportBody {
        /// Empty request body.
        Empty,
        /// Full request body with all data available.
        Full {
            data: Option<Bytes>,
        },
        /// Streaming request body with an optional known length.
        Streaming {
            #[pin]
            stream: BodyStream,
            length: Option<u64>,
        },
    }
}

impl TransportBody {
    pub fn empty() -> Self {
        TransportBody::Empty
    }

    pub fn full(data: Bytes) -> Self {
        TransportBody::Full { data: Some(data) }
    }

    pub fn streaming<S>(stream: S, length: Option<u64>) -> Self
    where
        S: Stream<Item = Result<Bytes, PipelineError>> + Send + 'static,
    {
        TransportBody::Streaming {
            stream: Box::pin(stream),
            length,
        }
    }
}

impl From<&RequestBody> for TransportBody {
    fn from(body: &RequestBody) -> Self {
        match body {
            RequestBody::Empty => TransportBody::empty(),
            RequestBody::Full(data) if data.is_empty() => TransportBody::empty(),
            RequestBody::Full(data) => TransportBody::full(data.clone()),
            RequestBody::Replayable { length, .. } => {
                TransportBody::streaming(body.stream(), *length)
            }
        }
    }
}

impl Body for TransportBody {
    type Data = Bytes;
    type Error = PipelineError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            TransportBodyProj::Empty => Poll::Ready(None),
            TransportBodyProj::Full { data } => {
                Poll::Ready(data.take().map(|d| Ok(Frame::data(d))))
            }
            TransportBodyProj::Streaming { stream, .. } => match stream.poll_next(cx) {
                Poll::Ready(Some(Ok(data))) => Poll::Ready(Some(Ok(Frame::data(data)))),
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Pending => Poll::Pending,
            },
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            TransportBody::Empty => true,
            TransportBody::Full { data } => data.is_none(),
            TransportBody::Streaming { length, .. } => *length == Some(0),
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            TransportBody::Empty => http_body::SizeHint::with_exact(0),
            TransportBody::Full { data } => {
                http_body::SizeHint::with_exact(data.as_ref().map_or(0, |d| d.len() as u64))
            }
            TransportBody::Streaming {
                length: Some(len), ..
            } => http_body::SizeHint::with_exact(*len),
            TransportBody::Streaming { .. } => http_body::SizeHint::default(),
        }
    }
}

impl std::fmt::Debug for TransportBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportBody::Empty => write!(f, "TransportBody::Empty"),
            TransportBody::Full { data } => f
                .debug_struct("TransportBody::Full")
                .field("data_len", &data.as_ref().map(|d| d.len()))
                .finish(),
            TransportBody::Streaming { length, .. } => f
                .debug_struct("TransportBody::Streaming")
                .field("length", length)
                .finish(),
        }
    }
}
