//! Scripted transport for unit tests.
//!
//! Responses are handed out in order. Every response body carries a recorder
//! that writes `close#n` to the event log when the body is dropped, next to
//! the `send#n` entries written by the transport.
//!
//! [`LogCapture`] collects `tracing` events for assertions on log output.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context as LayerContext, Layer, SubscriberExt};

use crate::pipeline::{BoxFuture, HttpClient};
use crate::{BodyStream, HttpRequest, HttpResponse, PipelineError, ResponseBody};

enum Step {
    Respond {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
    Fail(PipelineError),
}

#[derive(Default)]
pub(crate) struct ScriptedClient {
    steps: Mutex<VecDeque<Step>>,
    events: Arc<Mutex<Vec<String>>>,
    requests: Mutex<Vec<HttpRequest>>,
    sends: AtomicUsize,
}

impl std::fmt::Debug for ScriptedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedClient")
            .field("sends", &self.sends.load(Ordering::SeqCst))
            .finish()
    }
}

impl ScriptedClient {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(self, status: u16) -> Self {
        self.respond_with(status, &[], "")
    }

    pub(crate) fn respond_with(self, status: u16, headers: &[(&str, &str)], body: &str) -> Self {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        self.steps.lock().unwrap().push_back(Step::Respond {
            status: StatusCode::from_u16(status).unwrap(),
            headers: map,
            body: Bytes::copy_from_slice(body.as_bytes()),
        });
        self
    }

    pub(crate) fn fail(self, err: PipelineError) -> Self {
        self.steps.lock().unwrap().push_back(Step::Fail(err));
        self
    }

    pub(crate) fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl HttpClient for ScriptedClient {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, PipelineError>> {
        Box::pin(async move {
            let n = self.sends.fetch_add(1, Ordering::SeqCst) + 1;
            self.events.lock().unwrap().push(format!("send#{}", n));
            self.requests.lock().unwrap().push(request.clone());

            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Fail(err)) => Err(err),
                Some(Step::Respond {
                    status,
                    headers,
                    body,
                }) => Ok(tracked_response(request, status, headers, body, n, &self.events)),
                None => Ok(tracked_response(
                    request,
                    StatusCode::OK,
                    HeaderMap::new(),
                    Bytes::new(),
                    n,
                    &self.events,
                )),
            }
        })
    }
}

fn tracked_response(
    request: HttpRequest,
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    n: usize,
    events: &Arc<Mutex<Vec<String>>>,
) -> HttpResponse {
    let chunks: Vec<Result<Bytes, PipelineError>> = if body.is_empty() {
        Vec::new()
    } else {
        vec![Ok(body)]
    };
    let stream = TrackedBody {
        inner: Box::pin(futures::stream::iter(chunks)),
        _recorder: CloseRecorder {
            n,
            events: events.clone(),
        },
    };
    HttpResponse::new(request, status, headers, ResponseBody::streaming(stream))
}

struct CloseRecorder {
    n: usize,
    events: Arc<Mutex<Vec<String>>>,
}

impl Drop for CloseRecorder {
    fn drop(&mut self) {
        if let Ok(mut events) = self.events.lock() {
            events.push(format!("close#{}", self.n));
        }
    }
}

struct TrackedBody {
    inner: BodyStream,
    _recorder: CloseRecorder,
}

impl Stream for TrackedBody {
    type Item = Result<Bytes, PipelineError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

/// One captured `tracing` event.
#[derive(Clone, Debug, Default)]
pub(crate) struct LogEvent {
    pub(crate) message: String,
    pub(crate) fields: HashMap<String, String>,
}

impl LogEvent {
    pub(crate) fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

impl Visit for LogEvent {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let value = format!("{:?}", value);
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

/// Records every event emitted on the current thread while the guard lives.
#[derive(Clone, Default)]
pub(crate) struct LogCapture {
    events: Arc<Mutex<Vec<LogEvent>>>,
}

impl LogCapture {
    pub(crate) fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub(crate) fn events(&self) -> Vec<LogEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn with_message(&self, message: &str) -> Vec<LogEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.message == message)
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: LayerContext<'_, S>) {
        let mut captured = LogEvent::default();
        event.record(&mut captured);
        self.events.lock().unwrap().push(captured);
    }
}
