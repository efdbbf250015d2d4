//! End-to-end tests of the standard policy set over the hyper transport.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use httpipe_client::config::{PipelineOptions, standard_policies};
use httpipe_client::{
    BlockingPipeline, CallContext, HttpPipeline, HttpRequest, HyperTransport, PipelineError,
};
use http::Method;

#[derive(Clone, Default)]
struct Hits {
    flaky: Arc<AtomicUsize>,
}

async fn flaky(State(hits): State<Hits>) -> impl IntoResponse {
    if hits.flaky.fetch_add(1, Ordering::SeqCst) == 0 {
        (StatusCode::SERVICE_UNAVAILABLE, [("retry-after-ms", "1")], "busy")
    } else {
        (StatusCode::OK, [("retry-after-ms", "0")], "ok")
    }
}

async fn old() -> impl IntoResponse {
    (StatusCode::FOUND, [("location", "/new")], "")
}

async fn new() -> &'static str {
    "moved"
}

async fn request_id(headers: HeaderMap) -> String {
    headers
        .get("x-ms-client-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn echo(body: String) -> String {
    body
}

async fn start_server() -> (SocketAddr, Hits) {
    let hits = Hits::default();
    let app = Router::new()
        .route("/flaky", get(flaky))
        .route("/old", get(old))
        .route("/new", get(new))
        .route("/request-id", get(request_id))
        .route("/echo", post(echo))
        .with_state(hits.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hits)
}

fn pipeline() -> HttpPipeline {
    let options = PipelineOptions::from_json(
        r#"{ "retry": { "mode": "fixed", "max_retries": 2, "delay_ms": 5 } }"#,
    )
    .unwrap();
    HttpPipeline::builder()
        .http_client(HyperTransport::new().unwrap())
        .policies(standard_policies(&options, None).unwrap())
        .build()
        .unwrap()
}

fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{}{}", addr, path)
}

#[tokio::test]
async fn test_retry_over_http() {
    let (addr, hits) = start_server().await;

    let response = pipeline()
        .send(HttpRequest::try_new(Method::GET, &url(addr, "/flaky")).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "ok");
    assert_eq!(hits.flaky.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_redirect_over_http() {
    let (addr, _) = start_server().await;

    let response = pipeline()
        .send(HttpRequest::try_new(Method::GET, &url(addr, "/old")).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.request().url().path(), "/new");
    assert_eq!(response.text().await.unwrap(), "moved");
}

#[tokio::test]
async fn test_request_id_and_body() {
    let (addr, _) = start_server().await;
    let pipeline = pipeline();

    let response = pipeline
        .send(HttpRequest::try_new(Method::GET, &url(addr, "/request-id")).unwrap())
        .await
        .unwrap();
    let id = response.text().await.unwrap();
    assert_eq!(id.len(), 36);

    let request = HttpRequest::try_new(Method::POST, &url(addr, "/echo"))
        .unwrap()
        .body("hello pipeline");
    let response = pipeline.send(request).await.unwrap();
    assert_eq!(response.text().await.unwrap(), "hello pipeline");
}

#[tokio::test]
async fn test_connection_refused_is_retried_then_fails() {
    // Bind and drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = pipeline()
        .send(HttpRequest::try_new(Method::GET, &url(addr, "/")).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err.root_cause(), PipelineError::Transport(_)));
    assert_eq!(err.suppressed().len(), 2);
}

#[tokio::test]
async fn test_call_cancellation() {
    let (addr, _) = start_server().await;
    let mut ctx = CallContext::new(HttpRequest::try_new(Method::GET, &url(addr, "/new")).unwrap());
    ctx.cancellation().cancel();

    let err = pipeline().send_with_context(&mut ctx).await.unwrap_err();
    assert!(matches!(err, PipelineError::Canceled));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_pipeline() {
    let (addr, hits) = start_server().await;

    // Plain thread: no runtime context
    let worker = std::thread::spawn(move || {
        let blocking = BlockingPipeline::new(pipeline()).unwrap();
        let response = blocking
            .send(HttpRequest::try_new(Method::GET, &url(addr, "/flaky")).unwrap())
            .unwrap();
        response.status()
    });
    let status = tokio::task::spawn_blocking(move || worker.join().unwrap())
        .await
        .unwrap();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(hits.flaky.load(Ordering::SeqCst), 2);
}
