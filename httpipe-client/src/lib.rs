//! HTTP pipeline client for Rust.
//!
//! This crate sends HTTP requests through an ordered chain of policies in
//! front of a transport. Policies can rewrite the request, inspect the
//! response, short-circuit, or run the rest of the chain again, which is how
//! retries, redirects and authentication challenges are handled.
//!
//! ## Features
//!
//! - Retries with exponential or fixed backoff, honoring `Retry-After`
//! - Redirects with loop detection and `Authorization` stripping
//! - Bearer token authentication with cached, single-flight token refresh
//! - Redacted request/response logging through `tracing`
//! - Per-call cancellation and timeouts, per-attempt timeouts
//! - A hyper/rustls transport and a blocking adapter
//!
//! ## Example
//!
//! ```ignore
//! use httpipe_client::config::{PipelineOptions, standard_policies};
//! use httpipe_client::{HttpPipeline, HttpRequest, HyperTransport};
//!
//! let options = PipelineOptions::from_json(r#"{ "retry": { "max_retries": 5 } }"#)?;
//! let pipeline = HttpPipeline::builder()
//!     .http_client(HyperTransport::new()?)
//!     .policies(standard_policies(&options, None)?)
//!     .build()?;
//!
//! let response = pipeline
//!     .send(HttpRequest::try_new(http::Method::GET, "https://a.example/items")?)
//!     .await?;
//! println!("{}: {}", response.status(), response.text().await?);
//! ```
//!
//! ## Writing a Policy
//!
//! ```
//! use httpipe_client::{BoxFuture, CallContext, HttpResponse, Next, PipelineError, PipelinePolicy};
//!
//! #[derive(Debug)]
//! struct Tenant(&'static str);
//!
//! impl PipelinePolicy for Tenant {
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut CallContext,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, Result<HttpResponse, PipelineError>> {
//!         Box::pin(async move {
//!             ctx.request_mut()
//!                 .headers_mut()
//!                 .insert("x-tenant", http::HeaderValue::from_static(self.0));
//!             next.run(ctx).await
//!         })
//!     }
//! }
//! ```

mod blocking;
mod builder;
pub mod cache;
pub mod config;
mod context;
pub mod credential;
mod error;
mod pipeline;
pub mod policy;
mod transport;

#[cfg(test)]
mod test_support;

// Core types
pub use httpipe_core::{BodyStream, HttpRequest, HttpResponse, RequestBody, ResponseBody};

pub use error::{ErrorKind, PipelineError};

pub use blocking::BlockingPipeline;
pub use builder::HttpPipelineBuilder;
pub use context::{CallContext, CallerMethod, RetryCount};
pub use pipeline::{BoxFuture, FnPolicy, HttpClient, HttpPipeline, Next, PipelinePolicy};

pub use config::{
    Chain, DefaultRedirectStrategy, ExponentialBackoff, FixedDelay, FnIntercept, Intercept,
    InterceptPolicy, PipelineOptions, RedirectStrategy, RetryAfterUnit, RetryStrategy,
};
pub use credential::{AccessToken, TokenCredential, TokenRequestContext};
pub use policy::{BearerTokenAuthenticationPolicy, HttpLoggingPolicy, RedirectPolicy, RetryPolicy};

pub use transport::{
    HyperTransport, HyperTransportBuilder, TlsClientConfig, TransportBody, build_https_connector,
    default_tls_config, has_tls_support,
};

// Re-export http crate for convenience
pub use http;
