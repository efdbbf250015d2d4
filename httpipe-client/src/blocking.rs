//! Synchronous adapter over [`HttpPipeline`].
//!
//! The same async policy chain runs on a private current-thread runtime, so
//! retry delays block only the calling thread. Response bodies are read in
//! full before `send` returns.
//!
//! # Example
//!
//! ```ignore
//! use httpipe_client::{BlockingPipeline, HttpPipeline, HttpRequest, HyperTransport};
//!
//! let pipeline = HttpPipeline::builder()
//!     .http_client(HyperTransport::new()?)
//!     .build()?;
//! let blocking = BlockingPipeline::new(pipeline)?;
//!
//! let response = blocking.send(HttpRequest::try_new(http::Method::GET, "https://a.example/")?)?;
//! println!("{}", response.status());
//! ```

use tokio::runtime::{Builder, Handle, Runtime};

use crate::{CallContext, HttpPipeline, HttpRequest, HttpResponse, PipelineError};

/// Drives an [`HttpPipeline`] from synchronous code.
#[derive(Debug)]
pub struct BlockingPipeline {
    inner: HttpPipeline,
    runtime: Runtime,
}

impl BlockingPipeline {
    pub fn new(pipeline: HttpPipeline) -> Result<Self, PipelineError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| PipelineError::configuration(format!("cannot start runtime: {}", e)))?;
        Ok(Self {
            inner: pipeline,
            runtime,
        })
    }

    pub fn pipeline(&self) -> &HttpPipeline {
        &self.inner
    }

    /// Send a request and wait for the complete response.
    pub fn send(&self, request: HttpRequest) -> Result<HttpResponse, PipelineError> {
        let mut ctx = CallContext::new(request);
        self.send_with_context(&mut ctx)
    }

    /// Fails with a configuration error when called from inside an async runtime.
    pub fn send_with_context(&self, ctx: &mut CallContext) -> Result<HttpResponse, PipelineError> {
        if Handle::try_current().is_ok() {
            return Err(PipelineError::configuration(
                "blocking pipeline used inside an async runtime",
            ));
        }
        self.runtime.block_on(async {
            let response = self.inner.send_with_context(ctx).await?;
            response.buffer().await
        })
    }
}
