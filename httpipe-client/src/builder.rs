//! Builder for [`HttpPipeline`].
//!
//! Provides a fluent API for assembling the policy chain.

use std::sync::Arc;

use crate::pipeline::{HttpClient, HttpPipeline, PipelinePolicy};
use crate::PipelineError;

/// Builder for creating an [`HttpPipeline`].
///
/// Policies run in the order they are added.
///
/// # Example
///
/// ```ignore
/// use httpipe_client::{HttpPipeline, HyperTransport, RetryPolicy, RedirectPolicy};
///
/// let pipeline = HttpPipeline::builder()
///     .http_client(HyperTransport::new()?)
///     .policy(RedirectPolicy::default())
///     .policy(RetryPolicy::default())
///     .build()?;
/// ```
#[derive(Default)]
pub struct HttpPipelineBuilder {
    client: Option<Arc<dyn HttpClient>>,
    policies: Vec<Arc<dyn PipelinePolicy>>,
}

impl std::fmt::Debug for HttpPipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPipelineBuilder")
            .field("client", &self.client.is_some())
            .field("policy_count", &self.policies.len())
            .finish()
    }
}

impl HttpPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the transport at the end of the chain.
    pub fn http_client<C: HttpClient + 'static>(mut self, client: C) -> Self {
        self.client = Some(Arc::new(client));
        self
    }

    /// Set a transport that is shared with other pipelines.
    pub fn shared_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Append a policy.
    pub fn policy<P: PipelinePolicy + 'static>(mut self, policy: P) -> Self {
        self.policies.push(Arc::new(policy));
        self
    }

    /// Append several already shared policies.
    pub fn policies<I>(mut self, policies: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn PipelinePolicy>>,
    {
        self.policies.extend(policies);
        self
    }

    /// Build the pipeline.
    ///
    /// Fails when no transport was set.
    pub fn build(self) -> Result<HttpPipeline, PipelineError> {
        let client = self
            .client
            .ok_or_else(|| PipelineError::configuration("pipeline requires an http client"))?;
        Ok(HttpPipeline::new(client, self.policies))
    }
}
