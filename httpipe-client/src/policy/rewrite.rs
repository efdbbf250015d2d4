//! Policies that rewrite the request URL.

use crate::pipeline::{BoxFuture, Next, PipelinePolicy};
use crate::{CallContext, HttpResponse, PipelineError};

/// Sends every attempt to a fixed host.
#[derive(Clone, Debug)]
pub struct HostPolicy {
    host: String,
}

impl HostPolicy {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

impl PipelinePolicy for HostPolicy {
    fn process<'a>(
        &'a self,
        ctx: &'a mut CallContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, PipelineError>> {
        Box::pin(async move {
            ctx.request_mut()
                .url_mut()
                .set_host(Some(&self.host))
                .map_err(|e| {
                    PipelineError::invalid_request(format!("cannot set host {}: {}", self.host, e))
                })?;
            next.run(ctx).await
        })
    }
}

/// Sets the port, leaving an explicit port alone unless `overwrite` is set.
#[derive(Clone, Copy, Debug)]
pub struct PortPolicy {
    port: u16,
    overwrite: bool,
}

impl PortPolicy {
    pub fn new(port: u16, overwrite: bool) -> Self {
        Self { port, overwrite }
    }
}

impl PipelinePolicy for PortPolicy {
    fn process<'a>(
        &'a self,
        ctx: &'a mut CallContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, PipelineError>> {
        Box::pin(async move {
            let url = ctx.request_mut().url_mut();
            if self.overwrite || url.port().is_none() {
                url.set_port(Some(self.port)).map_err(|_| {
                    PipelineError::invalid_request(format!("cannot set port on {}", url))
                })?;
            }
            next.run(ctx).await
        })
    }
}

/// Sets the scheme. Without `overwrite`, only `http` URLs are switched.
///
/// Only switches between special schemes such as `http` and `https`.
#[derive(Clone, Debug)]
pub struct ProtocolPolicy {
    scheme: String,
    overwrite: bool,
}

impl ProtocolPolicy {
    pub fn new(scheme: impl Into<String>, overwrite: bool) -> Self {
        Self {
            scheme: scheme.into(),
            overwrite,
        }
    }
}

impl PipelinePolicy for ProtocolPolicy {
    fn process<'a>(
        &'a self,
        ctx: &'a mut CallContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, PipelineError>> {
        Box::pin(async move {
            let url = ctx.request_mut().url_mut();
            if self.overwrite || url.scheme() == "http" {
                url.set_scheme(&self.scheme).map_err(|_| {
                    PipelineError::invalid_request(format!(
                        "cannot switch {} to scheme {}",
                        url, self.scheme
                    ))
                })?;
            }
            next.run(ctx).await
        })
    }
}
