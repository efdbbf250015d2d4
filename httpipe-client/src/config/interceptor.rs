//! Synchronous request/response hooks.
//!
//! [`Intercept`] is the lightweight alternative to a full
//! [`PipelinePolicy`](crate::PipelinePolicy): it can edit the request before
//! it is sent and the response after it arrives, but never re-runs the chain.
//! Wrap one in [`InterceptPolicy`] to put it into a pipeline.
//!
//! # Example
//!
//! ```
//! use httpipe_client::{Chain, FnIntercept, InterceptPolicy};
//! use http::HeaderValue;
//!
//! let tenant = FnIntercept::new(|ctx| {
//!     ctx.request_mut()
//!         .headers_mut()
//!         .insert("x-tenant", HeaderValue::from_static("contoso"));
//!     Ok(())
//! });
//! let trace = FnIntercept::new(|ctx| {
//!     ctx.request_mut()
//!         .headers_mut()
//!         .insert("x-trace", HeaderValue::from_static("1"));
//!     Ok(())
//! });
//!
//! let policy = InterceptPolicy::new(Chain(tenant, trace));
//! ```

use std::fmt;

use crate::pipeline::{BoxFuture, Next, PipelinePolicy};
use crate::{CallContext, HttpResponse, PipelineError};

/// Hooks around a single pass through the rest of the chain.
///
/// # Generic Composition
///
/// Hooks compose at compile time with [`Chain`]. The unit type `()` is the
/// no-op base case.
pub trait Intercept: Send + Sync {
    /// Called before the remainder of the chain runs.
    ///
    /// Returning an error aborts the call without sending anything.
    fn before_request(&self, ctx: &mut CallContext) -> Result<(), PipelineError> {
        let _ = ctx;
        Ok(())
    }

    /// Called with every response the remainder of the chain returns.
    fn after_response(&self, ctx: &CallContext, response: &mut HttpResponse) {
        let _ = (ctx, response);
    }
}

impl Intercept for () {}

/// A compile-time chain of two hooks.
///
/// `Chain<A, B>` runs `A` first for requests and `B` first for responses.
#[derive(Clone, Debug)]
pub struct Chain<A, B>(pub A, pub B);

impl<A, B> Intercept for Chain<A, B>
where
    A: Intercept,
    B: Intercept,
{
    #[inline]
    fn before_request(&self, ctx: &mut CallContext) -> Result<(), PipelineError> {
        self.0.before_request(ctx)?;
        self.1.before_request(ctx)
    }

    #[inline]
    fn after_response(&self, ctx: &CallContext, response: &mut HttpResponse) {
        // Reverse order for responses
        self.1.after_response(ctx, response);
        self.0.after_response(ctx, response);
    }
}

/// A request hook built from a closure.
pub struct FnIntercept<F> {
    func: F,
}

impl<F> FnIntercept<F>
where
    F: Fn(&mut CallContext) -> Result<(), PipelineError> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Intercept for FnIntercept<F>
where
    F: Fn(&mut CallContext) -> Result<(), PipelineError> + Send + Sync,
{
    fn before_request(&self, ctx: &mut CallContext) -> Result<(), PipelineError> {
        (self.func)(ctx)
    }
}

/// Adapter running an [`Intercept`] as a pipeline policy.
pub struct InterceptPolicy<I> {
    inner: I,
}

impl<I: Intercept> InterceptPolicy<I> {
    pub fn new(inner: I) -> Self {
        Self { inner }
    }
}

impl<I> fmt::Debug for InterceptPolicy<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptPolicy")
            .field("inner", &std::any::type_name::<I>())
            .finish()
    }
}

impl<I: Intercept> PipelinePolicy for InterceptPolicy<I> {
    fn process<'a>(
        &'a self,
        ctx: &'a mut CallContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, PipelineError>> {
        Box::pin(async move {
            self.inner.before_request(ctx)?;
            let mut response = next.run(ctx).await?;
            self.inner.after_response(ctx, &mut response);
            Ok(response)
        })
    }
}
