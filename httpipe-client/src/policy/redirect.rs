//! Redirect policy.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::{DefaultRedirectStrategy, RedirectStrategy};
use crate::pipeline::{BoxFuture, Next, PipelinePolicy};
use crate::{CallContext, HttpResponse, PipelineError};

/// Follows redirects according to a [`RedirectStrategy`].
///
/// The set of attempted URLs starts with the original request URL and lives
/// for one call, so `a -> b -> a` stops at the second hop. Every response
/// that is followed is closed before the redirected request goes out.
#[derive(Debug, Clone)]
pub struct RedirectPolicy {
    strategy: Arc<dyn RedirectStrategy>,
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self::new(DefaultRedirectStrategy::default())
    }
}

impl RedirectPolicy {
    pub fn new(strategy: impl RedirectStrategy + 'static) -> Self {
        Self {
            strategy: Arc::new(strategy),
        }
    }

    pub fn with_shared_strategy(strategy: Arc<dyn RedirectStrategy>) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> &dyn RedirectStrategy {
        self.strategy.as_ref()
    }
}

impl PipelinePolicy for RedirectPolicy {
    fn process<'a>(
        &'a self,
        ctx: &'a mut CallContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, PipelineError>> {
        Box::pin(async move {
            let mut attempted = HashSet::from([ctx.request().url().clone()]);
            let mut count = 0u32;
            let mut issued = ctx.request().clone();
            let mut response = next.run(ctx).await?;

            while self
                .strategy
                .should_attempt_redirect(ctx, &response, count, &attempted)
            {
                let request = match self.strategy.create_redirect_request(&issued, &response) {
                    Ok(request) => request,
                    Err(err) => {
                        response.close().await;
                        return Err(err);
                    }
                };
                tracing::debug!(
                    status = response.status().as_u16(),
                    from = %response.request().url(),
                    to = %request.url(),
                    redirect = count + 1,
                    "following redirect"
                );
                attempted.insert(request.url().clone());
                response.close().await;
                issued = request.clone();
                ctx.set_request(request);
                count += 1;
                response = next.run(ctx).await?;
            }
            Ok(response)
        })
    }
}
