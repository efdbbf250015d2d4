//! Strategies, hooks and options.
//!
//! This module contains the pieces policies are configured with:
//! - [`RetryStrategy`]: Whether and when to retry ([`ExponentialBackoff`], [`FixedDelay`])
//! - [`RedirectStrategy`]: Whether and where to redirect ([`DefaultRedirectStrategy`])
//! - [`Intercept`]: Synchronous request/response hooks
//! - [`PipelineOptions`]: Deserializable settings for [`standard_policies`]

mod interceptor;
mod options;
mod redirect;
mod retry;

pub use interceptor::{Chain, FnIntercept, Intercept, InterceptPolicy};
pub use options::{PipelineOptions, RedirectOptions, RetryMode, RetryOptions, standard_policies};
pub use redirect::{DefaultRedirectStrategy, RedirectStrategy, is_redirect_status};
pub use retry::{
    ExponentialBackoff, FixedDelay, RetryAfterUnit, RetryStrategy, default_max_retries,
    is_retryable_status,
};

/// Default values for retries and redirects.
pub mod defaults {
    pub use super::redirect::defaults::{LOCATION_HEADER, MAX_ATTEMPTS as MAX_REDIRECTS};
    pub use super::retry::defaults::{
        BASE_DELAY, JITTER, MAX_DELAY, MAX_RETRIES, MAX_RETRIES_ENV, RETRY_STATUSES,
    };
}
