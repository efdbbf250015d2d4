//! Built-in pipeline policies.
//!
//! - [`RetryPolicy`] / [`RedirectPolicy`]: re-run the rest of the chain
//! - [`BearerTokenAuthenticationPolicy`]: bearer tokens and `401` challenges
//! - [`HttpLoggingPolicy`]: redacted request/response logging
//! - [`AddHeadersPolicy`], [`AddDatePolicy`], [`RequestIdPolicy`], [`UserAgentPolicy`]
//! - [`HostPolicy`], [`PortPolicy`], [`ProtocolPolicy`]: URL rewriting
//! - [`TimeoutPolicy`]: per-attempt deadline

mod auth;
mod headers;
mod logging;
mod redirect;
mod retry;
mod rewrite;
mod timeout;

pub use auth::{
    AuthChallenge, BearerTokenAuthenticationPolicy, ChallengeHandler, ClaimsChallengeHandler,
    NoChallengeHandler, parse_challenges,
};
pub use headers::{
    AddDatePolicy, AddHeadersPolicy, MAX_APPLICATION_ID_LENGTH, REQUEST_ID_HEADER,
    RequestIdPolicy, UserAgentPolicy,
};
pub use logging::{
    HttpLogDetailLevel, HttpLogOptions, HttpLoggingPolicy, MAX_BODY_LOG_SIZE, REDACTED, is_binary,
};
pub use redirect::RedirectPolicy;
pub use retry::{RetryPolicy, default_retry_after_headers, parse_retry_after};
pub use rewrite::{HostPolicy, PortPolicy, ProtocolPolicy};
pub use timeout::TimeoutPolicy;
