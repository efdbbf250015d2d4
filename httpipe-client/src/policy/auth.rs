//! Bearer token authentication.
//!
//! [`BearerTokenAuthenticationPolicy`] attaches `Authorization: Bearer ...`
//! to every attempt and answers a `401` carrying a `WWW-Authenticate`
//! challenge at most once per call.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use http::{HeaderValue, StatusCode};

use crate::credential::{AccessTokenCache, TokenCredential, TokenRequestContext};
use crate::pipeline::{BoxFuture, Next, PipelinePolicy};
use crate::{CallContext, HttpRequest, HttpResponse, PipelineError};

/// One challenge from a `WWW-Authenticate` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthChallenge {
    pub scheme: String,
    /// Parameters in header order, names lowercased.
    pub params: Vec<(String, String)>,
}

impl AuthChallenge {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Parse a `WWW-Authenticate` header value into its challenges.
///
/// Accepts several comma-separated challenges, quoted values with escapes
/// and bare token68 values. Malformed trailing input is skipped.
///
/// # Example
///
/// ```
/// use httpipe_client::policy::parse_challenges;
///
/// let challenges = parse_challenges(r#"Bearer realm="", error="insufficient_claims", Basic realm="x""#);
/// assert_eq!(challenges.len(), 2);
/// assert_eq!(challenges[0].param("error"), Some("insufficient_claims"));
/// ```
pub fn parse_challenges(header: &str) -> Vec<AuthChallenge> {
    let mut parser = ChallengeParser {
        input: header.as_bytes(),
        pos: 0,
    };
    let mut challenges = Vec::new();
    loop {
        parser.skip_separators();
        let Some(scheme) = parser.token() else {
            break;
        };
        let mut challenge = AuthChallenge {
            scheme,
            params: Vec::new(),
        };
        loop {
            parser.skip_separators();
            let start = parser.pos;
            let Some(name) = parser.token() else {
                break;
            };
            parser.skip_whitespace();
            if !parser.eat(b'=') {
                // Start of the next challenge
                parser.pos = start;
                break;
            }
            parser.skip_whitespace();
            let value = if parser.peek() == Some(b'"') {
                parser.quoted()
            } else {
                parser.token68()
            };
            challenge.params.push((name.to_ascii_lowercase(), value));
        }
        challenges.push(challenge);
    }
    challenges
}

struct ChallengeParser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl ChallengeParser<'_> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b',')) {
            self.pos += 1;
        }
    }

    fn take_while(&mut self, keep: impl Fn(u8) -> bool) -> Option<String> {
        let start = self.pos;
        while self.peek().is_some_and(&keep) {
            self.pos += 1;
        }
        (self.pos > start)
            .then(|| String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }

    fn token(&mut self) -> Option<String> {
        self.take_while(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b))
    }

    fn token68(&mut self) -> String {
        self.take_while(|b| b.is_ascii_alphanumeric() || b"-._~+/=".contains(&b))
            .unwrap_or_default()
    }

    fn quoted(&mut self) -> String {
        let mut value = Vec::new();
        self.pos += 1;
        while let Some(byte) = self.peek() {
            self.pos += 1;
            match byte {
                b'"' => break,
                b'\\' => {
                    if let Some(escaped) = self.peek() {
                        value.push(escaped);
                        self.pos += 1;
                    }
                }
                other => value.push(other),
            }
        }
        String::from_utf8_lossy(&value).into_owned()
    }
}

/// Turns a `401` challenge into a new token request.
pub trait ChallengeHandler: Send + Sync + fmt::Debug {
    /// Return a token request to retry with, or `None` to hand the 401 back.
    fn on_challenge(
        &self,
        ctx: &CallContext,
        response: &HttpResponse,
        token_request: &TokenRequestContext,
    ) -> Option<TokenRequestContext>;
}

/// Never answers a challenge.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoChallengeHandler;

impl ChallengeHandler for NoChallengeHandler {
    fn on_challenge(
        &self,
        _ctx: &CallContext,
        _response: &HttpResponse,
        _token_request: &TokenRequestContext,
    ) -> Option<TokenRequestContext> {
        None
    }
}

/// Answers continuous access evaluation challenges.
///
/// Triggers on `Bearer` challenges with `error="insufficient_claims"` and a
/// base64 `claims` parameter, which becomes the claims of the new token
/// request.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClaimsChallengeHandler;

fn decode_claims(encoded: &str) -> Option<String> {
    let bytes = STANDARD
        .decode(encoded)
        .or_else(|_| STANDARD_NO_PAD.decode(encoded))
        .or_else(|_| URL_SAFE_NO_PAD.decode(encoded.trim_end_matches('=')))
        .ok()?;
    String::from_utf8(bytes).ok().filter(|s| !s.is_empty())
}

impl ChallengeHandler for ClaimsChallengeHandler {
    fn on_challenge(
        &self,
        _ctx: &CallContext,
        response: &HttpResponse,
        token_request: &TokenRequestContext,
    ) -> Option<TokenRequestContext> {
        response
            .headers()
            .get_all(WWW_AUTHENTICATE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(parse_challenges)
            .filter(|c| c.scheme.eq_ignore_ascii_case("bearer"))
            .filter(|c| c.param("error") == Some("insufficient_claims"))
            .find_map(|c| c.param("claims").and_then(decode_claims))
            .map(|claims| token_request.clone().with_claims(claims))
    }
}

/// Authorizes requests with a bearer token from a [`TokenCredential`].
///
/// Requests to anything but `https` fail with [`PipelineError::Insecure`]
/// before a token is fetched.
///
/// # Example
///
/// ```
/// use httpipe_client::credential::{AccessToken, StaticTokenCredential};
/// use httpipe_client::policy::{BearerTokenAuthenticationPolicy, ClaimsChallengeHandler};
/// use std::sync::Arc;
/// use std::time::{Duration, SystemTime};
///
/// let credential = StaticTokenCredential::new(AccessToken::new(
///     "token",
///     SystemTime::now() + Duration::from_secs(3600),
/// ));
/// let policy = BearerTokenAuthenticationPolicy::new(
///     Arc::new(credential),
///     ["https://a.example/.default"],
/// )
/// .challenge_handler(ClaimsChallengeHandler);
/// ```
#[derive(Debug)]
pub struct BearerTokenAuthenticationPolicy {
    cache: AccessTokenCache,
    token_request: TokenRequestContext,
    challenge: Arc<dyn ChallengeHandler>,
}

impl BearerTokenAuthenticationPolicy {
    pub fn new<I, S>(credential: Arc<dyn TokenCredential>, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cache: AccessTokenCache::new(credential),
            token_request: TokenRequestContext::new(scopes),
            challenge: Arc::new(NoChallengeHandler),
        }
    }

    pub fn tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.token_request = self.token_request.with_tenant_id(tenant_id);
        self
    }

    pub fn challenge_handler(mut self, handler: impl ChallengeHandler + 'static) -> Self {
        self.challenge = Arc::new(handler);
        self
    }

    pub fn token_request(&self) -> &TokenRequestContext {
        &self.token_request
    }

    async fn authorize(
        &self,
        request: &mut HttpRequest,
        token_request: &TokenRequestContext,
        force: bool,
    ) -> Result<(), PipelineError> {
        let token = self.cache.get_token(token_request, force).await?;
        let mut value = HeaderValue::try_from(format!("Bearer {}", token.token()))
            .map_err(|_| PipelineError::authentication("token is not a valid header value"))?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }
}

impl PipelinePolicy for BearerTokenAuthenticationPolicy {
    fn process<'a>(
        &'a self,
        ctx: &'a mut CallContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, PipelineError>> {
        Box::pin(async move {
            if ctx.request().url().scheme() != "https" {
                return Err(PipelineError::Insecure(format!(
                    "bearer token refused for {} url",
                    ctx.request().url().scheme()
                )));
            }
            let pristine = ctx.request().clone();
            self.authorize(ctx.request_mut(), &self.token_request, false)
                .await?;
            let response = next.run(ctx).await?;

            if response.status() != StatusCode::UNAUTHORIZED
                || !response.headers().contains_key(WWW_AUTHENTICATE)
            {
                return Ok(response);
            }
            let Some(token_request) = self
                .challenge
                .on_challenge(ctx, &response, &self.token_request)
            else {
                return Ok(response);
            };

            tracing::debug!(
                try_count = ctx.retry_count(),
                caller_method = ctx.caller_method(),
                "answering authentication challenge"
            );
            response.close().await;
            let mut request = pristine;
            self.authorize(&mut request, &token_request, true).await?;
            ctx.set_request(request);
            next.run(ctx).await
        })
    }
}
