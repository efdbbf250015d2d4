//! Access tokens and the credentials that produce them.
//!
//! [`TokenCredential`] is the seam to an identity provider. The pipeline never
//! calls a credential directly; it goes through an [`AccessTokenCache`], which
//! refreshes ahead of expiry and lets only one refresh run at a time.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::Mutex;

use crate::PipelineError;
use crate::pipeline::BoxFuture;

/// Tokens are refreshed this long before they expire.
pub const REFRESH_OFFSET: Duration = Duration::from_secs(5 * 60);

/// A bearer token and its expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    token: String,
    expires_on: SystemTime,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_on: SystemTime) -> Self {
        Self {
            token: token.into(),
            expires_on,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_on(&self) -> SystemTime {
        self.expires_on
    }

    /// Whether the token is past its expiry at `now`.
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        now >= self.expires_on
    }

    /// Whether the token is inside the refresh window at `now`.
    pub fn needs_refresh_at(&self, now: SystemTime) -> bool {
        now + REFRESH_OFFSET >= self.expires_on
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"REDACTED")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// What a token is requested for.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenRequestContext {
    pub scopes: Vec<String>,
    /// Claims requested by a challenge, as a JSON document.
    pub claims: Option<String>,
    pub tenant_id: Option<String>,
}

impl TokenRequestContext {
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: scopes.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_claims(mut self, claims: impl Into<String>) -> Self {
        self.claims = Some(claims.into());
        self
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }
}

/// Produces access tokens.
pub trait TokenCredential: Send + Sync + fmt::Debug {
    fn get_token<'a>(
        &'a self,
        request: &'a TokenRequestContext,
    ) -> BoxFuture<'a, Result<AccessToken, PipelineError>>;
}

/// A credential that always returns the same token.
#[derive(Clone, Debug)]
pub struct StaticTokenCredential {
    token: AccessToken,
}

impl StaticTokenCredential {
    pub fn new(token: AccessToken) -> Self {
        Self { token }
    }
}

impl TokenCredential for StaticTokenCredential {
    fn get_token<'a>(
        &'a self,
        _request: &'a TokenRequestContext,
    ) -> BoxFuture<'a, Result<AccessToken, PipelineError>> {
        Box::pin(async move { Ok(self.token.clone()) })
    }
}

#[derive(Debug)]
struct Cached {
    context: TokenRequestContext,
    token: AccessToken,
}

/// Caches the token of one credential.
///
/// The lock is held across the credential call, so concurrent callers that
/// all find the token stale wait for a single refresh instead of each
/// starting their own. A cached token for a different request context is
/// never returned.
#[derive(Debug)]
pub struct AccessTokenCache {
    credential: Arc<dyn TokenCredential>,
    cached: Mutex<Option<Cached>>,
}

impl AccessTokenCache {
    pub fn new(credential: Arc<dyn TokenCredential>) -> Self {
        Self {
            credential,
            cached: Mutex::new(None),
        }
    }

    /// Get a token for `context`, refreshing when needed or when `force` is set.
    ///
    /// When a refresh fails while the cached token is still valid, the cached
    /// token is returned and the failure is logged.
    pub async fn get_token(
        &self,
        context: &TokenRequestContext,
        force: bool,
    ) -> Result<AccessToken, PipelineError> {
        let mut cached = self.cached.lock().await;
        let now = SystemTime::now();

        let current = cached
            .as_ref()
            .filter(|c| &c.context == context)
            .map(|c| c.token.clone());
        if let Some(token) = &current {
            if !force && !token.needs_refresh_at(now) {
                return Ok(token.clone());
            }
        }

        match self.credential.get_token(context).await {
            Ok(token) => {
                *cached = Some(Cached {
                    context: context.clone(),
                    token: token.clone(),
                });
                Ok(token)
            }
            Err(err) => match current {
                Some(token) if !token.is_expired_at(SystemTime::now()) => {
                    tracing::warn!(error = %err, "token refresh failed, using cached token");
                    Ok(token)
                }
                _ => Err(err),
            },
        }
    }
}
