//! Pipeline options and the standard policy set.
//!
//! [`PipelineOptions`] can be deserialized from JSON or any other serde
//! format. Every field is optional:
//!
//! ```json
//! {
//!   "retry": { "mode": "fixed", "max_retries": 2, "delay_ms": 250 },
//!   "redirect": { "max_attempts": 5 },
//!   "logging": { "level": "headers" },
//!   "timeout_ms": 30000,
//!   "application_id": "inventory-sync"
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use serde::Deserialize;

use super::redirect::{DefaultRedirectStrategy, defaults as redirect_defaults};
use super::retry::{ExponentialBackoff, FixedDelay, RetryAfterUnit, RetryStrategy, defaults};
use crate::PipelineError;
use crate::pipeline::PipelinePolicy;
use crate::policy::{
    AddDatePolicy, AddHeadersPolicy, BearerTokenAuthenticationPolicy, HttpLogOptions,
    HttpLoggingPolicy, RedirectPolicy, RequestIdPolicy, RetryPolicy, TimeoutPolicy,
    UserAgentPolicy,
};

/// Which retry strategy to build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryMode {
    #[default]
    Exponential,
    Fixed,
}

/// Retry settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryOptions {
    pub mode: RetryMode,
    /// Falls back to `HTTPIPE_MAX_RETRIES`, then 3.
    pub max_retries: Option<i32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    /// Delay for [`RetryMode::Fixed`].
    pub delay_ms: Option<u64>,
    /// Header read for the server-requested delay before the well-known ones.
    pub retry_after_header: Option<String>,
    pub retry_after_unit: RetryAfterUnit,
}

impl RetryOptions {
    /// Build the configured strategy.
    pub fn strategy(&self) -> Result<Arc<dyn RetryStrategy>, PipelineError> {
        let max_retries = match self.max_retries {
            Some(n) => n,
            None => i32::try_from(super::retry::default_max_retries()).unwrap_or(i32::MAX),
        };
        let strategy: Arc<dyn RetryStrategy> = match self.mode {
            RetryMode::Exponential => Arc::new(ExponentialBackoff::new(
                max_retries,
                self.base_delay_ms
                    .map_or(defaults::BASE_DELAY, Duration::from_millis),
                self.max_delay_ms
                    .map_or(defaults::MAX_DELAY, Duration::from_millis),
            )?),
            RetryMode::Fixed => Arc::new(FixedDelay::new(
                max_retries,
                self.delay_ms
                    .map_or(defaults::BASE_DELAY, Duration::from_millis),
            )?),
        };
        Ok(strategy)
    }

    /// Build a [`RetryPolicy`] from these settings.
    pub fn policy(&self) -> Result<RetryPolicy, PipelineError> {
        let policy = RetryPolicy::with_shared_strategy(self.strategy()?);
        match &self.retry_after_header {
            Some(name) => policy.retry_after_header(name, self.retry_after_unit),
            None => Ok(policy),
        }
    }
}

/// Redirect settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RedirectOptions {
    pub max_attempts: Option<u32>,
    pub location_header: Option<String>,
    /// Method names; defaults to `GET` and `HEAD`.
    pub allowed_methods: Option<Vec<String>>,
}

impl RedirectOptions {
    pub fn strategy(&self) -> Result<DefaultRedirectStrategy, PipelineError> {
        let allowed_methods = match &self.allowed_methods {
            Some(names) => names
                .iter()
                .map(|name| {
                    Method::from_bytes(name.to_ascii_uppercase().as_bytes()).map_err(|_| {
                        PipelineError::configuration(format!("invalid redirect method: {}", name))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => vec![Method::GET, Method::HEAD],
        };
        DefaultRedirectStrategy::new(
            self.max_attempts.unwrap_or(redirect_defaults::MAX_ATTEMPTS),
            self.location_header
                .as_deref()
                .unwrap_or(redirect_defaults::LOCATION_HEADER),
            allowed_methods,
        )
    }
}

/// Everything [`standard_policies`] needs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    pub retry: RetryOptions,
    pub redirect: RedirectOptions,
    pub logging: HttpLogOptions,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Prefix of the `User-Agent` header.
    pub application_id: Option<String>,
    /// Header carrying the client request id.
    pub request_id_header: Option<String>,
    /// Headers added to every request.
    pub headers: BTreeMap<String, String>,
}

impl PipelineOptions {
    /// Parse options from JSON.
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(json)
            .map_err(|e| PipelineError::configuration(format!("invalid pipeline options: {}", e)))
    }
}

/// Build the standard policy list in its canonical order.
///
/// 1. `UserAgentPolicy`
/// 2. `RequestIdPolicy`
/// 3. `AddHeadersPolicy`
/// 4. `BearerTokenAuthenticationPolicy`, when `auth` is given
/// 5. `RedirectPolicy`
/// 6. `RetryPolicy`
/// 7. `TimeoutPolicy`, when `timeout_ms` is set
/// 8. `AddDatePolicy`
/// 9. `HttpLoggingPolicy`
///
/// Everything from `RetryPolicy` on runs once per attempt.
///
/// # Example
///
/// ```
/// use httpipe_client::config::{PipelineOptions, standard_policies};
///
/// let options = PipelineOptions::from_json(r#"{ "retry": { "max_retries": 1 } }"#)?;
/// let policies = standard_policies(&options, None)?;
/// assert_eq!(policies.len(), 7);
/// # Ok::<(), httpipe_client::PipelineError>(())
/// ```
pub fn standard_policies(
    options: &PipelineOptions,
    auth: Option<BearerTokenAuthenticationPolicy>,
) -> Result<Vec<Arc<dyn PipelinePolicy>>, PipelineError> {
    let mut policies: Vec<Arc<dyn PipelinePolicy>> = Vec::with_capacity(9);

    policies.push(Arc::new(UserAgentPolicy::new(
        options.application_id.as_deref(),
    )?));
    policies.push(Arc::new(match &options.request_id_header {
        Some(header) => RequestIdPolicy::new(header)?,
        None => RequestIdPolicy::default(),
    }));
    policies.push(Arc::new(AddHeadersPolicy::try_from_pairs(&options.headers)?));
    if let Some(auth) = auth {
        policies.push(Arc::new(auth));
    }
    policies.push(Arc::new(RedirectPolicy::new(options.redirect.strategy()?)));
    policies.push(Arc::new(options.retry.policy()?));
    if let Some(ms) = options.timeout_ms {
        policies.push(Arc::new(TimeoutPolicy::new(Duration::from_millis(ms))));
    }
    policies.push(Arc::new(AddDatePolicy));
    policies.push(Arc::new(HttpLoggingPolicy::new(options.logging.clone())));

    Ok(policies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::HttpLogDetailLevel;

    #[test]
    fn test_empty_json_gives_defaults() {
        let options = PipelineOptions::from_json("{}").unwrap();
        assert_eq!(options, PipelineOptions::default());
        assert_eq!(options.logging.level, HttpLogDetailLevel::None);
    }

    #[test]
    fn test_parse_full_options() {
        let options = PipelineOptions::from_json(
            r#"{
                "retry": {
                    "mode": "fixed",
                    "max_retries": 2,
                    "delay_ms": 250,
                    "retry_after_header": "x-wait",
                    "retry_after_unit": "millis"
                },
                "redirect": { "max_attempts": 5, "allowed_methods": ["get", "post"] },
                "logging": { "level": "body_and_headers" },
                "timeout_ms": 1500,
                "application_id": "sync",
                "headers": { "x-env": "prod" }
            }"#,
        )
        .unwrap();

        assert_eq!(options.retry.mode, RetryMode::Fixed);
        assert_eq!(options.retry.retry_after_unit, RetryAfterUnit::Millis);
        let strategy = options.retry.strategy().unwrap();
        assert_eq!(strategy.max_retries(), 2);
        assert_eq!(strategy.delay(5), Duration::from_millis(250));

        let redirect = options.redirect.strategy().unwrap();
        assert_eq!(redirect.allowed_methods(), &[Method::GET, Method::POST]);
        assert_eq!(options.logging.level, HttpLogDetailLevel::BodyAndHeaders);

        let policies = standard_policies(&options, None).unwrap();
        // Timeout policy included
        assert_eq!(policies.len(), 8);
    }

    #[test]
    fn test_invalid_options_fail_at_construction() {
        assert!(PipelineOptions::from_json(r#"{ "retry": { "mode": "linear" } }"#).is_err());

        let negative = PipelineOptions::from_json(r#"{ "retry": { "max_retries": -1 } }"#).unwrap();
        assert_eq!(
            standard_policies(&negative, None).unwrap_err().kind(),
            crate::ErrorKind::Configuration
        );

        let long_app = PipelineOptions {
            application_id: Some("x".repeat(25)),
            ..Default::default()
        };
        assert!(standard_policies(&long_app, None).is_err());

        let bad_header = PipelineOptions {
            request_id_header: Some("bad header".into()),
            ..Default::default()
        };
        assert!(standard_policies(&bad_header, None).is_err());
    }

    #[test]
    fn test_auth_policy_slot() {
        use crate::credential::{AccessToken, StaticTokenCredential};
        use std::time::SystemTime;

        let credential = StaticTokenCredential::new(AccessToken::new("t", SystemTime::now()));
        let auth = BearerTokenAuthenticationPolicy::new(Arc::new(credential), ["scope"]);
        let policies = standard_policies(&PipelineOptions::default(), Some(auth)).unwrap();

        assert_eq!(policies.len(), 8);
        assert!(format!("{:?}", policies[3]).starts_with("BearerTokenAuthenticationPolicy"));
        assert!(format!("{:?}", policies[4]).starts_with("RedirectPolicy"));
    }
}
