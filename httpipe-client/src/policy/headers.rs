//! Policies that stamp headers onto every attempt.

use std::time::SystemTime;

use http::header::{DATE, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::pipeline::{BoxFuture, Next, PipelinePolicy};
use crate::{CallContext, HttpResponse, PipelineError};

/// Default header carrying the client request id.
pub const REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

/// Longest accepted application id.
pub const MAX_APPLICATION_ID_LENGTH: usize = 24;

/// Adds a fixed set of headers, replacing values already on the request.
#[derive(Clone, Debug, Default)]
pub struct AddHeadersPolicy {
    headers: HeaderMap,
}

impl AddHeadersPolicy {
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    /// Build from string pairs, failing on invalid names or values.
    pub fn try_from_pairs<I, K, V>(pairs: I) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            let (name, value) = (name.as_ref(), value.as_ref());
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                PipelineError::configuration(format!("invalid header name: {}", name))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|_| {
                PipelineError::configuration(format!("invalid value for header {}", name))
            })?;
            headers.append(header_name, header_value);
        }
        Ok(Self { headers })
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

impl PipelinePolicy for AddHeadersPolicy {
    fn process<'a>(
        &'a self,
        ctx: &'a mut CallContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, PipelineError>> {
        Box::pin(async move {
            let target = ctx.request_mut().headers_mut();
            for name in self.headers.keys() {
                target.remove(name);
            }
            for (name, value) in &self.headers {
                target.append(name.clone(), value.clone());
            }
            next.run(ctx).await
        })
    }
}

/// Sets the `Date` header to the time of each attempt.
#[derive(Clone, Copy, Debug, Default)]
pub struct AddDatePolicy;

impl PipelinePolicy for AddDatePolicy {
    fn process<'a>(
        &'a self,
        ctx: &'a mut CallContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, PipelineError>> {
        Box::pin(async move {
            let now = httpdate::fmt_http_date(SystemTime::now());
            // IMF-fixdate is always a valid header value
            if let Ok(value) = HeaderValue::from_str(&now) {
                ctx.request_mut().headers_mut().insert(DATE, value);
            }
            next.run(ctx).await
        })
    }
}

/// Gives every call a request id unless the caller already set one.
///
/// Placed before the retry policy, the id is the same on every attempt.
#[derive(Clone, Debug)]
pub struct RequestIdPolicy {
    header: HeaderName,
}

impl Default for RequestIdPolicy {
    fn default() -> Self {
        Self {
            header: HeaderName::from_static(REQUEST_ID_HEADER),
        }
    }
}

impl RequestIdPolicy {
    pub fn new(header: &str) -> Result<Self, PipelineError> {
        let header = HeaderName::from_bytes(header.as_bytes()).map_err(|_| {
            PipelineError::configuration(format!("invalid request id header: {}", header))
        })?;
        Ok(Self { header })
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }
}

impl PipelinePolicy for RequestIdPolicy {
    fn process<'a>(
        &'a self,
        ctx: &'a mut CallContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, PipelineError>> {
        Box::pin(async move {
            let headers = ctx.request_mut().headers_mut();
            if !headers.contains_key(&self.header) {
                let id = uuid::Uuid::new_v4().to_string();
                if let Ok(value) = HeaderValue::from_str(&id) {
                    headers.insert(self.header.clone(), value);
                }
            }
            next.run(ctx).await
        })
    }
}

/// Sets `User-Agent` to `{application_id} httpipe/{version} ({os}; {arch})`.
///
/// A `User-Agent` already on the request is kept after the generated one.
#[derive(Clone, Debug)]
pub struct UserAgentPolicy {
    user_agent: String,
}

impl Default for UserAgentPolicy {
    fn default() -> Self {
        Self {
            user_agent: user_agent_string(None),
        }
    }
}

fn user_agent_string(application_id: Option<&str>) -> String {
    let base = format!(
        "httpipe/{} ({}; {})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    match application_id {
        Some(app) => format!("{} {}", app, base),
        None => base,
    }
}

impl UserAgentPolicy {
    /// Fails when the application id is longer than 24 characters or
    /// contains whitespace.
    pub fn new(application_id: Option<&str>) -> Result<Self, PipelineError> {
        let application_id = application_id.filter(|app| !app.is_empty());
        if let Some(app) = application_id {
            if app.chars().count() > MAX_APPLICATION_ID_LENGTH {
                return Err(PipelineError::configuration(format!(
                    "application id must be at most {} characters",
                    MAX_APPLICATION_ID_LENGTH
                )));
            }
            if app.chars().any(char::is_whitespace) {
                return Err(PipelineError::configuration(
                    "application id must not contain whitespace",
                ));
            }
        }
        let user_agent = user_agent_string(application_id);
        HeaderValue::from_str(&user_agent).map_err(|_| {
            PipelineError::configuration("application id is not a valid header value")
        })?;
        Ok(Self { user_agent })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

impl PipelinePolicy for UserAgentPolicy {
    fn process<'a>(
        &'a self,
        ctx: &'a mut CallContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<HttpResponse, PipelineError>> {
        Box::pin(async move {
            let headers = ctx.request_mut().headers_mut();
            let value = match headers.get(USER_AGENT).and_then(|v| v.to_str().ok()) {
                Some(existing) if !existing.is_empty() => {
                    format!("{} {}", self.user_agent, existing)
                }
                _ => self.user_agent.clone(),
            };
            if let Ok(value) = HeaderValue::from_str(&value) {
                headers.insert(USER_AGENT, value);
            }
            next.run(ctx).await
        })
    }
}
