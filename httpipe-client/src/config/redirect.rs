//! Redirect strategies.
//!
//! A [`RedirectStrategy`] decides whether a response should be followed and
//! builds the follow-up request. [`RedirectPolicy`](crate::policy::RedirectPolicy)
//! owns the loop and the per-call set of attempted URLs.

use std::collections::HashSet;
use std::fmt;

use http::header::{AUTHORIZATION, LOCATION};
use http::{HeaderName, Method, StatusCode};
use url::Url;

use crate::{CallContext, HttpRequest, HttpResponse, PipelineError};

/// Default configuration values.
pub mod defaults {
    /// Default maximum number of redirects followed per call.
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Default header carrying the redirect target.
    pub const LOCATION_HEADER: &str = "location";
}

/// Returns whether `status` is a followable redirect.
pub fn is_redirect_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Decides whether to follow a redirect and builds the redirected request.
pub trait RedirectStrategy: Send + Sync + fmt::Debug {
    /// Maximum number of redirects followed in one call.
    fn max_attempts(&self) -> u32;

    /// Whether `response` should be followed.
    ///
    /// `attempt_count` is the number of redirects already followed in this
    /// call and `attempted_urls` every URL requested so far, the original
    /// one included.
    fn should_attempt_redirect(
        &self,
        ctx: &CallContext,
        response: &HttpResponse,
        attempt_count: u32,
        attempted_urls: &HashSet<Url>,
    ) -> bool;

    /// Build the request for the redirect target of `response`.
    ///
    /// `request` is the request as it stood at the redirect policy, before
    /// policies further down the chain changed it.
    fn create_redirect_request(
        &self,
        request: &HttpRequest,
        response: &HttpResponse,
    ) -> Result<HttpRequest, PipelineError>;
}

/// Follows 301, 302, 307 and 308 for an allow-list of methods.
///
/// The redirected request keeps the method and body of the original and
/// drops `Authorization`.
///
/// # Example
///
/// ```
/// use httpipe_client::DefaultRedirectStrategy;
/// use http::Method;
///
/// let strategy = DefaultRedirectStrategy::new(5, "location", vec![Method::GET])?;
/// # Ok::<(), httpipe_client::PipelineError>(())
/// ```
#[derive(Clone, Debug)]
pub struct DefaultRedirectStrategy {
    max_attempts: u32,
    location_header: HeaderName,
    allowed_methods: Vec<Method>,
}

impl DefaultRedirectStrategy {
    pub fn new(
        max_attempts: u32,
        location_header: &str,
        allowed_methods: Vec<Method>,
    ) -> Result<Self, PipelineError> {
        let location_header = HeaderName::from_bytes(location_header.as_bytes()).map_err(|_| {
            PipelineError::configuration(format!("invalid location header: {}", location_header))
        })?;
        Ok(Self {
            max_attempts,
            location_header,
            allowed_methods,
        })
    }

    pub fn location_header(&self) -> &HeaderName {
        &self.location_header
    }

    pub fn allowed_methods(&self) -> &[Method] {
        &self.allowed_methods
    }

    /// Resolve the redirect target, relative locations against the request URL.
    pub fn redirect_url(&self, response: &HttpResponse) -> Option<Url> {
        let location = response.header_str(&self.location_header)?.trim();
        if location.is_empty() {
            return None;
        }
        response.request().url().join(location).ok()
    }
}

impl Default for DefaultRedirectStrategy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_ATTEMPTS,
            location_header: LOCATION,
            allowed_methods: vec![Method::GET, Method::HEAD],
        }
    }
}

impl RedirectStrategy for DefaultRedirectStrategy {
    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn should_attempt_redirect(
        &self,
        _ctx: &CallContext,
        response: &HttpResponse,
        attempt_count: u32,
        attempted_urls: &HashSet<Url>,
    ) -> bool {
        if !is_redirect_status(response.status()) || attempt_count >= self.max_attempts {
            return false;
        }
        if !self.allowed_methods.contains(response.request().method()) {
            tracing::debug!(
                method = %response.request().method(),
                "redirect not followed for method"
            );
            return false;
        }
        match self.redirect_url(response) {
            Some(url) if attempted_urls.contains(&url) => {
                tracing::debug!(url = %url, "redirect loop detected");
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    fn create_redirect_request(
        &self,
        request: &HttpRequest,
        response: &HttpResponse,
    ) -> Result<HttpRequest, PipelineError> {
        let url = self.redirect_url(response).ok_or_else(|| {
            PipelineError::invalid_request("redirect response has no usable location")
        })?;
        let mut request = request.clone();
        request.set_url(url);
        request.headers_mut().remove(AUTHORIZATION);
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderMap;

    fn response(method: Method, url: &str, status: u16, location: Option<&str>) -> HttpResponse {
        let request = HttpRequest::try_new(method, url)
            .unwrap()
            .header("authorization", "Bearer secret")
            .header("x-keep", "1");
        let mut headers = HeaderMap::new();
        if let Some(location) = location {
            headers.insert(LOCATION, location.parse().unwrap());
        }
        HttpResponse::new(
            request,
            StatusCode::from_u16(status).unwrap(),
            headers,
            crate::ResponseBody::Empty,
        )
    }

    fn seeded(url: &str) -> HashSet<Url> {
        HashSet::from([Url::parse(url).unwrap()])
    }

    fn ctx() -> CallContext {
        CallContext::new(HttpRequest::try_new(Method::GET, "https://a.example/").unwrap())
    }

    #[test]
    fn test_follows_redirect_statuses() {
        let strategy = DefaultRedirectStrategy::default();
        let attempted = seeded("https://a.example/");
        for status in [301, 302, 307, 308] {
            let r = response(
                Method::GET,
                "https://a.example/",
                status,
                Some("https://b.example/x"),
            );
            assert!(strategy.should_attempt_redirect(&ctx(), &r, 0, &attempted));
        }
        for status in [200, 303, 304, 404] {
            let r = response(
                Method::GET,
                "https://a.example/",
                status,
                Some("https://b.example/x"),
            );
            assert!(!strategy.should_attempt_redirect(&ctx(), &r, 0, &attempted));
        }
    }

    #[test]
    fn test_rejects_post_by_default() {
        let strategy = DefaultRedirectStrategy::default();
        let r = response(Method::POST, "https://a.example/", 302, Some("/x"));
        assert!(!strategy.should_attempt_redirect(&ctx(), &r, 0, &seeded("https://a.example/")));
    }

    #[test]
    fn test_respects_max_attempts_and_missing_location() {
        let strategy = DefaultRedirectStrategy::default();
        let attempted = seeded("https://a.example/");
        let r = response(Method::GET, "https://a.example/", 302, Some("/x"));
        assert!(strategy.should_attempt_redirect(&ctx(), &r, 2, &attempted));
        assert!(!strategy.should_attempt_redirect(&ctx(), &r, 3, &attempted));

        let no_location = response(Method::GET, "https://a.example/", 302, None);
        assert!(!strategy.should_attempt_redirect(&ctx(), &no_location, 0, &attempted));
    }

    #[test]
    fn test_detects_cycle() {
        let strategy = DefaultRedirectStrategy::default();
        let r = response(Method::GET, "https://b.example/", 302, Some("https://a.example/"));
        let mut attempted = seeded("https://a.example/");
        attempted.insert(Url::parse("https://b.example/").unwrap());
        assert!(!strategy.should_attempt_redirect(&ctx(), &r, 1, &attempted));
    }

    #[test]
    fn test_create_redirect_request_resolves_relative_and_strips_auth() {
        let strategy = DefaultRedirectStrategy::default();
        let r = response(Method::HEAD, "https://a.example/dir/page", 307, Some("../other?q=1"));

        let issued = HttpRequest::try_new(Method::HEAD, "https://a.example/dir/page")
            .unwrap()
            .header("authorization", "Bearer secret")
            .header("x-keep", "1");

        let request = strategy.create_redirect_request(&issued, &r).unwrap();
        assert_eq!(request.url().as_str(), "https://a.example/other?q=1");
        assert_eq!(request.method(), Method::HEAD);
        assert!(request.headers().get(AUTHORIZATION).is_none());
        assert_eq!(request.header_str("x-keep"), Some("1"));
    }

    #[test]
    fn test_custom_location_header() {
        let strategy =
            DefaultRedirectStrategy::new(1, "x-redirect-to", vec![Method::GET]).unwrap();
        let request = HttpRequest::try_new(Method::GET, "https://a.example/")
            .unwrap()
            .header("x-redirect-to", "https://c.example/");
        let r = HttpResponse::new(request, StatusCode::FOUND, HeaderMap::new(), "");
        // Location is read from the response, not the request
        assert!(!strategy.should_attempt_redirect(&ctx(), &r, 0, &seeded("https://a.example/")));

        let mut headers = HeaderMap::new();
        headers.insert("x-redirect-to", "https://c.example/".parse().unwrap());
        let r = HttpResponse::new(r.request().clone(), StatusCode::FOUND, headers, "");
        assert!(strategy.should_attempt_redirect(&ctx(), &r, 0, &seeded("https://a.example/")));
    }

    #[test]
    fn test_invalid_location_header_name() {
        assert!(DefaultRedirectStrategy::new(3, "bad header", vec![Method::GET]).is_err());
    }
}
