//! TLS connector setup for the hyper transport.
//!
//! # Feature Flags
//!
//! TLS support requires both a crypto provider and root certificates:
//!
//! - **Crypto providers** (choose one):
//!   - `tls-ring` - Use ring crypto (default with `tls` feature)
//!   - `tls-aws-lc` - Use AWS LC crypto
//!
//! - **Root certificates** (choose one):
//!   - `tls-native-roots` - Use system root certificates (default with `tls` feature)
//!   - `tls-webpki-roots` - Use bundled Mozilla root certificates
//!
//! Without a feature-gated provider, a provider installed with
//! `CryptoProvider::install_default()` is used.

use std::sync::Arc;

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::ClientConfig;
use rustls::crypto::CryptoProvider;

use crate::PipelineError;

/// Returns true if both a crypto provider and root certificates are compiled in.
#[inline]
pub const fn has_tls_support() -> bool {
    cfg!(any(feature = "tls-ring", feature = "tls-aws-lc"))
        && cfg!(any(feature = "tls-native-roots", feature = "tls-webpki-roots"))
}

/// Pick a crypto provider: ring, then aws-lc, then the process-wide default.
fn crypto_provider() -> Option<Arc<CryptoProvider>> {
    #[cfg(feature = "tls-ring")]
    {
        return Some(Arc::new(rustls::crypto::ring::default_provider()));
    }

    #[cfg(all(feature = "tls-aws-lc", not(feature = "tls-ring")))]
    {
        return Some(Arc::new(rustls::crypto::aws_lc_rs::default_provider()));
    }

    #[cfg(not(any(feature = "tls-ring", feature = "tls-aws-lc")))]
    {
        CryptoProvider::get_default().cloned()
    }
}

/// Build the root certificate store from enabled features.
///
/// Native roots win when both root features are enabled.
fn root_store() -> Result<rustls::RootCertStore, PipelineError> {
    #[allow(unused_mut)]
    let mut roots = rustls::RootCertStore::empty();

    #[cfg(feature = "tls-native-roots")]
    {
        let native_certs = rustls_native_certs::load_native_certs();
        if !native_certs.errors.is_empty() {
            tracing::debug!(errors = ?native_certs.errors, "errors loading native certs");
        }
        let (added, ignored) = roots.add_parsable_certificates(native_certs.certs);
        tracing::debug!(added, ignored, "loaded native root certificates");
    }

    #[cfg(all(feature = "tls-webpki-roots", not(feature = "tls-native-roots")))]
    {
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    if !cfg!(any(feature = "tls-native-roots", feature = "tls-webpki-roots")) {
        return Err(PipelineError::configuration(
            "no root certificates: enable `tls-native-roots` or `tls-webpki-roots`, \
             or pass a TLS config to the transport builder",
        ));
    }
    Ok(roots)
}

/// Build the default TLS configuration from the enabled features.
pub fn default_tls_config() -> Result<ClientConfig, PipelineError> {
    let provider = crypto_provider().ok_or_else(|| {
        PipelineError::configuration(
            "no crypto provider: enable `tls-ring` or `tls-aws-lc`, \
             or install one with `CryptoProvider::install_default()`",
        )
    })?;
    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| PipelineError::configuration(format!("invalid TLS configuration: {}", e)))?;
    Ok(builder.with_root_certificates(root_store()?).with_no_client_auth())
}

/// Build a connector that speaks plain HTTP and HTTPS over `config`.
pub fn build_https_connector(config: ClientConfig) -> HttpsConnector<HttpConnector> {
    HttpsConnectorBuilder::new()
        .with_tls_config(config)
        .https_or_http()
        .enable_all_versions()
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_tls_support_matches_features() {
        let expected = cfg!(any(feature = "tls-ring", feature = "tls-aws-lc"))
            && cfg!(any(feature = "tls-native-roots", feature = "tls-webpki-roots"));
        assert_eq!(has_tls_support(), expected);
    }

    #[cfg(all(feature = "tls-ring", feature = "tls-native-roots"))]
    #[test]
    fn test_default_tls_config_builds() {
        let config = default_tls_config().unwrap();
        let _ = build_https_connector(config);
    }
}
