//! HTTP transport layer.
//!
//! This module provides [`HyperTransport`], the [`HttpClient`](crate::HttpClient)
//! implementation over hyper_util's legacy client. It supports:
//!
//! - HTTP/1.1 and HTTP/2 with automatic protocol negotiation
//! - TLS with rustls (feature-gated)
//! - Connection pooling
//! - Tower service integration
//!
//! # Feature Flags
//!
//! - `tls` (default) - Enables `tls-ring` + `tls-native-roots`
//! - `tls-ring` / `tls-aws-lc` - Crypto providers
//! - `tls-native-roots` / `tls-webpki-roots` - Root certificates

mod body;
mod connector;
mod hyper;

pub use body::TransportBody;
pub use connector::{build_https_connector, default_tls_config, has_tls_support};
pub use hyper::{HyperTransport, HyperTransportBuilder};

// Re-export rustls types that users might need for TLS configuration
pub use rustls::ClientConfig as TlsClientConfig;
