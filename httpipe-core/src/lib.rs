//! Core types for the httpipe HTTP pipeline.
//!
//! This crate provides the request, response and error types shared by
//! policies, transports and callers of `httpipe-client`.
//!
//! ## Modules
//!
//! - [`error`]: Error taxonomy and transient-failure classification
//! - [`request`]: Outgoing request with a replayable body
//! - [`response`]: Incoming response with bounded drain-on-close

pub mod error;
pub mod request;
pub mod response;

pub use error::*;
pub use request::*;
pub use response::*;
