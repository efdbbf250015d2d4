//! Error types.
//!
//! All pipeline components share [`PipelineError`] from `httpipe-core`.

pub use httpipe_core::error::{ErrorKind, PipelineError};
