//! Pipeline error taxonomy.
//!
//! This module provides the error types shared by every pipeline component:
//! - [`ErrorKind`]: Coarse classification used by retry decisions
//! - [`PipelineError`]: The error returned by policies, transports and the pipeline

use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Coarse classification of a [`PipelineError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    Io,
    Timeout,
    Canceled,
    Configuration,
    Insecure,
    Authentication,
    InvalidRequest,
    Body,
}

impl ErrorKind {
    /// Get the string representation of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Io => "io",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Canceled => "canceled",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Insecure => "insecure",
            ErrorKind::Authentication => "authentication",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Body => "body",
        }
    }

    /// Returns whether errors of this kind are usually transient.
    ///
    /// Transport failures and timeouts are transient. I/O errors are
    /// classified per [`io::ErrorKind`] by [`PipelineError::is_transient`].
    ///
    /// # Example
    ///
    /// ```
    /// use httpipe_core::ErrorKind;
    ///
    /// assert!(ErrorKind::Transport.is_transient());
    /// assert!(ErrorKind::Timeout.is_transient());
    /// assert!(!ErrorKind::Configuration.is_transient());
    /// ```
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::Transport | ErrorKind::Timeout)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while driving a request through the pipeline.
///
/// HTTP error statuses are never represented here: a 503 is a response,
/// not an error. Only failures to obtain a response end up as a
/// `PipelineError`.
#[derive(Clone, Debug, thiserror::Error)]
pub enum PipelineError {
    /// Connection-level failure reported by the transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// An I/O error surfaced by the transport or a body stream.
    #[error("i/o error: {0}")]
    Io(Arc<io::Error>),

    /// An attempt or call exceeded its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The call was canceled by the caller.
    #[error("call canceled")]
    Canceled,

    /// Invalid configuration detected while building a component.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The request would leak credentials over an insecure channel.
    #[error("insecure request: {0}")]
    Insecure(String),

    /// A credential could not produce a token.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The request could not be built or rewritten.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Reading a request or response body failed.
    #[error("body error: {0}")]
    Body(String),

    /// Final failure of a retried call, with the errors of earlier attempts.
    #[error("{last} ({} earlier attempt(s) failed)", suppressed.len())]
    Retry {
        last: Box<PipelineError>,
        suppressed: Vec<PipelineError>,
    },
}

impl PipelineError {
    /// Create a configuration error.
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        PipelineError::Configuration(message.into())
    }

    /// Create a transport error.
    pub fn transport<S: Into<String>>(message: S) -> Self {
        PipelineError::Transport(message.into())
    }

    /// Create an invalid request error.
    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        PipelineError::InvalidRequest(message.into())
    }

    /// Create a body error.
    pub fn body<S: Into<String>>(message: S) -> Self {
        PipelineError::Body(message.into())
    }

    /// Create an authentication error.
    pub fn authentication<S: Into<String>>(message: S) -> Self {
        PipelineError::Authentication(message.into())
    }

    /// The error that ended the call, unwrapping any retry bookkeeping.
    pub fn root_cause(&self) -> &PipelineError {
        match self {
            PipelineError::Retry { last, .. } => last.root_cause(),
            other => other,
        }
    }

    /// Get the kind of the root cause.
    pub fn kind(&self) -> ErrorKind {
        match self.root_cause() {
            PipelineError::Transport(_) => ErrorKind::Transport,
            PipelineError::Io(_) => ErrorKind::Io,
            PipelineError::Timeout(_) => ErrorKind::Timeout,
            PipelineError::Canceled => ErrorKind::Canceled,
            PipelineError::Configuration(_) => ErrorKind::Configuration,
            PipelineError::Insecure(_) => ErrorKind::Insecure,
            PipelineError::Authentication(_) => ErrorKind::Authentication,
            PipelineError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            PipelineError::Body(_) => ErrorKind::Body,
            // root_cause never returns a Retry
            PipelineError::Retry { .. } => ErrorKind::Transport,
        }
    }

    /// Errors from earlier attempts that were retried past.
    pub fn suppressed(&self) -> &[PipelineError] {
        match self {
            PipelineError::Retry { suppressed, .. } => suppressed,
            _ => &[],
        }
    }

    /// Attach errors from earlier attempts.
    ///
    /// Returns `self` unchanged when `suppressed` is empty. Suppressed errors
    /// already attached to `self` are kept, earlier ones first.
    pub fn with_suppressed(self, mut suppressed: Vec<PipelineError>) -> Self {
        if suppressed.is_empty() {
            return self;
        }
        match self {
            PipelineError::Retry {
                last,
                suppressed: existing,
            } => {
                suppressed.extend(existing);
                PipelineError::Retry { last, suppressed }
            }
            last => PipelineError::Retry {
                last: Box::new(last),
                suppressed,
            },
        }
    }

    /// Returns whether the root cause is likely to clear up on its own.
    ///
    /// # Example
    ///
    /// ```
    /// use httpipe_core::PipelineError;
    /// use std::io;
    ///
    /// assert!(PipelineError::transport("connection reset").is_transient());
    /// assert!(PipelineError::from(io::Error::from(io::ErrorKind::ConnectionReset)).is_transient());
    /// assert!(!PipelineError::from(io::Error::from(io::ErrorKind::PermissionDenied)).is_transient());
    /// assert!(!PipelineError::Canceled.is_transient());
    /// ```
    pub fn is_transient(&self) -> bool {
        match self.root_cause() {
            PipelineError::Io(err) => is_transient_io(err.kind()),
            other => other.kind().is_transient(),
        }
    }
}

fn is_transient_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
    )
}

impl From<io::Error> for PipelineError {
    fn from(err: io::Error) -> Self {
        PipelineError::Io(Arc::new(err))
    }
}

impl From<url::ParseError> for PipelineError {
    fn from(err: url::ParseError) -> Self {
        PipelineError::InvalidRequest(format!("invalid url: {}", err))
    }
}

impl From<http::Error> for PipelineError {
    fn from(err: http::Error) -> Self {
        PipelineError::InvalidRequest(err.to_string())
    }
}
