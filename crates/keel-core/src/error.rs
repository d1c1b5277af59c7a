//! Unified error types for the Keel core layer.
//!
//! Routing and dispatch errors live in `keel-framework`; this module only
//! covers what the HTTP abstractions themselves can fail with.

use thiserror::Error;

/// Boxed error returned by handlers and service factories.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// Request Errors
// =============================================================================

/// Errors raised while building or reading a [`Request`](crate::Request).
#[derive(Debug, Clone, Error)]
pub enum HttpError {
    /// The method token is not one the framework understands.
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// A required CGI variable was absent.
    #[error("missing CGI variable: {0}")]
    MissingVariable(&'static str),

    /// The request body was not valid UTF-8.
    #[error("request body is not valid UTF-8")]
    InvalidUtf8,

    /// The request body could not be decoded as JSON.
    #[error("invalid JSON body: {0}")]
    InvalidJson(String),
}

impl From<serde_json::Error> for HttpError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidJson(err.to_string())
    }
}

// =============================================================================
// Response Errors
// =============================================================================

/// Errors raised when a response crosses the transport boundary.
#[derive(Debug, Clone, Error)]
pub enum ResponseError {
    /// `send` was called on a response that was already written.
    #[error("response has already been sent")]
    AlreadySent,

    /// The sink failed to write.
    #[error("failed to write response: {0}")]
    Io(String),
}

impl From<std::io::Error> for ResponseError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for request operations.
pub type HttpResult<T> = Result<T, HttpError>;
