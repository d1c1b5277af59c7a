//! Error types for the Keel framework layer.
//!
//! Registration errors ([`RouteError`]) surface while the application boots
//! and never reach request handling. Dispatch errors ([`DispatchError`]) are
//! produced per request and always end in a `500` response.

use keel_core::BoxError;
use thiserror::Error;

// =============================================================================
// Registration Errors
// =============================================================================

/// Errors raised while compiling patterns or registering routes.
#[derive(Debug, Clone, Error)]
pub enum RouteError {
    /// The pattern has an empty or non-identifier placeholder, or unbalanced
    /// braces.
    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The same placeholder name appears twice in one pattern.
    #[error("duplicate parameter '{name}' in route pattern '{pattern}'")]
    DuplicateParameter { pattern: String, name: String },

    /// The generated expression was rejected by the regex engine.
    #[error("failed to compile route pattern '{pattern}': {message}")]
    Regex { pattern: String, message: String },

    /// A symbolic handler is not of the form `Name@action`.
    #[error("invalid handler '{0}': expected 'Controller@action'")]
    InvalidHandler(String),
}

impl RouteError {
    pub(crate) fn invalid_pattern(pattern: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for registration operations.
pub type RouteResult<T> = Result<T, RouteError>;

// =============================================================================
// Container Errors
// =============================================================================

/// Errors raised when resolving a service from the
/// [`Container`](crate::Container).
#[derive(Debug, Clone, Error)]
pub enum ContainerError {
    /// Nothing was bound under the id.
    #[error("no binding registered for '{0}'")]
    NotBound(String),

    /// The binding exists but holds a different type.
    #[error("binding '{id}' is not of type {expected}")]
    TypeMismatch { id: String, expected: &'static str },

    /// The factory for the binding failed.
    #[error("factory for '{id}' failed: {message}")]
    Factory { id: String, message: String },
}

/// Result type for container operations.
pub type ContainerResult<T> = Result<T, ContainerError>;

// =============================================================================
// Dispatch Errors
// =============================================================================

/// A symbolic handler could not be turned into a callable.
#[derive(Debug, Clone, Error)]
pub enum HandlerResolutionError {
    #[error("controller '{location}' is not registered")]
    ControllerNotFound {
        module: String,
        controller: String,
        location: String,
    },

    #[error("action '{action}' does not exist on controller '{location}'")]
    ActionNotFound {
        module: String,
        controller: String,
        action: String,
        location: String,
    },
}

/// A resolved handler failed while running.
#[derive(Debug, Error)]
pub enum HandlerExecutionError {
    /// The handler returned `Err`.
    #[error("handler '{handler}' failed")]
    Failed {
        handler: String,
        #[source]
        source: BoxError,
        /// Stack at the point the error reached the dispatcher, when captured.
        trace: Option<String>,
    },

    /// The handler panicked.
    #[error("handler '{handler}' panicked at {}: {message}", .location.as_deref().unwrap_or("<unknown>"))]
    Panicked {
        handler: String,
        message: String,
        /// `file:line:column` of the panic.
        location: Option<String>,
        trace: Option<String>,
    },
}

impl HandlerExecutionError {
    /// Source location of a panic.
    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Panicked { location, .. } => location.as_deref(),
            Self::Failed { .. } => None,
        }
    }

    /// Captured stack trace, if any.
    pub fn trace(&self) -> Option<&str> {
        match self {
            Self::Failed { trace, .. } | Self::Panicked { trace, .. } => trace.as_deref(),
        }
    }
}

/// Any failure that turns a request into a `500` response.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A route or the global stack referenced a middleware name nobody
    /// registered.
    #[error("middleware '{0}' is not registered")]
    MiddlewareNotFound(String),

    #[error(transparent)]
    Resolution(#[from] HandlerResolutionError),

    #[error(transparent)]
    Execution(#[from] HandlerExecutionError),
}

impl DispatchError {
    /// Renders the error and its full `source()` chain, one cause per line.
    pub fn chain(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str("\n  caused by: ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_includes_sources() {
        let inner: BoxError = "database unavailable".into();
        let err = DispatchError::from(HandlerExecutionError::Failed {
            handler: "Article@show".into(),
            source: inner,
            trace: None,
        });
        let chain = err.chain();
        assert_eq!(
            chain,
            "handler 'Article@show' failed\n  caused by: database unavailable"
        );
        assert_eq!(chain.matches("database unavailable").count(), 1);
    }

    #[test]
    fn test_panic_display_includes_location() {
        let err = HandlerExecutionError::Panicked {
            handler: "Article@explode".into(),
            message: "kaboom".into(),
            location: Some("src/blog.rs:12:5".into()),
            trace: None,
        };
        assert_eq!(
            err.to_string(),
            "handler 'Article@explode' panicked at src/blog.rs:12:5: kaboom"
        );
        assert_eq!(err.location(), Some("src/blog.rs:12:5"));
    }
}
