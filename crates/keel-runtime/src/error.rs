//! Runtime error types.

use keel_core::{HttpError, ResponseError};
use keel_framework::RouteError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised while bootstrapping or serving an application.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Two modules share a name.
    #[error("Module registered twice: {0}")]
    DuplicateModule(String),

    /// A module's route registration failed.
    #[error("Failed to register routes for module {module}")]
    Route {
        module: String,
        #[source]
        source: RouteError,
    },

    /// The incoming CGI request could not be read.
    #[error("Invalid request: {0}")]
    Request(#[from] HttpError),

    #[error(transparent)]
    Response(#[from] ResponseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
