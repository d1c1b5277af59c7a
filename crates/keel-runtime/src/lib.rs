//! # Keel Runtime
//!
//! Bootstrap layer of the Keel HMVC framework.
//!
//! This crate provides:
//! - Layered configuration (`keel.toml`, profiles, `KEEL_*` environment)
//! - Logging setup driven by that configuration
//! - [`Application`], which loads modules and serves requests, including a
//!   one-shot CGI entry point
//!
//! ```rust,ignore
//! use keel_runtime::Application;
//!
//! fn main() -> keel_runtime::RuntimeResult<()> {
//!     Application::builder().build()?.serve_cgi()?;
//!     Ok(())
//! }
//! ```

pub mod application;
pub mod config;
pub mod error;
pub mod logging;

pub use application::{Application, ApplicationBuilder};
pub use config::{ConfigError, ConfigLoader, ConfigResult, KeelConfig, Profile};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};

// Re-export tracing for use by applications
pub use tracing;
pub use tracing_subscriber;

/// Logging macros and span helpers.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
