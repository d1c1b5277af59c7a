//! Configuration module for the Keel runtime.
//!
//! This module provides layered configuration loading (files, environment,
//! programmatic overrides) and validation for the application, logging and
//! module settings.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    AppConfig, KeelConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    ModulesConfig, SpanEventConfig,
};
pub use validation::validate_config;
