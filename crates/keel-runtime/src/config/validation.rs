//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{AppConfig, KeelConfig, LogOutput, LoggingConfig, ModulesConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &KeelConfig) -> ConfigResult<()> {
    validate_app_config(&config.app)?;
    validate_logging_config(&config.logging)?;
    validate_modules_config(&config.modules)?;
    Ok(())
}

fn validate_app_config(app: &AppConfig) -> ConfigResult<()> {
    if app.name.trim().is_empty() {
        return Err(ConfigError::missing_field("app.name"));
    }

    if !app.base_path.is_empty() && !app.base_path.starts_with('/') {
        return Err(ConfigError::validation(format!(
            "app.base_path must start with '/': {}",
            app.base_path
        )));
    }

    if !is_identifier(&app.namespace_root) {
        return Err(ConfigError::validation(format!(
            "app.namespace_root must be an identifier: {:?}",
            app.namespace_root
        )));
    }

    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if logging.filters.keys().any(|target| target.trim().is_empty()) {
        return Err(ConfigError::validation("Log filter targets must not be empty"));
    }

    Ok(())
}

fn validate_modules_config(modules: &ModulesConfig) -> ConfigResult<()> {
    if modules.disabled.iter().any(|name| name.trim().is_empty()) {
        return Err(ConfigError::validation(
            "modules.disabled must not contain empty names",
        ));
    }
    Ok(())
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
