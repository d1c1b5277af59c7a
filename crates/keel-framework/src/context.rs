//! Application context.
//!
//! [`AppContext`] is built once at bootstrap and shared (`Arc`) with every
//! controller instance and inline handler. It carries the service
//! [`Container`], the per-module configuration sections and the flags the
//! dispatcher needs.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::container::Container;

/// Default root of fully-qualified controller locations.
pub const DEFAULT_NAMESPACE_ROOT: &str = "App";

/// Shared, read-only application state.
#[derive(Debug)]
pub struct AppContext {
    container: Container,
    module_configs: HashMap<String, Arc<Value>>,
    debug: bool,
    namespace_root: String,
}

impl Default for AppContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AppContext {
    pub fn new() -> Self {
        Self {
            container: Container::new(),
            module_configs: HashMap::new(),
            debug: false,
            namespace_root: DEFAULT_NAMESPACE_ROOT.to_string(),
        }
    }

    /// When on, `500` responses carry the full error chain.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_namespace_root(mut self, root: impl Into<String>) -> Self {
        self.namespace_root = root.into();
        self
    }

    /// Attaches the configuration section for `module`.
    pub fn with_module_config(mut self, module: impl Into<String>, config: Value) -> Self {
        self.module_configs.insert(module.into(), Arc::new(config));
        self
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn namespace_root(&self) -> &str {
        &self.namespace_root
    }

    /// The raw configuration section of `module`; `Value::Null` when absent.
    pub fn module_config_value(&self, module: &str) -> Arc<Value> {
        self.module_configs
            .get(module)
            .cloned()
            .unwrap_or_else(|| Arc::new(Value::Null))
    }

    /// Deserializes the configuration section of `module`.
    ///
    /// An absent section deserializes from `null`, so `Option<T>` or a
    /// `#[serde(default)]` struct works for modules without settings.
    pub fn module_config<T>(&self, module: &str) -> serde_json::Result<T>
    where
        T: DeserializeOwned,
    {
        match self.module_configs.get(module) {
            Some(value) => T::deserialize(value.as_ref()),
            None => T::deserialize(&Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct BlogSettings {
        per_page: u32,
        title: String,
    }

    #[test]
    fn test_module_config() {
        let ctx = AppContext::new().with_module_config(
            "Blog",
            serde_json::json!({ "per_page": 5, "title": "Notes" }),
        );
        let cfg: BlogSettings = ctx.module_config("Blog").unwrap();
        assert_eq!(cfg.per_page, 5);
        assert_eq!(cfg.title, "Notes");

        let missing: Option<BlogSettings> = ctx.module_config("Shop").unwrap();
        assert!(missing.is_none());
        assert!(ctx.module_config_value("Shop").is_null());
    }

    #[test]
    fn test_defaults() {
        let ctx = AppContext::default();
        assert!(!ctx.is_debug());
        assert_eq!(ctx.namespace_root(), "App");
    }
}
