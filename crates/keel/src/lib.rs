//! # Keel
//!
//! A hierarchical MVC (HMVC) routing and dispatch framework.
//!
//! ## Architecture
//!
//! An application is a set of modules. Each module brings its own
//! controllers, routes, services and named middleware; the runtime loads them
//! into one frozen route table and a single dispatch pipeline:
//!
//! ```text
//! ┌──────────────┐     ┌────────────┐     ┌──────────────────────────────┐
//! │ Application  │────▶│ Dispatcher │────▶│ global mw ▶ route mw ▶ action │──▶ ResponseSink
//! │ (config,     │     │ RouteTable │     └──────────────────────────────┘
//! │  modules)    │     └────────────┘
//! └──────────────┘
//! ```
//!
//! - **Modules**: static descriptors linked into the binary
//! - **Routes**: `{name}` placeholder patterns, groups and resources
//! - **Controllers**: request-scoped structs with a static action table
//! - **Middleware**: `Continue` or `Halt` with the response as left
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use keel::prelude::*;
//!
//! fn main() -> keel::runtime::RuntimeResult<()> {
//!     let app = Application::builder()
//!         .routes(|r| {
//!             r.get("/", handler(|_, _, _| Ok("hello".into())), "App", ())?;
//!             Ok(())
//!         })
//!         .build()?;
//!     app.serve_cgi()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use keel_core as core;
pub use keel_framework as framework;
pub use keel_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use keel::prelude::*;
/// ```
pub mod prelude {
    // Runtime
    pub use keel_runtime::{Application, ApplicationBuilder, KeelConfig};

    // HTTP
    pub use keel_core::{
        BoxError, Method, Middleware, Outcome, Params, Request, Response, ResponseSink,
    };

    // Routing, controllers and modules
    pub use keel_framework::{
        Actions, AppContext, Container, Controller, ControllerRegistry, HandlerOutput,
        HandlerResult, MODULES, MiddlewareRegistry, ModuleDescriptor, RequestLogger,
        RequireHeader, ResourceAction, ResourceActions, RouteResult, Router, handler,
    };

    // Logging
    pub use keel_runtime::prelude::*;
}
