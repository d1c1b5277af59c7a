//! # Keel Framework
//!
//! The routing and dispatch layer of the Keel HMVC framework.
//!
//! This layer provides:
//! - Route pattern compilation and first-match route tables
//! - Route groups and resource expansion
//! - The dispatch pipeline (global middleware, route middleware, handler)
//! - Controllers resolved through a boot-time registry
//! - A dependency-injection container and the shared application context
//! - Module descriptors discovered at link time
//!
//! Configuration, logging and application bootstrap live in `keel-runtime`.

pub mod container;
pub mod context;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod middleware;
pub mod module;
pub mod pattern;
pub mod route;
pub mod router;

pub use container::Container;
pub use context::{AppContext, DEFAULT_NAMESPACE_ROOT};
pub use controller::{
    ActionFn, Actions, Controller, ControllerInstance, ControllerKey, ControllerRegistry,
    HandlerOutput, HandlerResult,
};
pub use dispatcher::{DispatchOutcome, Dispatched, Dispatcher};
pub use error::{
    ContainerError, ContainerResult, DispatchError, HandlerExecutionError,
    HandlerResolutionError, RouteError, RouteResult,
};
pub use middleware::{MiddlewareRegistry, RequestLogger, RequireHeader};
pub use module::{MODULES, ModuleDescriptor, discovered_modules};
pub use pattern::CompiledPattern;
pub use route::{
    Handler, IntoHandler, MiddlewareRef, Middlewares, Route, RouteMatch, RouteMethod, handler,
};
pub use router::{ResourceAction, ResourceActions, RouteTable, Router};
