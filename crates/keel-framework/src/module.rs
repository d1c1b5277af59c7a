//! HMVC modules.
//!
//! A module is a self-contained slice of the application: its controllers,
//! routes, services and named middleware. Each one is described by a static
//! [`ModuleDescriptor`] of plain function pointers.
//!
//! Descriptors are discovered at link time through the [`MODULES`]
//! distributed slice, so adding a module to the build is enough to load it:
//!
//! ```rust,ignore
//! use linkme::distributed_slice;
//! use keel_framework::{MODULES, ModuleDescriptor};
//!
//! #[distributed_slice(MODULES)]
//! static BLOG: ModuleDescriptor = ModuleDescriptor::new("Blog")
//!     .with_controllers(register_controllers)
//!     .with_routes(register_routes);
//! ```
//!
//! Descriptors can also be passed to the application builder explicitly.

use std::fmt;

use linkme::distributed_slice;

use crate::container::Container;
use crate::controller::ControllerRegistry;
use crate::error::RouteResult;
use crate::middleware::MiddlewareRegistry;
use crate::router::Router;

/// Registers a module's controllers.
pub type ControllersFn = fn(&mut ControllerRegistry);
/// Registers a module's routes.
pub type RoutesFn = fn(&mut Router) -> RouteResult<()>;
/// Binds a module's services.
pub type ServicesFn = fn(&Container);
/// Registers a module's named middleware.
pub type MiddlewareFn = fn(&mut MiddlewareRegistry);

fn no_controllers(_: &mut ControllerRegistry) {}
fn no_routes(_: &mut Router) -> RouteResult<()> {
    Ok(())
}
fn no_services(_: &Container) {}
fn no_middleware(_: &mut MiddlewareRegistry) {}

/// Static description of a module.
#[derive(Clone, Copy)]
pub struct ModuleDescriptor {
    pub name: &'static str,
    pub controllers: ControllersFn,
    pub routes: RoutesFn,
    pub services: ServicesFn,
    pub middleware: MiddlewareFn,
}

impl ModuleDescriptor {
    /// A module that registers nothing yet.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            controllers: no_controllers,
            routes: no_routes,
            services: no_services,
            middleware: no_middleware,
        }
    }

    pub const fn with_controllers(mut self, f: ControllersFn) -> Self {
        self.controllers = f;
        self
    }

    pub const fn with_routes(mut self, f: RoutesFn) -> Self {
        self.routes = f;
        self
    }

    pub const fn with_services(mut self, f: ServicesFn) -> Self {
        self.services = f;
        self
    }

    pub const fn with_middleware(mut self, f: MiddlewareFn) -> Self {
        self.middleware = f;
        self
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Every module linked into the binary.
#[distributed_slice]
pub static MODULES: [ModuleDescriptor];

/// Modules discovered at link time, sorted by name.
pub fn discovered_modules() -> Vec<ModuleDescriptor> {
    let mut modules: Vec<ModuleDescriptor> = MODULES.iter().copied().collect();
    modules.sort_by_key(|m| m.name);
    modules
}
