//! Route registration and matching.
//!
//! [`Router`] is the mutable registration surface used while the application
//! boots. It is owned by bootstrap code and handed to module route functions
//! by `&mut`; there is no global router. Once registration is complete,
//! [`Router::freeze`] turns it into an immutable [`RouteTable`] that the
//! dispatcher shares across threads.
//!
//! Matching scans routes in registration order and returns the first route
//! whose method gate and anchored pattern both accept the request. There is
//! no specificity ranking, so register specific routes before general ones:
//!
//! ```rust,ignore
//! router.get("/articles/create", "Article@create", "Blog", ())?;  // first
//! router.get("/articles/{id}", "Article@show", "Blog", ())?;      // would shadow it if first
//! ```
//!
//! # Groups
//!
//! ```rust,ignore
//! router.group("/admin", ["auth"], "Admin", |r| {
//!     r.get("/", "Dashboard@index", "ignored", ())?;          // GET /admin
//!     r.resource("users", "User", "ignored", "audit")?;        // /admin/users...
//!     Ok(())
//! })?;
//! ```

use std::sync::Arc;

use keel_core::Method;
use tracing::{debug, trace};

use crate::error::RouteResult;
use crate::route::{IntoHandler, MiddlewareRef, Middlewares, Route, RouteMatch, RouteMethod};

// ─── Resource actions ─────────────────────────────────────────────────────────

/// One of the seven canonical resource actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceAction {
    Index,
    Create,
    Store,
    Show,
    Edit,
    Update,
    Destroy,
}

impl ResourceAction {
    /// All actions, in registration order.
    pub const ALL: [ResourceAction; 7] = [
        Self::Index,
        Self::Create,
        Self::Store,
        Self::Show,
        Self::Edit,
        Self::Update,
        Self::Destroy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Create => "create",
            Self::Store => "store",
            Self::Show => "show",
            Self::Edit => "edit",
            Self::Update => "update",
            Self::Destroy => "destroy",
        }
    }

    fn method(self) -> RouteMethod {
        match self {
            Self::Index | Self::Create | Self::Show | Self::Edit => RouteMethod::Get,
            Self::Store => RouteMethod::Post,
            Self::Update => RouteMethod::Put,
            Self::Destroy => RouteMethod::Delete,
        }
    }

    fn path(self, name: &str) -> String {
        match self {
            Self::Index | Self::Store => format!("/{name}"),
            Self::Create => format!("/{name}/create"),
            Self::Show | Self::Update | Self::Destroy => format!("/{name}/{{id}}"),
            Self::Edit => format!("/{name}/{{id}}/edit"),
        }
    }
}

/// Selects which resource routes [`Router::resource_with`] registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceActions {
    actions: Vec<ResourceAction>,
}

impl Default for ResourceActions {
    fn default() -> Self {
        Self::all()
    }
}

impl ResourceActions {
    pub fn all() -> Self {
        Self {
            actions: ResourceAction::ALL.to_vec(),
        }
    }

    /// Only the listed actions. Registration order stays canonical.
    pub fn only(actions: &[ResourceAction]) -> Self {
        Self {
            actions: ResourceAction::ALL
                .into_iter()
                .filter(|a| actions.contains(a))
                .collect(),
        }
    }

    /// Every action except the listed ones.
    pub fn except(actions: &[ResourceAction]) -> Self {
        Self {
            actions: ResourceAction::ALL
                .into_iter()
                .filter(|a| !actions.contains(a))
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = ResourceAction> + '_ {
        self.actions.iter().copied()
    }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Ordered, append-only route registration.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a route for `method`.
    ///
    /// # Errors
    ///
    /// Fails if `pattern` does not compile or `handler` is a malformed
    /// `Controller@action` string.
    pub fn add(
        &mut self,
        method: RouteMethod,
        pattern: &str,
        handler: impl IntoHandler,
        module: &str,
        middlewares: impl Into<Middlewares>,
    ) -> RouteResult<&mut Self> {
        let route = Route::new(
            method,
            pattern,
            handler.into_handler()?,
            module,
            middlewares.into().into_vec(),
        )?;
        trace!(method = %route.method, pattern, module, "Route registered");
        self.routes.push(route);
        Ok(self)
    }

    pub fn get(
        &mut self,
        pattern: &str,
        handler: impl IntoHandler,
        module: &str,
        middlewares: impl Into<Middlewares>,
    ) -> RouteResult<&mut Self> {
        self.add(RouteMethod::Get, pattern, handler, module, middlewares)
    }

    pub fn post(
        &mut self,
        pattern: &str,
        handler: impl IntoHandler,
        module: &str,
        middlewares: impl Into<Middlewares>,
    ) -> RouteResult<&mut Self> {
        self.add(RouteMethod::Post, pattern, handler, module, middlewares)
    }

    pub fn put(
        &mut self,
        pattern: &str,
        handler: impl IntoHandler,
        module: &str,
        middlewares: impl Into<Middlewares>,
    ) -> RouteResult<&mut Self> {
        self.add(RouteMethod::Put, pattern, handler, module, middlewares)
    }

    pub fn delete(
        &mut self,
        pattern: &str,
        handler: impl IntoHandler,
        module: &str,
        middlewares: impl Into<Middlewares>,
    ) -> RouteResult<&mut Self> {
        self.add(RouteMethod::Delete, pattern, handler, module, middlewares)
    }

    pub fn patch(
        &mut self,
        pattern: &str,
        handler: impl IntoHandler,
        module: &str,
        middlewares: impl Into<Middlewares>,
    ) -> RouteResult<&mut Self> {
        self.add(RouteMethod::Patch, pattern, handler, module, middlewares)
    }

    /// Registers a route that accepts every method.
    pub fn any(
        &mut self,
        pattern: &str,
        handler: impl IntoHandler,
        module: &str,
        middlewares: impl Into<Middlewares>,
    ) -> RouteResult<&mut Self> {
        self.add(RouteMethod::Any, pattern, handler, module, middlewares)
    }

    /// Registers the routes declared by `register` under a common prefix,
    /// middleware list and module.
    ///
    /// `register` runs against a fresh router. Every route it produces is
    /// rewritten before being appended here:
    ///
    /// - pattern becomes `prefix + pattern` (a bare `/` becomes `prefix`);
    /// - group middleware is placed before the route's own middleware;
    /// - the module is forced to `module`.
    ///
    /// Groups nest: an inner group's routes are rewritten again by the outer
    /// group.
    pub fn group<F>(
        &mut self,
        prefix: &str,
        middlewares: impl Into<Middlewares>,
        module: &str,
        register: F,
    ) -> RouteResult<&mut Self>
    where
        F: FnOnce(&mut Router) -> RouteResult<()>,
    {
        let group_middlewares = middlewares.into().into_vec();
        let mut local = Router::new();
        register(&mut local)?;

        // rewrite everything before touching `self`, so a failure leaves the
        // table as it was
        let rewritten = local
            .routes
            .into_iter()
            .map(|route| {
                let pattern = join_prefix(prefix, route.pattern.source());
                let middlewares: Vec<MiddlewareRef> = group_middlewares
                    .iter()
                    .cloned()
                    .chain(route.middlewares)
                    .collect();
                Route::new(route.method, &pattern, route.handler, module, middlewares)
            })
            .collect::<RouteResult<Vec<_>>>()?;

        let count = rewritten.len();
        self.routes.extend(rewritten);
        debug!(prefix, module, routes = count, "Route group registered");
        Ok(self)
    }

    /// Registers the seven canonical CRUD routes for `name`, handled by
    /// `controller`:
    ///
    /// | Method | Path | Action |
    /// |---|---|---|
    /// | GET | `/{name}` | index |
    /// | GET | `/{name}/create` | create |
    /// | POST | `/{name}` | store |
    /// | GET | `/{name}/{id}` | show |
    /// | GET | `/{name}/{id}/edit` | edit |
    /// | PUT | `/{name}/{id}` | update |
    /// | DELETE | `/{name}/{id}` | destroy |
    pub fn resource(
        &mut self,
        name: &str,
        controller: &str,
        module: &str,
        middlewares: impl Into<Middlewares>,
    ) -> RouteResult<&mut Self> {
        self.resource_with(name, controller, module, middlewares, ResourceActions::all())
    }

    /// Like [`resource`](Self::resource), restricted to `actions`.
    pub fn resource_with(
        &mut self,
        name: &str,
        controller: &str,
        module: &str,
        middlewares: impl Into<Middlewares>,
        actions: ResourceActions,
    ) -> RouteResult<&mut Self> {
        let middlewares = middlewares.into();
        let name = name.trim_matches('/');
        let mut local = Router::new();
        for action in actions.iter() {
            local.add(
                action.method(),
                &action.path(name),
                format!("{controller}@{}", action.as_str()),
                module,
                middlewares.clone(),
            )?;
        }
        self.routes.extend(local.routes);
        Ok(self)
    }

    /// Routes registered so far, in registration order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Finds the first route accepting `method` and `path`.
    pub fn match_route(&self, method: Method, path: &str) -> Option<RouteMatch<'_>> {
        match_first(&self.routes, method, path)
    }

    /// Appends every route of `other`, keeping its order.
    pub fn merge(&mut self, other: Router) -> &mut Self {
        self.routes.extend(other.routes);
        self
    }

    /// Ends registration.
    pub fn freeze(self) -> RouteTable {
        debug!(routes = self.routes.len(), "Route table frozen");
        RouteTable {
            routes: self.routes.into(),
        }
    }
}

/// `prefix + pattern`, where a bare `/` pattern yields `prefix` and an empty
/// result yields `/`.
fn join_prefix(prefix: &str, pattern: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let joined = if pattern == "/" || pattern.is_empty() {
        prefix.to_string()
    } else if pattern.starts_with('/') {
        format!("{prefix}{pattern}")
    } else {
        format!("{prefix}/{pattern}")
    };
    if joined.is_empty() {
        "/".to_string()
    } else if joined.starts_with('/') {
        joined
    } else {
        format!("/{joined}")
    }
}

fn match_first<'a>(routes: &'a [Route], method: Method, path: &str) -> Option<RouteMatch<'a>> {
    routes.iter().find_map(|route| {
        route
            .matches(method, path)
            .map(|params| RouteMatch::new(route, params))
    })
}

// ─── RouteTable ───────────────────────────────────────────────────────────────

/// The frozen, shareable route table.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Arc<[Route]>,
}

impl RouteTable {
    /// Finds the first route accepting `method` and `path`.
    pub fn match_route(&self, method: Method, path: &str) -> Option<RouteMatch<'_>> {
        match_first(&self.routes, method, path)
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Route> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<'a> IntoIterator for &'a RouteTable {
    type Item = &'a Route;
    type IntoIter = std::slice::Iter<'a, Route>;

    fn into_iter(self) -> Self::IntoIter {
        self.routes.iter()
    }
}
