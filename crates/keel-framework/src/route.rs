//! Route definitions.
//!
//! A [`Route`] binds a method and a [`CompiledPattern`] to a [`Handler`],
//! the module that owns it, and the middleware that runs before it. Routes
//! are built while the application boots and are immutable afterwards.

use std::fmt;
use std::sync::Arc;

use keel_core::{BoxedMiddleware, Method, Middleware, Params, Request};

use crate::context::AppContext;
use crate::controller::HandlerResult;
use crate::error::{RouteError, RouteResult};
use crate::pattern::CompiledPattern;

// ─── RouteMethod ──────────────────────────────────────────────────────────────

/// The method a route answers to. [`Any`](RouteMethod::Any) accepts every
/// request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Any,
}

impl RouteMethod {
    /// Returns `true` if a request with `method` is a candidate for this route.
    pub fn accepts(self, method: Method) -> bool {
        match self {
            Self::Any => true,
            Self::Get => method == Method::Get,
            Self::Post => method == Method::Post,
            Self::Put => method == Method::Put,
            Self::Delete => method == Method::Delete,
            Self::Patch => method == Method::Patch,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Any => "ANY",
        }
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Handler ──────────────────────────────────────────────────────────────────

/// Signature of an inline route handler.
pub type DirectFn = dyn Fn(&AppContext, &mut Request, &Params) -> HandlerResult + Send + Sync;

/// What a route invokes once matched.
#[derive(Clone)]
pub enum Handler {
    /// A controller action, resolved through the
    /// [`ControllerRegistry`](crate::ControllerRegistry) at dispatch time.
    Symbolic { controller: String, action: String },
    /// A callable captured at registration.
    Direct(Arc<DirectFn>),
}

impl Handler {
    /// Parses `"Controller@action"`.
    ///
    /// Both halves must be non-empty and there must be exactly one `@`.
    pub fn parse(target: &str) -> RouteResult<Self> {
        match target.split_once('@') {
            Some((controller, action))
                if !controller.is_empty() && !action.is_empty() && !action.contains('@') =>
            {
                Ok(Self::Symbolic {
                    controller: controller.to_string(),
                    action: action.to_string(),
                })
            }
            _ => Err(RouteError::InvalidHandler(target.to_string())),
        }
    }

    /// Wraps a closure as a direct handler.
    pub fn direct<F>(f: F) -> Self
    where
        F: Fn(&AppContext, &mut Request, &Params) -> HandlerResult + Send + Sync + 'static,
    {
        Self::Direct(Arc::new(f))
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self, Self::Symbolic { .. })
    }
}

/// Shorthand for [`Handler::direct`].
///
/// ```rust,ignore
/// router.get("/ping", handler(|_, _, _| Ok("pong".into())), "App", ())?;
/// ```
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&AppContext, &mut Request, &Params) -> HandlerResult + Send + Sync + 'static,
{
    Handler::direct(f)
}

impl fmt::Display for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Symbolic { controller, action } => write!(f, "{controller}@{action}"),
            Self::Direct(_) => f.write_str("<closure>"),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Symbolic { controller, action } => f
                .debug_struct("Symbolic")
                .field("controller", controller)
                .field("action", action)
                .finish(),
            Self::Direct(_) => f.write_str("Direct(..)"),
        }
    }
}

/// Conversion into a [`Handler`] at registration.
pub trait IntoHandler {
    fn into_handler(self) -> RouteResult<Handler>;
}

impl IntoHandler for Handler {
    fn into_handler(self) -> RouteResult<Handler> {
        Ok(self)
    }
}

impl IntoHandler for &str {
    fn into_handler(self) -> RouteResult<Handler> {
        Handler::parse(self)
    }
}

impl IntoHandler for String {
    fn into_handler(self) -> RouteResult<Handler> {
        Handler::parse(&self)
    }
}

// ─── Middleware references ────────────────────────────────────────────────────

/// A middleware attached to a route.
#[derive(Clone)]
pub enum MiddlewareRef {
    /// Resolved through the [`MiddlewareRegistry`](crate::MiddlewareRegistry)
    /// when the route is dispatched.
    Named(String),
    Instance(BoxedMiddleware),
}

impl MiddlewareRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn instance<M: Middleware + 'static>(middleware: M) -> Self {
        Self::Instance(Arc::new(middleware))
    }

    /// Name used in logs and route listings.
    pub fn label(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Instance(m) => m.name(),
        }
    }
}

impl fmt::Debug for MiddlewareRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Self::Instance(m) => f.debug_tuple("Instance").field(&m.name()).finish(),
        }
    }
}

impl From<&str> for MiddlewareRef {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for MiddlewareRef {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<BoxedMiddleware> for MiddlewareRef {
    fn from(m: BoxedMiddleware) -> Self {
        Self::Instance(m)
    }
}

/// An ordered middleware list accepted by registration methods.
///
/// Pass `()` for none, a name, an array of names, or a `Vec` of
/// [`MiddlewareRef`]s.
#[derive(Debug, Clone, Default)]
pub struct Middlewares(pub Vec<MiddlewareRef>);

impl Middlewares {
    pub fn into_vec(self) -> Vec<MiddlewareRef> {
        self.0
    }
}

impl From<()> for Middlewares {
    fn from(_: ()) -> Self {
        Self::default()
    }
}

impl From<&str> for Middlewares {
    fn from(name: &str) -> Self {
        Self(vec![name.into()])
    }
}

impl From<MiddlewareRef> for Middlewares {
    fn from(m: MiddlewareRef) -> Self {
        Self(vec![m])
    }
}

impl<const N: usize> From<[&str; N]> for Middlewares {
    fn from(names: [&str; N]) -> Self {
        Self(names.into_iter().map(MiddlewareRef::from).collect())
    }
}

impl From<&[&str]> for Middlewares {
    fn from(names: &[&str]) -> Self {
        Self(names.iter().copied().map(MiddlewareRef::from).collect())
    }
}

impl From<Vec<MiddlewareRef>> for Middlewares {
    fn from(list: Vec<MiddlewareRef>) -> Self {
        Self(list)
    }
}

// ─── Route ────────────────────────────────────────────────────────────────────

/// A registered route.
#[derive(Debug, Clone)]
pub struct Route {
    pub(crate) method: RouteMethod,
    pub(crate) pattern: CompiledPattern,
    pub(crate) handler: Handler,
    pub(crate) module: String,
    pub(crate) middlewares: Vec<MiddlewareRef>,
}

impl Route {
    pub fn new(
        method: RouteMethod,
        pattern: &str,
        handler: Handler,
        module: impl Into<String>,
        middlewares: Vec<MiddlewareRef>,
    ) -> RouteResult<Self> {
        Ok(Self {
            method,
            pattern: CompiledPattern::compile(pattern)?,
            handler,
            module: module.into(),
            middlewares,
        })
    }

    pub fn method(&self) -> RouteMethod {
        self.method
    }

    /// The original template, e.g. `/articles/{id}`.
    pub fn pattern(&self) -> &str {
        self.pattern.source()
    }

    pub fn compiled(&self) -> &CompiledPattern {
        &self.pattern
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn middlewares(&self) -> &[MiddlewareRef] {
        &self.middlewares
    }

    /// Matches this route alone against a request.
    pub fn matches(&self, method: Method, path: &str) -> Option<Params> {
        if !self.method.accepts(method) {
            return None;
        }
        self.pattern.captures(path)
    }
}

/// One line of a route listing: `GET     /articles/{id}  Article@show  [Blog] auth`.
impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<7} {:<32} {:<28} [{}]",
            self.method.as_str(),
            self.pattern.source(),
            self.handler.to_string(),
            self.module
        )?;
        for m in &self.middlewares {
            write!(f, " {}", m.label())?;
        }
        Ok(())
    }
}

// ─── RouteMatch ───────────────────────────────────────────────────────────────

/// The result of matching a request against a route table.
#[derive(Debug, Clone)]
pub struct RouteMatch<'a> {
    route: &'a Route,
    params: Params,
}

impl<'a> RouteMatch<'a> {
    pub(crate) fn new(route: &'a Route, params: Params) -> Self {
        Self { route, params }
    }

    pub fn route(&self) -> &'a Route {
        self.route
    }

    pub fn module(&self) -> &'a str {
        &self.route.module
    }

    pub fn handler(&self) -> &'a Handler {
        &self.route.handler
    }

    /// Captured parameters, by name or position in declaration order.
    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn into_params(self) -> Params {
        self.params
    }

    pub fn middlewares(&self) -> &'a [MiddlewareRef] {
        &self.route.middlewares
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_gating() {
        assert!(RouteMethod::Get.accepts(Method::Get));
        assert!(!RouteMethod::Get.accepts(Method::Post));
        assert!(!RouteMethod::Get.accepts(Method::Head));
        for m in [Method::Get, Method::Post, Method::Put, Method::Delete, Method::Patch] {
            assert!(RouteMethod::Any.accepts(m));
        }
    }

    #[test]
    fn test_parse_handler() {
        let h = Handler::parse("Article@show").unwrap();
        assert!(h.is_symbolic());
        assert_eq!(h.to_string(), "Article@show");

        for bad in ["Article", "@show", "Article@", "A@b@c", ""] {
            assert!(matches!(Handler::parse(bad), Err(RouteError::InvalidHandler(_))));
        }
    }

    #[test]
    fn test_middlewares_conversions() {
        let list: Middlewares = ().into();
        assert!(list.0.is_empty());

        let list: Middlewares = ["auth", "csrf"].into();
        let labels: Vec<&str> = list.0.iter().map(MiddlewareRef::label).collect();
        assert_eq!(labels, vec!["auth", "csrf"]);
    }

    #[test]
    fn test_route_display() {
        let route = Route::new(
            RouteMethod::Get,
            "/articles/{id}",
            Handler::parse("Article@show").unwrap(),
            "Blog",
            vec!["auth".into()],
        )
        .unwrap();
        let line = route.to_string();
        assert!(line.starts_with("GET     /articles/{id}"));
        assert!(line.contains("Article@show"));
        assert!(line.ends_with("[Blog] auth"));
    }
}
