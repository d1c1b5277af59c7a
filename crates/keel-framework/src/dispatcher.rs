//! Request dispatch pipeline.
//!
//! The [`Dispatcher`] drives one request through a fixed sequence of states:
//!
//! ```text
//! Matching ──▶ GlobalMiddleware ──▶ RouteMiddleware ──▶ Handling ──▶ Responding
//!    │               │                    │                 │
//!    ▼               ▼                    ▼                 ▼
//! NotFound        Rejected             Rejected           Error
//!  (404)     (response as left)   (response as left)      (500)
//! ```
//!
//! 1. The request is matched against the frozen [`RouteTable`]. No match is
//!    a normal outcome: a plain `404 Not Found`, logged at debug.
//! 2. Global middleware runs in registration order, then the route's own
//!    middleware (group middleware first). A middleware that returns
//!    [`Outcome::Halt`] ends the pipeline and its response is sent untouched.
//! 3. The handler is resolved and run inside a single failure boundary:
//!    an unknown controller or action, an `Err` from the handler and a panic
//!    all become a `500`. The error is always logged at error level; the
//!    response only carries details when the application runs in debug mode.
//!
//! The dispatcher is immutable once built and is `Send + Sync`, so one
//! instance can serve many threads.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};

use keel_core::{Middleware, Outcome, Params, Request, Response, ResponseError, ResponseSink};
use tracing::{Level, debug, error, span, warn};

use crate::context::AppContext;
use crate::controller::{ControllerKey, ControllerRegistry, HandlerOutput};
use crate::error::{DispatchError, HandlerExecutionError, HandlerResolutionError};
use crate::middleware::MiddlewareRegistry;
use crate::route::{Handler, MiddlewareRef, Route};
use crate::router::RouteTable;

/// How a request left the pipeline.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The handler ran and its output was applied.
    Handled,
    /// No route matched.
    NotFound,
    /// A middleware halted the pipeline.
    Rejected { middleware: String },
    /// Resolution or execution failed.
    Failed(DispatchError),
}

impl DispatchOutcome {
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled)
    }
}

/// The response produced for a request, and how it was produced.
#[derive(Debug)]
pub struct Dispatched {
    pub response: Response,
    pub outcome: DispatchOutcome,
}

/// Runs requests through middleware and handlers.
pub struct Dispatcher {
    routes: RouteTable,
    controllers: Arc<ControllerRegistry>,
    middleware: Arc<MiddlewareRegistry>,
    global: Vec<MiddlewareRef>,
    ctx: Arc<AppContext>,
}

impl Dispatcher {
    pub fn new(routes: RouteTable, ctx: Arc<AppContext>) -> Self {
        Self {
            routes,
            controllers: Arc::new(ControllerRegistry::new()),
            middleware: Arc::new(MiddlewareRegistry::new()),
            global: Vec::new(),
            ctx,
        }
    }

    pub fn with_controllers(mut self, controllers: ControllerRegistry) -> Self {
        self.controllers = Arc::new(controllers);
        self
    }

    pub fn with_middleware(mut self, middleware: MiddlewareRegistry) -> Self {
        self.middleware = Arc::new(middleware);
        self
    }

    /// Appends middleware that runs for every matched route, before the
    /// route's own middleware.
    pub fn with_global(mut self, middleware: impl Into<MiddlewareRef>) -> Self {
        self.global.push(middleware.into());
        self
    }

    pub fn with_global_list(mut self, middleware: Vec<MiddlewareRef>) -> Self {
        self.global.extend(middleware);
        self
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.ctx
    }

    /// Runs `req` through the pipeline and returns the response to send.
    pub fn dispatch(&self, req: &mut Request) -> Dispatched {
        let span = span!(Level::DEBUG, "dispatch", method = %req.method(), path = %req.path());
        let _enter = span.enter();

        let Some(matched) = self.routes.match_route(req.method(), req.path()) else {
            debug!(method = %req.method(), path = %req.path(), "No route matched");
            return Dispatched {
                response: Response::not_found(),
                outcome: DispatchOutcome::NotFound,
            };
        };

        let route = matched.route();
        let params = matched.into_params();
        debug!(
            route = %route.pattern(),
            handler = %route.handler(),
            module = %route.module(),
            "Route matched"
        );
        req.set_params(params.clone());

        let mut res = Response::default();

        let stacks = [self.global.as_slice(), route.middlewares()];
        for stack in stacks {
            match self.run_middleware(stack, req, &mut res) {
                Ok(None) => {}
                Ok(Some(name)) => {
                    debug!(middleware = %name, status = res.status(), "Request rejected by middleware");
                    return Dispatched {
                        response: res,
                        outcome: DispatchOutcome::Rejected { middleware: name },
                    };
                }
                Err(err) => return self.fail(route, req, err),
            }
        }

        let handler = route.handler();
        let result = catch_panic(|| self.run_handler(route, handler, req, &params))
            .unwrap_or_else(|(payload, report)| {
                Err(HandlerExecutionError::Panicked {
                    handler: handler.to_string(),
                    message: panic_message(&*payload),
                    location: report.location,
                    trace: report.trace,
                }
                .into())
            });

        match result {
            Ok(output) => {
                match output {
                    HandlerOutput::Body(body) => res.set_body(body),
                    HandlerOutput::Response(replacement) => res = replacement,
                    HandlerOutput::Empty => {}
                }
                debug!(status = res.status(), "Request handled");
                Dispatched {
                    response: res,
                    outcome: DispatchOutcome::Handled,
                }
            }
            Err(err) => self.fail(route, req, err),
        }
    }

    /// Dispatches `req` and returns only the response.
    pub fn handle(&self, mut req: Request) -> Response {
        self.dispatch(&mut req).response
    }

    /// Dispatches `req` and sends the response to `sink` exactly once.
    pub fn serve(
        &self,
        mut req: Request,
        sink: &mut dyn ResponseSink,
    ) -> Result<DispatchOutcome, ResponseError> {
        let Dispatched {
            mut response,
            outcome,
        } = self.dispatch(&mut req);
        response.send(sink)?;
        Ok(outcome)
    }

    /// Runs one middleware stack; returns the name of the middleware that
    /// halted, if any.
    fn run_middleware(
        &self,
        stack: &[MiddlewareRef],
        req: &mut Request,
        res: &mut Response,
    ) -> Result<Option<String>, DispatchError> {
        for entry in stack {
            let middleware = self.resolve_middleware(entry)?;
            if middleware.process(req, res) == Outcome::Halt {
                return Ok(Some(entry.label().to_string()));
            }
        }
        Ok(None)
    }

    fn resolve_middleware<'a>(
        &'a self,
        entry: &'a MiddlewareRef,
    ) -> Result<&'a dyn Middleware, DispatchError> {
        match entry {
            MiddlewareRef::Instance(m) => Ok(m.as_ref()),
            MiddlewareRef::Named(name) => self
                .middleware
                .get(name)
                .map(|m| m.as_ref())
                .ok_or_else(|| DispatchError::MiddlewareNotFound(name.clone())),
        }
    }

    fn run_handler(
        &self,
        route: &Route,
        handler: &Handler,
        req: &mut Request,
        params: &Params,
    ) -> Result<HandlerOutput, DispatchError> {
        let label = handler.to_string();
        let result = match handler {
            Handler::Direct(f) => f(self.ctx.as_ref(), req, params),
            Handler::Symbolic { controller, action } => {
                let key = ControllerKey::new(route.module(), controller.as_str());
                let location = key.location(self.ctx.namespace_root());

                let mut instance = self
                    .controllers
                    .instantiate(&key, Arc::clone(&self.ctx))
                    .ok_or_else(|| HandlerResolutionError::ControllerNotFound {
                        module: key.module.clone(),
                        controller: key.name.clone(),
                        location: location.clone(),
                    })?;

                let not_found = || HandlerResolutionError::ActionNotFound {
                    module: key.module.clone(),
                    controller: key.name.clone(),
                    action: action.clone(),
                    location: location.clone(),
                };
                if !instance.has_action(action) {
                    return Err(not_found().into());
                }
                instance
                    .invoke(action, req, params)
                    .ok_or_else(not_found)?
            }
        };

        result.map_err(|source| {
            HandlerExecutionError::Failed {
                handler: label,
                source,
                trace: capture_trace(),
            }
            .into()
        })
    }

    /// Builds the `500` response for `err` and logs it in full.
    fn fail(&self, route: &Route, req: &Request, err: DispatchError) -> Dispatched {
        let chain = err.chain();
        match &err {
            DispatchError::Resolution(
                HandlerResolutionError::ControllerNotFound {
                    module, controller, ..
                }
                | HandlerResolutionError::ActionNotFound {
                    module, controller, ..
                },
            ) => {
                let action = match route.handler() {
                    Handler::Symbolic { action, .. } => action.as_str(),
                    Handler::Direct(_) => "",
                };
                error!(
                    module = %module,
                    controller = %controller,
                    action = %action,
                    method = %req.method(),
                    path = %req.path(),
                    error = %chain,
                    "Handler resolution failed"
                );
            }
            DispatchError::MiddlewareNotFound(name) => {
                error!(
                    middleware = %name,
                    route = %route.pattern(),
                    method = %req.method(),
                    path = %req.path(),
                    "Middleware is not registered"
                );
            }
            DispatchError::Execution(exec) => {
                error!(
                    route = %route.pattern(),
                    handler = %route.handler(),
                    module = %route.module(),
                    method = %req.method(),
                    path = %req.path(),
                    location = exec.location().unwrap_or("-"),
                    error = %chain,
                    backtrace = exec.trace().unwrap_or("-"),
                    "Request failed"
                );
            }
        }

        let body = if self.ctx.is_debug() {
            let mut body = format!(
                "500 Internal Server Error\n\n{chain}\n\nroute:   {} {}\nhandler: {}\nmodule:  {}\n",
                route.method(),
                route.pattern(),
                route.handler(),
                route.module()
            );
            if let DispatchError::Execution(exec) = &err {
                if let Some(location) = exec.location() {
                    body.push_str(&format!("location: {location}\n"));
                }
                if let Some(trace) = exec.trace() {
                    body.push_str(&format!("\nbacktrace:\n{trace}"));
                }
            }
            body
        } else {
            "500 Internal Server Error".to_string()
        };

        Dispatched {
            response: Response::text(body).with_status(500),
            outcome: DispatchOutcome::Failed(err),
        }
    }
}

// ─── Panic capture ────────────────────────────────────────────────────────────

/// Where a handler panicked, recorded by the panic hook.
#[derive(Debug, Default)]
struct PanicReport {
    location: Option<String>,
    trace: Option<String>,
}

thread_local! {
    /// Set while a handler runs on this thread.
    static CAPTURING: Cell<bool> = const { Cell::new(false) };
    static LAST_PANIC: RefCell<Option<PanicReport>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Wraps the current panic hook once per process. Panics raised inside
/// [`catch_panic`] are recorded instead of printed; all others go to the
/// previous hook.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CAPTURING.with(Cell::get) {
                let report = PanicReport {
                    location: info.location().map(ToString::to_string),
                    trace: capture_trace(),
                };
                LAST_PANIC.with(|last| *last.borrow_mut() = Some(report));
            } else {
                previous(info);
            }
        }));
    });
}

/// Runs `f`, turning a panic into its payload plus the recorded report.
fn catch_panic<T>(f: impl FnOnce() -> T) -> Result<T, (Box<dyn Any + Send>, PanicReport)> {
    install_panic_hook();
    let outer = CAPTURING.with(|c| c.replace(true));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    CAPTURING.with(|c| c.set(outer));

    result.map_err(|payload| {
        let report = LAST_PANIC
            .with(|last| last.borrow_mut().take())
            .unwrap_or_default();
        (payload, report)
    })
}

/// Captures the current stack regardless of `RUST_BACKTRACE`. Only runs on
/// the failure path.
fn capture_trace() -> Option<String> {
    let trace = Backtrace::force_capture();
    (trace.status() == BacktraceStatus::Captured).then(|| trace.to_string())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        warn!("Handler panicked with a non-string payload");
        "non-string panic payload".to_string()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("route_count", &self.routes.len())
            .field("controller_count", &self.controllers.len())
            .field("global_middleware", &self.global.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{Actions, Controller, HandlerResult};
    use crate::middleware::RequireHeader;
    use crate::route::handler;
    use crate::router::Router;
    use keel_core::{MemorySink, Method};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    struct ArticleController {
        ctx: Arc<AppContext>,
    }

    impl ArticleController {
        fn show(&mut self, req: &mut Request, params: &Params) -> HandlerResult {
            let id = params.positional(0).unwrap_or_default();
            assert_eq!(req.param("id"), Some(id));
            let title = self
                .ctx
                .container()
                .make::<String>("site.title")
                .map(|t| t.to_string())
                .unwrap_or_default();
            Ok(Response::text(format!("{title} article {id}"))
                .with_status(200)
                .with_header("X-Article", id)
                .into())
        }

        fn index(&mut self, _req: &mut Request, _params: &Params) -> HandlerResult {
            Ok("all articles".into())
        }

        fn broken(&mut self, _req: &mut Request, _params: &Params) -> HandlerResult {
            Err("database unavailable".into())
        }

        fn explode(&mut self, _req: &mut Request, _params: &Params) -> HandlerResult {
            panic!("kaboom");
        }
    }

    impl Controller for ArticleController {
        fn new(ctx: Arc<AppContext>) -> Self {
            Self { ctx }
        }

        fn actions(actions: &mut Actions<Self>) {
            actions
                .add("show", Self::show)
                .add("index", Self::index)
                .add("broken", Self::broken)
                .add("explode", Self::explode);
        }
    }

    fn controllers() -> ControllerRegistry {
        let mut registry = ControllerRegistry::new();
        registry.register::<ArticleController>("Blog", "Article");
        registry
    }

    fn dispatcher(router: Router, debug: bool) -> Dispatcher {
        let ctx = AppContext::new().with_debug(debug);
        ctx.container().instance("site.title", String::from("Keel"));
        Dispatcher::new(router.freeze(), Arc::new(ctx)).with_controllers(controllers())
    }

    #[test]
    fn test_show_article_scenario() {
        let mut router = Router::new();
        router.resource("articles", "Article", "Blog", ()).unwrap();
        let dispatcher = dispatcher(router, false);

        let mut sink = MemorySink::new();
        let outcome = dispatcher
            .serve(Request::new(Method::Get, "/articles/42"), &mut sink)
            .unwrap();

        assert!(outcome.is_handled());
        assert_eq!(sink.count(), 1);
        let sent = sink.last().unwrap();
        assert_eq!(sent.status, 200);
        assert_eq!(sent.body_text(), "Keel article 42");
        assert_eq!(sent.headers.get("X-Article"), Some("42"));
    }

    #[test]
    fn test_body_output_keeps_working_response() {
        let mut router = Router::new();
        router.get("/articles", "Article@index", "Blog", ()).unwrap();
        let dispatcher = dispatcher(router, false).with_global(MiddlewareRef::instance(
            |_: &mut Request, res: &mut Response| -> Outcome {
                res.set_header("X-Frame-Options", "DENY");
                Outcome::Continue
            },
        ));

        let res = dispatcher.handle(Request::new(Method::Get, "/articles"));
        assert_eq!(res.status(), 200);
        assert_eq!(res.body_text(), "all articles");
        assert_eq!(res.header("X-Frame-Options"), Some("DENY"));
    }

    #[test]
    fn test_direct_handler() {
        let mut router = Router::new();
        router
            .get(
                "/hello/{name}",
                handler(|ctx, _req, params| {
                    Ok(format!("hello {} (debug={})", params.get("name").unwrap_or("?"), ctx.is_debug()).into())
                }),
                "Site",
                (),
            )
            .unwrap();
        let res = dispatcher(router, true).handle(Request::new(Method::Get, "/hello/ana"));
        assert_eq!(res.body_text(), "hello ana (debug=true)");
    }

    #[test]
    fn test_middleware_order_global_then_group_then_route() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let tracker = |label: &'static str| {
            let order = Arc::clone(&order);
            MiddlewareRef::instance(move |_: &mut Request, _: &mut Response| -> Outcome {
                order.lock().push(label);
                Outcome::Continue
            })
        };

        let mut registry = MiddlewareRegistry::new();
        registry.register_arc(
            "group",
            match tracker("group") {
                MiddlewareRef::Instance(m) => m,
                MiddlewareRef::Named(_) => unreachable!(),
            },
        );

        let route_mw = tracker("route");
        let mut router = Router::new();
        router
            .group("/blog", "group", "Blog", |r| {
                r.get("/articles", "Article@index", "Blog", vec![route_mw])?;
                Ok(())
            })
            .unwrap();

        let dispatcher = dispatcher(router, false)
            .with_middleware(registry)
            .with_global(tracker("global"));

        let res = dispatcher.handle(Request::new(Method::Get, "/blog/articles"));
        assert_eq!(res.status(), 200);
        assert_eq!(*order.lock(), vec!["global", "group", "route"]);
    }

    #[test]
    fn test_halt_short_circuits_with_canary() {
        let canary = Arc::new(AtomicUsize::new(0));
        let handler_canary = Arc::clone(&canary);
        let middleware_canary = Arc::clone(&canary);

        let mut router = Router::new();
        router
            .get(
                "/admin",
                handler(move |_, _, _| {
                    handler_canary.fetch_add(1, Ordering::SeqCst);
                    Ok("secret".into())
                }),
                "Admin",
                vec![MiddlewareRef::instance(
                    move |_: &mut Request, _: &mut Response| -> Outcome {
                        middleware_canary.fetch_add(100, Ordering::SeqCst);
                        Outcome::Continue
                    },
                )],
            )
            .unwrap();

        let dispatcher = dispatcher(router, false).with_global(MiddlewareRef::instance(
            RequireHeader::new("Authorization", Response::text("Forbidden").with_status(403)),
        ));

        let mut sink = MemorySink::new();
        let outcome = dispatcher
            .serve(Request::new(Method::Get, "/admin"), &mut sink)
            .unwrap();

        assert!(matches!(outcome, DispatchOutcome::Rejected { ref middleware } if middleware == "require_header"));
        assert_eq!(canary.load(Ordering::SeqCst), 0);
        assert_eq!(sink.count(), 1);
        let sent = sink.last().unwrap();
        assert_eq!(sent.status, 403);
        assert_eq!(sent.body_text(), "Forbidden");
    }

    #[test]
    fn test_group_halt_skips_later_route_middleware() {
        let global_runs = Arc::new(AtomicUsize::new(0));
        let canary = Arc::new(AtomicUsize::new(0));

        let global_counter = Arc::clone(&global_runs);
        let global = MiddlewareRef::instance(move |_: &mut Request, res: &mut Response| -> Outcome {
            global_counter.fetch_add(1, Ordering::SeqCst);
            res.set_header("X-Request-Id", "r-1");
            Outcome::Continue
        });

        let mut registry = MiddlewareRegistry::new();
        registry.register("auth", |_: &mut Request, res: &mut Response| -> Outcome {
            res.set_status(401);
            res.set_body("login required");
            Outcome::Halt
        });

        let route_canary = Arc::clone(&canary);
        let handler_canary = Arc::clone(&canary);
        let mut router = Router::new();
        router
            .group("/admin", "auth", "Admin", |r| {
                r.get(
                    "/users",
                    handler(move |_, _, _| {
                        handler_canary.fetch_add(1, Ordering::SeqCst);
                        Ok("users".into())
                    }),
                    "Admin",
                    vec![MiddlewareRef::instance(
                        move |_: &mut Request, res: &mut Response| -> Outcome {
                            route_canary.fetch_add(100, Ordering::SeqCst);
                            res.set_status(200);
                            Outcome::Continue
                        },
                    )],
                )?;
                Ok(())
            })
            .unwrap();

        let dispatcher = dispatcher(router, false)
            .with_middleware(registry)
            .with_global(global);

        let mut sink = MemorySink::new();
        let outcome = dispatcher
            .serve(Request::new(Method::Get, "/admin/users"), &mut sink)
            .unwrap();

        assert!(matches!(outcome, DispatchOutcome::Rejected { ref middleware } if middleware == "auth"));
        assert_eq!(global_runs.load(Ordering::SeqCst), 1);
        assert_eq!(canary.load(Ordering::SeqCst), 0);
        assert_eq!(sink.count(), 1);
        let sent = sink.last().unwrap();
        assert_eq!(sent.status, 401);
        assert_eq!(sent.body_text(), "login required");
        assert_eq!(sent.headers.get("X-Request-Id"), Some("r-1"));
    }

    #[test]
    #[traced_test]
    fn test_not_found_is_404_and_not_an_error() {
        let mut router = Router::new();
        router.get("/articles", "Article@index", "Blog", ()).unwrap();
        let dispatcher = dispatcher(router, false);

        let mut req = Request::new(Method::Get, "/missing");
        let dispatched = dispatcher.dispatch(&mut req);

        assert!(matches!(dispatched.outcome, DispatchOutcome::NotFound));
        assert_eq!(dispatched.response.status(), 404);
        assert_eq!(dispatched.response.body_text(), "404 Not Found");
        assert!(logs_contain("No route matched"));
        assert!(!logs_contain("ERROR"));
    }

    #[test]
    #[traced_test]
    fn test_handler_error_is_500_and_logged() {
        let mut router = Router::new();
        router.get("/broken", "Article@broken", "Blog", ()).unwrap();
        let dispatcher = dispatcher(router, false);

        let mut req = Request::new(Method::Get, "/broken");
        let dispatched = dispatcher.dispatch(&mut req);

        assert!(matches!(
            dispatched.outcome,
            DispatchOutcome::Failed(DispatchError::Execution(HandlerExecutionError::Failed { .. }))
        ));
        assert_eq!(dispatched.response.status(), 500);
        assert_eq!(dispatched.response.body_text(), "500 Internal Server Error");
        assert!(logs_contain("ERROR"));
        assert!(logs_contain("database unavailable"));
        assert!(logs_contain("backtrace="));

        let DispatchOutcome::Failed(err) = &dispatched.outcome else {
            unreachable!()
        };
        let DispatchError::Execution(exec) = err else {
            unreachable!()
        };
        assert!(exec.trace().is_some_and(|t| !t.is_empty()));
        assert_eq!(exec.location(), None);
    }

    #[test]
    fn test_debug_mode_exposes_details() {
        let mut router = Router::new();
        router.get("/broken", "Article@broken", "Blog", ()).unwrap();
        let res = dispatcher(router, true).handle(Request::new(Method::Get, "/broken"));

        assert_eq!(res.status(), 500);
        let body = res.body_text();
        assert!(body.contains("database unavailable"));
        assert!(body.contains("handler: Article@broken"));
        assert!(body.contains("route:   GET /broken"));
        assert!(body.contains("\nbacktrace:\n"));
        assert!(!body.contains("location:"));
    }

    #[test]
    #[traced_test]
    fn test_panic_is_caught() {
        let mut router = Router::new();
        router.get("/explode", "Article@explode", "Blog", ()).unwrap();
        let dispatcher = dispatcher(router, true);

        let mut req = Request::new(Method::Get, "/explode");
        let dispatched = dispatcher.dispatch(&mut req);
        let DispatchOutcome::Failed(DispatchError::Execution(
            HandlerExecutionError::Panicked {
                ref message,
                ref location,
                ref trace,
                ..
            },
        )) = dispatched.outcome
        else {
            panic!("expected a panic outcome, got {:?}", dispatched.outcome);
        };
        assert_eq!(message, "kaboom");
        let location = location.as_deref().unwrap_or_default();
        assert!(location.contains("dispatcher.rs"), "location was {location:?}");
        assert!(trace.as_deref().is_some_and(|t| !t.is_empty()));

        assert_eq!(dispatched.response.status(), 500);
        let body = dispatched.response.body_text();
        assert!(body.contains(&format!("location: {location}\n")));
        assert!(body.contains("\nbacktrace:\n"));
        assert!(logs_contain("Request failed"));
        assert!(logs_contain(location));

        // the dispatcher keeps serving after a panic
        let res = dispatcher.handle(Request::new(Method::Get, "/nowhere"));
        assert_eq!(res.status(), 404);
    }

    #[test]
    #[traced_test]
    fn test_resolution_errors() {
        let mut router = Router::new();
        router
            .get("/ghost", "Ghost@index", "Blog", ())
            .unwrap()
            .get("/missing-action", "Article@missing", "Blog", ())
            .unwrap();
        let dispatcher = dispatcher(router, false);

        let mut req = Request::new(Method::Get, "/ghost");
        let dispatched = dispatcher.dispatch(&mut req);
        assert!(matches!(
            dispatched.outcome,
            DispatchOutcome::Failed(DispatchError::Resolution(
                HandlerResolutionError::ControllerNotFound { ref location, .. }
            )) if location == "App.Modules.Blog.Controllers.Ghost"
        ));
        assert_eq!(dispatched.response.status(), 500);

        let mut req = Request::new(Method::Get, "/missing-action");
        let dispatched = dispatcher.dispatch(&mut req);
        assert!(matches!(
            dispatched.outcome,
            DispatchOutcome::Failed(DispatchError::Resolution(
                HandlerResolutionError::ActionNotFound { ref action, .. }
            )) if action == "missing"
        ));
        assert!(logs_contain("Handler resolution failed"));
    }

    #[test]
    fn test_unknown_middleware_name_is_500() {
        let mut router = Router::new();
        router.get("/articles", "Article@index", "Blog", "nope").unwrap();
        let dispatcher = dispatcher(router, false);

        let mut req = Request::new(Method::Get, "/articles");
        let dispatched = dispatcher.dispatch(&mut req);
        assert!(matches!(
            dispatched.outcome,
            DispatchOutcome::Failed(DispatchError::MiddlewareNotFound(ref name)) if name == "nope"
        ));
        assert_eq!(dispatched.response.status(), 500);
    }

    #[test]
    fn test_method_override_reaches_update() {
        let mut router = Router::new();
        router
            .put(
                "/articles/{id}",
                handler(|_, req, _| Ok(format!("updated {}", req.form("title").unwrap_or_default()).into())),
                "Blog",
                (),
            )
            .unwrap();
        let req = Request::builder(Method::Post, "/articles/3")
            .form([("_method", "PUT"), ("title", "New")])
            .build();
        let res = dispatcher(router, false).handle(req);
        assert_eq!(res.body_text(), "updated New");
    }

    #[test]
    fn test_dispatcher_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Dispatcher>();
    }
}
