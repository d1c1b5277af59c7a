//! Application bootstrap.
//!
//! [`Application`] wires configuration, logging, modules and the dispatch
//! pipeline together. Building one is the whole boot sequence:
//!
//! 1. load and validate [`KeelConfig`]
//! 2. initialize logging from `[logging]`
//! 3. collect modules (linked through [`MODULES`](keel_framework::MODULES)
//!    plus explicit ones), drop the disabled ones, order the rest by name
//! 4. bind every module's services, then its named middleware, then its
//!    controllers, then its routes
//! 5. freeze the route table and build the [`Dispatcher`]
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use keel_runtime::Application;
//!
//! fn main() -> keel_runtime::RuntimeResult<()> {
//!     let app = Application::builder().build()?;
//!     app.serve_cgi()?;
//!     Ok(())
//! }
//! ```

use std::collections::HashSet;
use std::fmt::{self, Write as _};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use keel_core::{CgiWriter, Middleware, Request, Response, ResponseSink};
use keel_framework::{
    AppContext, Container, Controller, ControllerRegistry, DispatchOutcome, Dispatched, Dispatcher,
    MiddlewareRef, MiddlewareRegistry, ModuleDescriptor, RouteResult, RouteTable, Router,
    discovered_modules,
};
use tracing::{debug, info};

use crate::config::{ConfigLoader, KeelConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

type RoutesHook = Box<dyn FnOnce(&mut Router) -> RouteResult<()>>;
type ServicesHook = Box<dyn FnOnce(&Container)>;
type ControllersHook = Box<dyn FnOnce(&mut ControllerRegistry)>;

/// A booted application, ready to serve requests.
pub struct Application {
    config: KeelConfig,
    dispatcher: Dispatcher,
    modules: Vec<&'static str>,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// Dispatches `req` and returns the response without sending it.
    pub fn handle(&self, req: Request) -> Response {
        self.dispatcher.handle(req)
    }

    /// Dispatches `req`, keeping the outcome alongside the response.
    pub fn dispatch(&self, req: &mut Request) -> Dispatched {
        self.dispatcher.dispatch(req)
    }

    /// Dispatches `req` and sends the response to `sink` exactly once.
    pub fn serve(&self, req: Request, sink: &mut dyn ResponseSink) -> RuntimeResult<DispatchOutcome> {
        Ok(self.dispatcher.serve(req, sink)?)
    }

    /// Builds a request from CGI meta-variables, applying `app.base_path`.
    pub fn request_from_cgi<I, K, V>(&self, vars: I, body: Vec<u8>) -> RuntimeResult<Request>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Ok(Request::from_cgi(vars, body, &self.config.app.base_path)?)
    }

    /// Serves one CGI request: reads the process environment and stdin, writes
    /// the response to stdout.
    pub fn serve_cgi(&self) -> RuntimeResult<DispatchOutcome> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        let outcome = self.serve_cgi_from(std::env::vars(), stdin.lock(), stdout.lock())?;
        Ok(outcome)
    }

    /// Serves one CGI request from explicit sources.
    ///
    /// At most `CONTENT_LENGTH` bytes of body are read; without it the input
    /// is read to the end.
    pub fn serve_cgi_from<I, R, W>(&self, vars: I, mut input: R, output: W) -> RuntimeResult<DispatchOutcome>
    where
        I: IntoIterator<Item = (String, String)>,
        R: Read,
        W: Write,
    {
        let vars: Vec<(String, String)> = vars.into_iter().collect();
        let content_length = vars
            .iter()
            .find(|(k, _)| k == "CONTENT_LENGTH")
            .and_then(|(_, v)| v.trim().parse::<u64>().ok());

        let mut body = Vec::new();
        match content_length {
            Some(len) => {
                input.take(len).read_to_end(&mut body)?;
            }
            None => {
                input.read_to_end(&mut body)?;
            }
        }

        let req = self.request_from_cgi(vars, body)?;
        let mut writer = CgiWriter::new(output);
        self.serve(req, &mut writer)
    }

    /// The frozen route table.
    pub fn routes(&self) -> &RouteTable {
        self.dispatcher.routes()
    }

    /// One line per route, in match order.
    pub fn route_list(&self) -> String {
        let mut out = String::new();
        for route in self.routes() {
            let _ = writeln!(out, "{route}");
        }
        out
    }

    pub fn config(&self) -> &KeelConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<AppContext> {
        self.dispatcher.context()
    }

    /// Names of the loaded modules, in load order.
    pub fn modules(&self) -> &[&'static str] {
        &self.modules
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("app", &self.config.app.name)
            .field("modules", &self.modules)
            .field("routes", &self.routes().len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// ApplicationBuilder
// =============================================================================

/// Builder for [`Application`].
pub struct ApplicationBuilder {
    config: Option<KeelConfig>,
    loader: ConfigLoader,
    discover: bool,
    init_logging: bool,
    modules: Vec<ModuleDescriptor>,
    global: Vec<MiddlewareRef>,
    middleware: MiddlewareRegistry,
    controllers: Vec<ControllersHook>,
    services: Vec<ServicesHook>,
    routes: Vec<RoutesHook>,
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            loader: ConfigLoader::new(),
            discover: true,
            init_logging: true,
            modules: Vec::new(),
            global: Vec::new(),
            middleware: MiddlewareRegistry::new(),
            controllers: Vec::new(),
            services: Vec::new(),
            routes: Vec::new(),
        }
    }

    /// Uses `config` as is; no files or environment are read.
    pub fn config(mut self, config: KeelConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replaces the configuration loader.
    pub fn loader(mut self, loader: ConfigLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.loader = self.loader.profile(profile);
        self
    }

    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.loader = self.loader.file(path.into());
        self
    }

    /// Ignores modules linked through `MODULES`; only explicit ones load.
    pub fn without_discovery(mut self) -> Self {
        self.discover = false;
        self
    }

    /// Leaves the global tracing subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    pub fn module(mut self, module: ModuleDescriptor) -> Self {
        self.modules.push(module);
        self
    }

    /// Adds middleware run for every matched route, in call order.
    pub fn global_middleware(mut self, middleware: impl Into<MiddlewareRef>) -> Self {
        self.global.push(middleware.into());
        self
    }

    /// Registers named middleware for use in route and group registrations.
    pub fn middleware<M>(mut self, name: impl Into<String>, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.middleware.register(name, middleware);
        self
    }

    pub fn controller<C: Controller>(mut self, module: &str, name: &str) -> Self {
        let (module, name) = (module.to_string(), name.to_string());
        self.controllers.push(Box::new(move |registry: &mut ControllerRegistry| {
            registry.register::<C>(&module, &name);
        }));
        self
    }

    /// Registers application-level routes, matched after every module's.
    pub fn routes<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut Router) -> RouteResult<()> + 'static,
    {
        self.routes.push(Box::new(f));
        self
    }

    /// Binds application-level services, after every module's.
    pub fn services<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&Container) + 'static,
    {
        self.services.push(Box::new(f));
        self
    }

    pub fn build(self) -> RuntimeResult<Application> {
        let config = match self.config {
            Some(config) => config,
            None => self.loader.load()?,
        };
        validate_config(&config)?;

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let modules = collect_modules(self.discover, self.modules, &config)?;

        let mut ctx = AppContext::new()
            .with_debug(config.app.debug)
            .with_namespace_root(config.app.namespace_root.as_str());
        for module in &modules {
            if let Some(settings) = module_settings(&config, module.name) {
                ctx = ctx.with_module_config(module.name, settings.clone());
            }
        }

        for module in &modules {
            (module.services)(ctx.container());
        }
        for hook in self.services {
            hook(ctx.container());
        }

        let mut middleware = self.middleware;
        for module in &modules {
            (module.middleware)(&mut middleware);
        }

        let mut controllers = ControllerRegistry::new();
        for module in &modules {
            (module.controllers)(&mut controllers);
        }
        for hook in self.controllers {
            hook(&mut controllers);
        }

        let mut router = Router::new();
        for module in &modules {
            let mut module_router = Router::new();
            (module.routes)(&mut module_router).map_err(|source| RuntimeError::Route {
                module: module.name.to_string(),
                source,
            })?;
            debug!(module = module.name, routes = module_router.len(), "Module routes registered");
            router.merge(module_router);
        }
        for hook in self.routes {
            hook(&mut router).map_err(|source| RuntimeError::Route {
                module: "<application>".to_string(),
                source,
            })?;
        }

        let table = router.freeze();
        let names: Vec<&'static str> = modules.iter().map(|m| m.name).collect();

        info!(
            app = %config.app.name,
            debug = config.app.debug,
            modules = ?names,
            routes = table.len(),
            controllers = controllers.len(),
            middleware = middleware.len(),
            "Application booted"
        );

        let dispatcher = Dispatcher::new(table, Arc::new(ctx))
            .with_controllers(controllers)
            .with_middleware(middleware)
            .with_global_list(self.global);

        Ok(Application {
            config,
            dispatcher,
            modules: names,
        })
    }
}

/// Discovered plus explicit modules, minus disabled ones, sorted by name.
fn collect_modules(
    discover: bool,
    explicit: Vec<ModuleDescriptor>,
    config: &KeelConfig,
) -> RuntimeResult<Vec<ModuleDescriptor>> {
    let mut all = if discover { discovered_modules() } else { Vec::new() };
    all.extend(explicit);

    let mut seen = HashSet::new();
    for module in &all {
        if !seen.insert(module.name) {
            return Err(RuntimeError::DuplicateModule(module.name.to_string()));
        }
    }

    let mut modules: Vec<ModuleDescriptor> = all
        .into_iter()
        .filter(|module| {
            let disabled = config.modules.is_disabled(module.name);
            if disabled {
                info!(module = module.name, "Module disabled by configuration");
            }
            !disabled
        })
        .collect();
    modules.sort_by_key(|m| m.name);
    Ok(modules)
}

/// Settings section of `module`; keys from the environment arrive
/// lowercased, so an exact match is tried first.
fn module_settings<'a>(config: &'a KeelConfig, module: &str) -> Option<&'a serde_json::Value> {
    let settings = &config.modules.settings;
    settings.get(module).or_else(|| {
        settings
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(module))
            .map(|(_, value)| value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::{MemorySink, Method, Outcome, Params};
    use keel_framework::{Actions, HandlerResult, MODULES, RequireHeader, handler};
    use linkme::distributed_slice;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize)]
    struct BlogSettings {
        #[serde(default)]
        per_page: usize,
    }

    struct PostController {
        ctx: Arc<AppContext>,
    }

    impl PostController {
        fn index(&mut self, _req: &mut Request, _params: &Params) -> HandlerResult {
            let settings: BlogSettings = self.ctx.module_config("Blog")?;
            Ok(format!("{} per page", settings.per_page).into())
        }

        fn show(&mut self, _req: &mut Request, params: &Params) -> HandlerResult {
            let greeting = self.ctx.container().make::<String>("greeting")?;
            Ok(format!("{greeting} post {}", params.positional(0).unwrap_or_default()).into())
        }
    }

    impl Controller for PostController {
        fn new(ctx: Arc<AppContext>) -> Self {
            Self { ctx }
        }

        fn actions(actions: &mut Actions<Self>) {
            actions.add("index", Self::index).add("show", Self::show);
        }
    }

    fn blog_controllers(registry: &mut ControllerRegistry) {
        registry.register::<PostController>("Blog", "Post");
    }

    fn blog_routes(router: &mut Router) -> RouteResult<()> {
        router.get("/posts", "Post@index", "Blog", ())?;
        router.get("/posts/{id}", "Post@show", "Blog", "members")?;
        Ok(())
    }

    fn blog_services(container: &Container) {
        container.instance("greeting", String::from("hello"));
    }

    fn blog_middleware(registry: &mut MiddlewareRegistry) {
        registry.register(
            "members",
            RequireHeader::new("X-Member", Response::text("members only").with_status(403)),
        );
    }

    const BLOG: ModuleDescriptor = ModuleDescriptor::new("Blog")
        .with_controllers(blog_controllers)
        .with_routes(blog_routes)
        .with_services(blog_services)
        .with_middleware(blog_middleware);

    fn bad_routes(router: &mut Router) -> RouteResult<()> {
        router.get("/x/{a}/{a}", "X@y", "Bad", ())?;
        Ok(())
    }

    fn linked_routes(router: &mut Router) -> RouteResult<()> {
        router.get("/linked", handler(|_, _, _| Ok("linked".into())), "Linked", ())?;
        Ok(())
    }

    #[distributed_slice(MODULES)]
    static LINKED: ModuleDescriptor = ModuleDescriptor::new("Linked").with_routes(linked_routes);

    fn config() -> KeelConfig {
        let mut config = KeelConfig::default();
        config
            .modules
            .settings
            .insert("blog".into(), serde_json::json!({ "per_page": 7 }));
        config
    }

    fn app() -> Application {
        Application::builder()
            .config(config())
            .without_logging()
            .without_discovery()
            .module(BLOG)
            .build()
            .unwrap()
    }

    #[test]
    fn test_module_routes_controllers_and_settings() {
        let app = app();
        assert_eq!(app.modules(), &["Blog"]);
        assert_eq!(app.routes().len(), 2);

        let res = app.handle(Request::new(Method::Get, "/posts"));
        assert_eq!(res.status(), 200);
        assert_eq!(res.body_text(), "7 per page");
    }

    #[test]
    fn test_module_middleware_and_services() {
        let app = app();

        let res = app.handle(Request::new(Method::Get, "/posts/3"));
        assert_eq!(res.status(), 403);
        assert_eq!(res.body_text(), "members only");

        let req = Request::builder(Method::Get, "/posts/3")
            .header("X-Member", "1")
            .build();
        let res = app.handle(req);
        assert_eq!(res.status(), 200);
        assert_eq!(res.body_text(), "hello post 3");
    }

    #[test]
    fn test_serve_sends_once() {
        let app = app();
        let mut sink = MemorySink::new();
        let outcome = app
            .serve(Request::new(Method::Get, "/missing"), &mut sink)
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::NotFound));
        assert_eq!(sink.count(), 1);
        assert_eq!(sink.last().unwrap().status, 404);
    }

    #[test]
    fn test_duplicate_module_is_rejected() {
        let err = Application::builder()
            .config(KeelConfig::default())
            .without_logging()
            .without_discovery()
            .module(BLOG)
            .module(BLOG)
            .build()
            .unwrap_err();
        assert!(matches!(err, RuntimeError::DuplicateModule(ref name) if name == "Blog"));
    }

    #[test]
    fn test_disabled_module_is_skipped() {
        let mut config = config();
        config.modules.disabled.push("BLOG".into());
        let app = Application::builder()
            .config(config)
            .without_logging()
            .without_discovery()
            .module(BLOG)
            .build()
            .unwrap();
        assert!(app.modules().is_empty());
        assert_eq!(app.handle(Request::new(Method::Get, "/posts")).status(), 404);
    }

    #[test]
    fn test_route_error_names_module() {
        let err = Application::builder()
            .config(KeelConfig::default())
            .without_logging()
            .without_discovery()
            .module(ModuleDescriptor::new("Bad").with_routes(bad_routes))
            .build()
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Route { ref module, .. } if module == "Bad"));
    }

    #[test]
    fn test_discovery_and_application_hooks() {
        let app = Application::builder()
            .config(KeelConfig::default())
            .without_logging()
            .global_middleware(MiddlewareRef::instance(
                |_: &mut Request, res: &mut Response| {
                    res.set_header("X-Global", "1");
                    Outcome::Continue
                },
            ))
            .services(|c| c.instance("motto", String::from("steady")))
            .routes(|router| {
                router.get(
                    "/motto",
                    handler(|ctx, _, _| Ok(ctx.container().make::<String>("motto")?.to_string().into())),
                    "App",
                    (),
                )?;
                Ok(())
            })
            .build()
            .unwrap();

        assert!(app.modules().contains(&"Linked"));
        assert_eq!(app.handle(Request::new(Method::Get, "/linked")).body_text(), "linked");

        let res = app.handle(Request::new(Method::Get, "/motto"));
        assert_eq!(res.body_text(), "steady");
        assert_eq!(res.header("X-Global"), Some("1"));
    }

    #[test]
    fn test_cgi_round_trip() {
        let mut config = config();
        config.app.base_path = "/blog".into();
        let app = Application::builder()
            .config(config)
            .without_logging()
            .without_discovery()
            .module(BLOG)
            .build()
            .unwrap();

        let vars = vec![
            ("REQUEST_METHOD".to_string(), "GET".to_string()),
            ("REQUEST_URI".to_string(), "/blog/posts".to_string()),
            ("CONTENT_LENGTH".to_string(), "0".to_string()),
        ];
        let mut out = Vec::new();
        let outcome = app.serve_cgi_from(vars, io::empty(), &mut out).unwrap();
        assert!(outcome.is_handled());

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Status: 200 OK\r\n"));
        assert!(text.ends_with("\r\n\r\n7 per page"));
    }

    #[test]
    fn test_cgi_without_method_fails() {
        let app = app();
        let mut out = Vec::new();
        let err = app
            .serve_cgi_from(Vec::new(), io::empty(), &mut out)
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Request(_)));
        assert!(out.is_empty());
    }

    #[test]
    fn test_route_list() {
        let listing = app().route_list();
        assert_eq!(listing.lines().count(), 2);
        assert!(listing.contains("/posts/{id}"));
    }
}
