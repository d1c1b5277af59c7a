//! Controllers and the controller registry.
//!
//! A controller is a plain struct constructed per request from the
//! [`AppContext`]. Its actions are listed once, as a static table of
//! `(name, fn pointer)` pairs, so a symbolic handler like `Article@show`
//! resolves without reflection:
//!
//! ```rust,ignore
//! struct ArticleController {
//!     ctx: Arc<AppContext>,
//! }
//!
//! impl Controller for ArticleController {
//!     fn new(ctx: Arc<AppContext>) -> Self {
//!         Self { ctx }
//!     }
//!
//!     fn actions(actions: &mut Actions<Self>) {
//!         actions.add("index", Self::index).add("show", Self::show);
//!     }
//! }
//!
//! registry.register::<ArticleController>("Blog", "Article");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use keel_core::{BoxError, Params, Request, Response};
use tracing::{debug, warn};

use crate::context::AppContext;

// ─── Handler output ───────────────────────────────────────────────────────────

/// What a handler hands back to the pipeline.
#[derive(Debug)]
pub enum HandlerOutput {
    /// Becomes the body of the working response.
    Body(String),
    /// Replaces the working response.
    Response(Response),
    /// Keeps the working response as is.
    Empty,
}

impl From<String> for HandlerOutput {
    fn from(body: String) -> Self {
        Self::Body(body)
    }
}

impl From<&str> for HandlerOutput {
    fn from(body: &str) -> Self {
        Self::Body(body.to_string())
    }
}

impl From<Response> for HandlerOutput {
    fn from(res: Response) -> Self {
        Self::Response(res)
    }
}

impl From<()> for HandlerOutput {
    fn from(_: ()) -> Self {
        Self::Empty
    }
}

/// Result returned by every action and inline handler.
pub type HandlerResult = Result<HandlerOutput, BoxError>;

// ─── Controller ───────────────────────────────────────────────────────────────

/// Signature of a controller action. Params arrive in the placeholder order
/// of the matched route.
pub type ActionFn<C> = fn(&mut C, &mut Request, &Params) -> HandlerResult;

/// An action table under construction.
pub struct Actions<C> {
    table: Vec<(&'static str, ActionFn<C>)>,
}

impl<C> Actions<C> {
    fn new() -> Self {
        Self { table: Vec::new() }
    }

    /// Adds `f` under `name`. Re-adding a name replaces the earlier entry.
    pub fn add(&mut self, name: &'static str, f: ActionFn<C>) -> &mut Self {
        self.table.retain(|(n, _)| *n != name);
        self.table.push((name, f));
        self
    }
}

/// A request-scoped controller.
pub trait Controller: Sized + Send + 'static {
    /// Builds a fresh instance for one request.
    fn new(ctx: Arc<AppContext>) -> Self;

    /// Fills the action table. Called once, at registration.
    fn actions(actions: &mut Actions<Self>);
}

/// A constructed controller with its action table, type-erased.
pub trait ControllerInstance: Send {
    fn has_action(&self, action: &str) -> bool;

    /// Runs `action`; `None` if the controller has no such action.
    fn invoke(
        &mut self,
        action: &str,
        req: &mut Request,
        params: &Params,
    ) -> Option<HandlerResult>;
}

struct Bound<C: Controller> {
    inner: C,
    actions: Arc<[(&'static str, ActionFn<C>)]>,
}

impl<C: Controller> ControllerInstance for Bound<C> {
    fn has_action(&self, action: &str) -> bool {
        self.actions.iter().any(|(name, _)| *name == action)
    }

    fn invoke(
        &mut self,
        action: &str,
        req: &mut Request,
        params: &Params,
    ) -> Option<HandlerResult> {
        let (_, f) = self.actions.iter().find(|(name, _)| *name == action)?;
        Some(f(&mut self.inner, req, params))
    }
}

// ─── Registry ─────────────────────────────────────────────────────────────────

/// Registry key: the owning module and the short controller name, as written
/// before the `@` in a handler string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControllerKey {
    pub module: String,
    pub name: String,
}

impl ControllerKey {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }

    /// The fully-qualified location, e.g. `App.Modules.Blog.Controllers.Article`.
    pub fn location(&self, root: &str) -> String {
        format!("{root}.Modules.{}.Controllers.{}", self.module, self.name)
    }
}

impl fmt::Display for ControllerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.module, self.name)
    }
}

type Factory = Arc<dyn Fn(Arc<AppContext>) -> Box<dyn ControllerInstance> + Send + Sync>;

#[derive(Clone)]
struct Entry {
    factory: Factory,
    actions: Vec<&'static str>,
}

/// Maps `(module, controller)` to a constructor, filled at bootstrap.
#[derive(Clone, Default)]
pub struct ControllerRegistry {
    entries: HashMap<ControllerKey, Entry>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `C` as controller `name` of `module`.
    ///
    /// A second registration under the same key replaces the first.
    pub fn register<C: Controller>(&mut self, module: &str, name: &str) -> &mut Self {
        let mut table = Actions::new();
        C::actions(&mut table);
        let actions: Arc<[(&'static str, ActionFn<C>)]> = table.table.into();
        let names = actions.iter().map(|(n, _)| *n).collect();

        let factory: Factory = Arc::new(move |ctx| {
            Box::new(Bound {
                inner: C::new(ctx),
                actions: Arc::clone(&actions),
            }) as Box<dyn ControllerInstance>
        });

        let key = ControllerKey::new(module, name);
        debug!(controller = %key, "Registering controller");
        if self
            .entries
            .insert(key.clone(), Entry { factory, actions: names })
            .is_some()
        {
            warn!(controller = %key, "Controller registered twice; the last registration wins");
        }
        self
    }

    pub fn contains(&self, key: &ControllerKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Action names of a registered controller, in table order.
    pub fn actions(&self, key: &ControllerKey) -> Option<&[&'static str]> {
        self.entries.get(key).map(|e| e.actions.as_slice())
    }

    /// Constructs the controller registered under `key`.
    pub fn instantiate(
        &self,
        key: &ControllerKey,
        ctx: Arc<AppContext>,
    ) -> Option<Box<dyn ControllerInstance>> {
        self.entries.get(key).map(|e| (e.factory)(ctx))
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&ControllerKey> {
        let mut keys: Vec<_> = self.entries.keys().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerRegistry")
            .field("controllers", &self.keys())
            .finish()
    }
}
