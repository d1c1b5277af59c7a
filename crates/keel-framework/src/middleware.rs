//! Named middleware and the built-in middleware set.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use keel_core::{BoxedMiddleware, Middleware, Outcome, Request, Response};
use tracing::{debug, info, warn};

/// Maps middleware names (as used in route and group registrations) to
/// instances.
#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    entries: HashMap<String, BoxedMiddleware>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `middleware` under `name`, replacing any previous entry.
    pub fn register<M>(&mut self, name: impl Into<String>, middleware: M) -> &mut Self
    where
        M: Middleware + 'static,
    {
        self.register_arc(name, Arc::new(middleware))
    }

    pub fn register_arc(&mut self, name: impl Into<String>, middleware: BoxedMiddleware) -> &mut Self {
        let name = name.into();
        debug!(middleware = %name, "Registering middleware");
        if self.entries.insert(name.clone(), middleware).is_some() {
            warn!(middleware = %name, "Middleware registered twice; the last registration wins");
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&BoxedMiddleware> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareRegistry")
            .field("names", &self.names())
            .finish()
    }
}

// ─── Built-ins ────────────────────────────────────────────────────────────────

/// Logs every request at info level and continues.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogger;

impl Middleware for RequestLogger {
    fn process(&self, req: &mut Request, _res: &mut Response) -> Outcome {
        info!(method = %req.method(), path = %req.path(), "Request");
        Outcome::Continue
    }

    fn name(&self) -> &str {
        "request_logger"
    }
}

/// Halts with a fixed response unless the request carries a header.
///
/// ```rust,ignore
/// // 401 for API calls without a token
/// RequireHeader::new("Authorization", Response::text("Unauthorized").with_status(401));
/// // bounce browsers to the login page
/// RequireHeader::new("Cookie", Response::redirect("/login"));
/// ```
#[derive(Debug, Clone)]
pub struct RequireHeader {
    header: String,
    rejection: Response,
}

impl RequireHeader {
    pub fn new(header: impl Into<String>, rejection: Response) -> Self {
        Self {
            header: header.into(),
            rejection,
        }
    }
}

impl Middleware for RequireHeader {
    fn process(&self, req: &mut Request, res: &mut Response) -> Outcome {
        if req.headers().contains(&self.header) {
            return Outcome::Continue;
        }
        debug!(header = %self.header, path = %req.path(), "Required header missing, halting");
        *res = self.rejection.clone();
        Outcome::Halt
    }

    fn name(&self) -> &str {
        "require_header"
    }
}
