//! Middleware contract.
//!
//! A middleware inspects and may mutate the request and the working
//! response, then either lets the pipeline continue or halts it. A halted
//! pipeline sends the response exactly as the middleware left it; no
//! further middleware or handler runs.
//!
//! # Example
//!
//! ```rust,ignore
//! use keel_core::prelude::*;
//!
//! struct RequireJson;
//!
//! impl Middleware for RequireJson {
//!     fn process(&self, req: &mut Request, res: &mut Response) -> Outcome {
//!         if req.header("Content-Type") == Some("application/json") {
//!             return Outcome::Continue;
//!         }
//!         res.set_status(415);
//!         Outcome::Halt
//!     }
//! }
//! ```

use std::sync::Arc;

use crate::http::{Request, Response};

/// Result of running one middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Proceed to the next middleware or the handler.
    Continue,
    /// Stop the pipeline and send the current response.
    Halt,
}

impl Outcome {
    pub fn is_halt(self) -> bool {
        self == Outcome::Halt
    }
}

/// `true` continues, `false` halts.
impl From<bool> for Outcome {
    fn from(proceed: bool) -> Self {
        if proceed {
            Outcome::Continue
        } else {
            Outcome::Halt
        }
    }
}

/// A unit of request pre-processing.
pub trait Middleware: Send + Sync {
    fn process(&self, req: &mut Request, res: &mut Response) -> Outcome;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<F> Middleware for F
where
    F: Fn(&mut Request, &mut Response) -> Outcome + Send + Sync,
{
    fn process(&self, req: &mut Request, res: &mut Response) -> Outcome {
        self(req, res)
    }

    fn name(&self) -> &str {
        "closure"
    }
}

/// Shared, type-erased middleware.
pub type BoxedMiddleware = Arc<dyn Middleware>;
