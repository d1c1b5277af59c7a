//! # Keel Core
//!
//! Foundation types shared by every layer of the Keel HMVC framework.
//!
//! This crate deliberately knows nothing about routing or modules. It provides:
//!
//! - **HTTP abstractions**: [`Request`], [`Response`], [`Headers`], [`Method`]
//!   and the [`Params`] extracted from a matched route.
//! - **Transport boundary**: the [`ResponseSink`] trait that a finished
//!   response is written to exactly once, with a CGI writer and an in-memory
//!   sink.
//! - **Middleware contract**: the [`Middleware`] trait and its two-case
//!   [`Outcome`].
//! - **Errors**: [`HttpError`], [`ResponseError`] and the [`BoxError`] alias
//!   used for handler failures.
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌──────────┐   ┌──────────────┐
//! │ web server   │──▶│  Request   │──▶│ pipeline │──▶│   Response   │──▶ ResponseSink
//! │ (CGI / FFI)  │   │ normalized │   │          │   │  sent once   │
//! └──────────────┘   └────────────┘   └──────────┘   └──────────────┘
//! ```

pub mod error;
pub mod http;
pub mod middleware;

pub use error::{BoxError, HttpError, HttpResult, ResponseError};
pub use http::{
    CgiWriter, Extensions, Headers, MemorySink, Method, Params, Request, RequestBuilder,
    Response, ResponseSink, SentResponse, normalize_path,
};
pub use middleware::{BoxedMiddleware, Middleware, Outcome};

/// Prelude for common imports.
pub mod prelude {
    pub use super::http::{Method, Params, Request, Response};
    pub use super::middleware::{Middleware, Outcome};
}
