//! HTTP abstractions consumed and produced by the dispatch pipeline.
//!
//! Keel sits behind an existing web server, so these types model only what
//! the router, middleware and handlers need: a normalized [`Request`], a
//! mutable [`Response`], and a [`ResponseSink`] that the finished response
//! is written to.

mod extensions;
mod headers;
mod method;
mod params;
mod request;
mod response;
mod sink;

pub use extensions::Extensions;
pub use headers::Headers;
pub use method::Method;
pub use params::Params;
pub use request::{Request, RequestBuilder, normalize_path};
pub use response::Response;
pub use sink::{CgiWriter, MemorySink, ResponseSink, SentResponse};
