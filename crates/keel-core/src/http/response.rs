use std::borrow::Cow;

use serde::Serialize;
use tracing::warn;

use super::{Headers, ResponseSink};
use crate::error::ResponseError;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const TEXT_HTML: &str = "text/html; charset=utf-8";
const APPLICATION_JSON: &str = "application/json";

/// An outbound HTTP response.
///
/// The pipeline creates one working response per request; middleware and
/// handlers mutate it (or a handler replaces it outright). Once
/// [`send`](Response::send) succeeds the response is marked sent and any
/// further `send` fails with [`ResponseError::AlreadySent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    headers: Headers,
    body: Vec<u8>,
    sent: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self::new(200)
    }
}

impl Response {
    /// Creates an empty response with the given status.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
            sent: false,
        }
    }

    /// A `200 OK` plain-text response.
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(200)
            .with_header("Content-Type", TEXT_PLAIN)
            .with_body(body.into())
    }

    /// A `200 OK` HTML response.
    pub fn html(body: impl Into<String>) -> Self {
        Self::new(200)
            .with_header("Content-Type", TEXT_HTML)
            .with_body(body.into())
    }

    /// A `200 OK` JSON response.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new(200)
            .with_header("Content-Type", APPLICATION_JSON)
            .with_body(body))
    }

    /// A `302 Found` redirect to `location`.
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::new(302).with_header("Location", location)
    }

    /// The plain `404 Not Found` response used when no route matches.
    pub fn not_found() -> Self {
        Self::text("404 Not Found").with_status(404)
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Sets a header, replacing previous values.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body decoded as UTF-8, lossily.
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns `true` if the status is 3xx and a `Location` header is set.
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status) && self.headers.contains("Location")
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// Writes the response to `sink`.
    ///
    /// A response is sent at most once. A missing `Content-Type` on a
    /// non-empty body defaults to HTML.
    pub fn send(&mut self, sink: &mut dyn ResponseSink) -> Result<(), ResponseError> {
        if self.sent {
            warn!(status = self.status, "Attempted to send a response twice");
            return Err(ResponseError::AlreadySent);
        }
        if !self.body.is_empty() && !self.headers.contains("Content-Type") {
            self.headers.insert("Content-Type", TEXT_HTML);
        }
        sink.write_response(self.status, &self.headers, &self.body)?;
        self.sent = true;
        Ok(())
    }
}

/// The reason phrase for common status codes.
pub(crate) fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        419 => "Page Expired",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::MemorySink;

    #[test]
    fn test_constructors() {
        let res = Response::redirect("/login");
        assert_eq!(res.status(), 302);
        assert!(res.is_redirect());

        let res = Response::not_found();
        assert_eq!(res.status(), 404);
        assert_eq!(res.body_text(), "404 Not Found");
        assert_eq!(res.header("content-type"), Some(TEXT_PLAIN));
    }

    #[test]
    fn test_json() {
        let res = Response::json(&serde_json::json!({ "id": 42 })).unwrap();
        assert_eq!(res.header("Content-Type"), Some(APPLICATION_JSON));
        assert_eq!(res.body_text(), r#"{"id":42}"#);
    }

    #[test]
    fn test_send_only_once() {
        let mut sink = MemorySink::new();
        let mut res = Response::new(201).with_body("created");

        res.send(&mut sink).unwrap();
        assert!(res.is_sent());
        assert!(matches!(res.send(&mut sink), Err(ResponseError::AlreadySent)));

        assert_eq!(sink.count(), 1);
        let sent = sink.last().unwrap();
        assert_eq!(sent.status, 201);
        assert_eq!(sent.headers.get("Content-Type"), Some(TEXT_HTML));
    }
}
