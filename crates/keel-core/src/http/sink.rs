use std::io::Write;

use super::Headers;
use super::response::reason_phrase;
use crate::error::ResponseError;

/// The transport boundary a finished response is written to.
///
/// The front web server owns the socket; a sink only serializes what the
/// pipeline produced. [`Response::send`](super::Response::send) guarantees a
/// sink sees each response at most once.
pub trait ResponseSink {
    fn write_response(
        &mut self,
        status: u16,
        headers: &Headers,
        body: &[u8],
    ) -> Result<(), ResponseError>;
}

/// Writes responses in CGI format: a `Status:` line, headers, a blank line,
/// then the body.
#[derive(Debug)]
pub struct CgiWriter<W: Write> {
    inner: W,
}

impl<W: Write> CgiWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> ResponseSink for CgiWriter<W> {
    fn write_response(
        &mut self,
        status: u16,
        headers: &Headers,
        body: &[u8],
    ) -> Result<(), ResponseError> {
        let reason = reason_phrase(status);
        if reason.is_empty() {
            write!(self.inner, "Status: {status}\r\n")?;
        } else {
            write!(self.inner, "Status: {status} {reason}\r\n")?;
        }
        for (name, value) in headers.iter() {
            write!(self.inner, "{name}: {value}\r\n")?;
        }
        self.inner.write_all(b"\r\n")?;
        self.inner.write_all(body)?;
        self.inner.flush()?;
        Ok(())
    }
}

/// A response captured by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl SentResponse {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A sink that records every response it receives.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    sent: Vec<SentResponse>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of responses written so far.
    pub fn count(&self) -> usize {
        self.sent.len()
    }

    pub fn last(&self) -> Option<&SentResponse> {
        self.sent.last()
    }

    pub fn responses(&self) -> &[SentResponse] {
        &self.sent
    }
}

impl ResponseSink for MemorySink {
    fn write_response(
        &mut self,
        status: u16,
        headers: &Headers,
        body: &[u8],
    ) -> Result<(), ResponseError> {
        self.sent.push(SentResponse {
            status,
            headers: headers.clone(),
            body: body.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Response;

    #[test]
    fn test_cgi_format() {
        let mut writer = CgiWriter::new(Vec::new());
        let mut res = Response::text("hi").with_status(404);
        res.send(&mut writer).unwrap();

        let out = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(
            out,
            "Status: 404 Not Found\r\nContent-Type: text/plain; charset=utf-8\r\n\r\nhi"
        );
    }

    #[test]
    fn test_cgi_unknown_status_has_no_reason() {
        let mut writer = CgiWriter::new(Vec::new());
        writer.write_response(299, &Headers::new(), b"").unwrap();
        assert_eq!(writer.into_inner(), b"Status: 299\r\n\r\n");
    }
}
