use std::collections::HashMap;

use serde::de::DeserializeOwned;
use url::form_urlencoded;

use super::{Extensions, Headers, Method, Params};
use crate::error::{HttpError, HttpResult};

/// Header that carries a method override on a POST request.
const METHOD_OVERRIDE_HEADER: &str = "X-HTTP-Method-Override";
/// Form field that carries a method override on a POST request.
const METHOD_OVERRIDE_FIELD: &str = "_method";

/// Normalizes a request path for routing.
///
/// The query string and fragment are dropped, `base_path` is stripped when
/// the path starts with it (segment-wise), repeated and trailing slashes are
/// collapsed, and the result always has exactly one leading slash. An empty
/// result becomes `/`.
pub fn normalize_path(path: &str, base_path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let base: Vec<&str> = base_path.split('/').filter(|s| !s.is_empty()).collect();

    let rest = if !base.is_empty() && segments.starts_with(&base) {
        &segments[base.len()..]
    } else {
        &segments[..]
    };

    if rest.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", rest.join("/"))
    }
}

fn parse_pairs(input: &[u8]) -> HashMap<String, String> {
    form_urlencoded::parse(input).into_owned().collect()
}

/// Drops `scheme://authority` from an absolute request target.
///
/// Only a leading scheme counts; a `://` inside the path or query (for
/// example `?next=https://...`) leaves the target untouched.
fn strip_authority(uri: &str) -> &str {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return uri;
    };
    let is_scheme = scheme
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !is_scheme {
        return uri;
    }
    rest.find(['/', '?', '#']).map_or("/", |idx| &rest[idx..])
}

/// An inbound HTTP request, normalized for routing.
///
/// Build one with [`Request::builder`] (or [`Request::from_cgi`] behind a CGI
/// server). Building parses the query string, decodes an
/// `application/x-www-form-urlencoded` body, normalizes the path and applies
/// any method override.
#[derive(Debug)]
pub struct Request {
    method: Method,
    original_method: Method,
    uri: String,
    path: String,
    query: HashMap<String, String>,
    form: HashMap<String, String>,
    headers: Headers,
    body: Vec<u8>,
    params: Params,
    extensions: Extensions,
}

impl Request {
    /// Starts building a request.
    pub fn builder(method: Method, uri: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            method,
            uri: uri.into(),
            headers: Headers::new(),
            body: Vec::new(),
            base_path: String::new(),
        }
    }

    /// Builds a request with no headers or body.
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self::builder(method, uri).build()
    }

    /// Builds a request from CGI meta-variables and the raw body.
    ///
    /// `REQUEST_METHOD` is required. The target comes from `REQUEST_URI`, or
    /// `PATH_INFO` plus `QUERY_STRING` when the server does not set it.
    /// `CONTENT_TYPE` and every `HTTP_*` variable become headers.
    pub fn from_cgi<I, K, V>(vars: I, body: Vec<u8>, base_path: &str) -> HttpResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> =
            vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();

        let method: Method = vars
            .get("REQUEST_METHOD")
            .ok_or(HttpError::MissingVariable("REQUEST_METHOD"))?
            .parse()?;

        let uri = match vars.get("REQUEST_URI") {
            Some(uri) => uri.clone(),
            None => {
                let path = vars.get("PATH_INFO").cloned().unwrap_or_else(|| "/".into());
                match vars.get("QUERY_STRING").filter(|q| !q.is_empty()) {
                    Some(query) => format!("{path}?{query}"),
                    None => path,
                }
            }
        };

        let mut builder = Request::builder(method, uri).base_path(base_path);
        if let Some(content_type) = vars.get("CONTENT_TYPE") {
            builder = builder.header("Content-Type", content_type.as_str());
        }
        for (key, value) in &vars {
            if let Some(name) = key.strip_prefix("HTTP_") {
                builder = builder.header(name.replace('_', "-").to_ascii_lowercase(), value.as_str());
            }
        }

        Ok(builder.body(body).build())
    }

    /// The effective method, after any override.
    pub fn method(&self) -> Method {
        self.method
    }

    /// The method the client actually sent.
    pub fn original_method(&self) -> Method {
        self.original_method
    }

    /// The raw request target as received.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The normalized routing path.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn query_params(&self) -> &HashMap<String, String> {
        &self.query
    }

    pub fn form(&self, name: &str) -> Option<&str> {
        self.form.get(name).map(String::as_str)
    }

    pub fn form_params(&self) -> &HashMap<String, String> {
        &self.form
    }

    /// Looks `name` up in the form body first, then the query string.
    pub fn input(&self, name: &str) -> Option<&str> {
        self.form(name).or_else(|| self.query(name))
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body as UTF-8 text.
    pub fn text(&self) -> HttpResult<&str> {
        std::str::from_utf8(&self.body).map_err(|_| HttpError::InvalidUtf8)
    }

    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> HttpResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// A route parameter captured by the matched route.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Attaches the parameters of the matched route.
    ///
    /// Called by the dispatcher once matching succeeds.
    pub fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

/// Builder for [`Request`].
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    uri: String,
    headers: Headers,
    body: Vec<u8>,
    base_path: String,
}

impl RequestBuilder {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a urlencoded form body and the matching content type.
    pub fn form<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        self.headers
            .insert("Content-Type", "application/x-www-form-urlencoded");
        self.body = encoded.into_bytes();
        self
    }

    /// Sets the prefix stripped from the path before routing.
    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn build(self) -> Request {
        let target = strip_authority(&self.uri);
        let (raw_path, raw_query) = target.split_once('?').unwrap_or((target, ""));
        let raw_query = raw_query.split('#').next().unwrap_or_default();

        let query = parse_pairs(raw_query.as_bytes());
        let is_form = self
            .headers
            .get("Content-Type")
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
        let form = if is_form {
            parse_pairs(&self.body)
        } else {
            HashMap::new()
        };

        let method = resolve_method(self.method, &form, &query, &self.headers);
        let path = normalize_path(raw_path, &self.base_path);

        Request {
            method,
            original_method: self.method,
            path,
            uri: self.uri,
            query,
            form,
            headers: self.headers,
            body: self.body,
            params: Params::new(),
            extensions: Extensions::new(),
        }
    }
}

/// Applies a `_method` field (body, then query) or override header to a POST.
fn resolve_method(
    method: Method,
    form: &HashMap<String, String>,
    query: &HashMap<String, String>,
    headers: &Headers,
) -> Method {
    if method != Method::Post {
        return method;
    }

    let requested = form
        .get(METHOD_OVERRIDE_FIELD)
        .or_else(|| query.get(METHOD_OVERRIDE_FIELD))
        .map(String::as_str)
        .or_else(|| headers.get(METHOD_OVERRIDE_HEADER));

    match requested.and_then(|m| m.parse::<Method>().ok()) {
        Some(target) if target.is_overridable_target() => target,
        _ => method,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("", ""), "/");
        assert_eq!(normalize_path("/", ""), "/");
        assert_eq!(normalize_path("articles/", ""), "/articles");
        assert_eq!(normalize_path("//articles///42/", ""), "/articles/42");
        assert_eq!(normalize_path("/articles?page=2", ""), "/articles");
    }

    #[test]
    fn test_normalize_strips_base_path_by_segment() {
        assert_eq!(normalize_path("/app/articles", "/app"), "/articles");
        assert_eq!(normalize_path("/app", "/app/"), "/");
        assert_eq!(normalize_path("/application/x", "/app"), "/application/x");
    }

    #[test]
    fn test_query_and_absolute_uri() {
        let req = Request::new(Method::Get, "http://example.com/search/?q=rust+lang&page=2#top");
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query("q"), Some("rust lang"));
        assert_eq!(req.query("page"), Some("2"));
    }

    #[test]
    fn test_url_in_query_does_not_change_path() {
        let req = Request::new(Method::Get, "/login?next=https://example.com/admin/users");
        assert_eq!(req.path(), "/login");
        assert_eq!(req.query("next"), Some("https://example.com/admin/users"));

        let req = Request::new(Method::Get, "/go/https://example.com/x");
        assert_eq!(req.path(), "/go/https:/example.com/x");

        let req = Request::new(Method::Get, "https://example.com?next=http://a/b");
        assert_eq!(req.path(), "/");
        assert_eq!(req.query("next"), Some("http://a/b"));
    }

    #[test]
    fn test_form_body_and_method_override() {
        let req = Request::builder(Method::Post, "/articles/5")
            .form([("_method", "put"), ("title", "Hello")])
            .build();
        assert_eq!(req.method(), Method::Put);
        assert_eq!(req.original_method(), Method::Post);
        assert_eq!(req.form("title"), Some("Hello"));
        assert_eq!(req.input("title"), Some("Hello"));
    }

    #[test]
    fn test_override_header() {
        let req = Request::builder(Method::Post, "/articles/5")
            .header("x-http-method-override", "DELETE")
            .build();
        assert_eq!(req.method(), Method::Delete);
    }

    #[test]
    fn test_override_ignored_unless_post_and_target_allowed() {
        let req = Request::builder(Method::Get, "/x?_method=DELETE")
            .header(METHOD_OVERRIDE_HEADER, "DELETE")
            .build();
        assert_eq!(req.method(), Method::Get);

        let req = Request::builder(Method::Post, "/x")
            .form([("_method", "GET")])
            .build();
        assert_eq!(req.method(), Method::Post);
    }

    #[test]
    fn test_json_body() {
        #[derive(serde::Deserialize)]
        struct Payload {
            title: String,
        }

        let req = Request::builder(Method::Post, "/api")
            .header("Content-Type", "application/json")
            .body(r#"{"title":"x"}"#)
            .build();
        assert!(req.form_params().is_empty());
        assert_eq!(req.json::<Payload>().unwrap().title, "x");
    }

    #[test]
    fn test_from_cgi() {
        let vars = vec![
            ("REQUEST_METHOD", "POST"),
            ("PATH_INFO", "/blog/posts/"),
            ("QUERY_STRING", "draft=1"),
            ("CONTENT_TYPE", "application/x-www-form-urlencoded"),
            ("HTTP_X_REQUESTED_WITH", "XMLHttpRequest"),
        ];
        let req = Request::from_cgi(vars, b"_method=PATCH".to_vec(), "/blog").unwrap();

        assert_eq!(req.method(), Method::Patch);
        assert_eq!(req.path(), "/posts");
        assert_eq!(req.query("draft"), Some("1"));
        assert_eq!(req.header("X-Requested-With"), Some("XMLHttpRequest"));
    }

    #[test]
    fn test_from_cgi_requires_method() {
        let vars: Vec<(String, String)> = Vec::new();
        let err = Request::from_cgi(vars, Vec::new(), "").unwrap_err();
        assert!(matches!(err, HttpError::MissingVariable("REQUEST_METHOD")));
    }
}
