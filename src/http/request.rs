//! The inbound request as seen by the router.

use super::{Headers, Method};

/// A parsed request head: method, path, and headers.
///
/// The connection layer builds one per request. A query string, if the raw
/// target carries one, is split off and kept verbatim; the router matches on
/// the path alone.
///
/// # Examples
///
/// ```
/// use switchyard::http::{Method, Request};
///
/// let request = Request::new(Method::Get, "/search?q=rust")
///     .with_header("Host", "localhost");
///
/// assert_eq!(request.path(), "/search");
/// assert_eq!(request.query_string(), Some("q=rust"));
/// assert_eq!(request.headers().get("host"), Some("localhost"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    headers: Headers,
}

impl Request {
    /// Creates a request for `method` and the raw request target `target`.
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        let mut path = target.into();
        let query = path.find('?').map(|pos| {
            let query = path[pos + 1..].to_owned();
            path.truncate(pos);
            query
        });

        Self {
            method,
            path,
            query,
            headers: Headers::new(),
        }
    }

    /// Appends a header and returns the request.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replaces the header map wholesale.
    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns `true` if this request asks to switch to the WebSocket protocol
    /// (`Connection: Upgrade` plus `Upgrade: websocket`).
    pub fn is_websocket_upgrade(&self) -> bool {
        self.headers.has_token("connection", "upgrade")
            && self.headers.has_token("upgrade", "websocket")
    }
}
