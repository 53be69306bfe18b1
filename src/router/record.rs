//! Route and middleware records, route options, and handler types.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::pattern::{Pattern, PatternError};
use crate::context::Context;
use crate::http::{Method, Response, StatusCode};
use crate::middleware::MiddlewareHandler;
use crate::realtime::Websocket;

/// Error type returned by failing handlers and middleware.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A pinned, boxed, `Send` future.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Type-erased HTTP handler.
///
/// In practice you never construct this type directly; pass closures to
/// [`Router::get`](super::Router::get) and friends, or wrap one with
/// [`handler`] when using the argument-list form.
pub type Handler = Arc<dyn Fn(Context) -> BoxFuture<Result<Response, BoxError>> + Send + Sync>;

/// Type-erased WebSocket handler, invoked once the handshake has completed.
pub type WsHandler = Arc<dyn Fn(Websocket) -> BoxFuture<Result<(), BoxError>> + Send + Sync>;

/// Values a handler or middleware future may resolve to.
pub trait Reply: Send + 'static {
    fn into_result(self) -> Result<Response, BoxError>;
}

impl Reply for Response {
    fn into_result(self) -> Result<Response, BoxError> {
        Ok(self)
    }
}

impl Reply for StatusCode {
    fn into_result(self) -> Result<Response, BoxError> {
        Ok(Response::new(self))
    }
}

impl Reply for Result<Response, BoxError> {
    fn into_result(self) -> Result<Response, BoxError> {
        self
    }
}

/// Conversion trait for async HTTP handler functions.
///
/// Implemented for every `Fn(Context) -> impl Future<Output = impl Reply>`
/// that is `Send + Sync + 'static`.
pub trait IntoHandler: Send + Sync + 'static {
    /// Call the handler with the given context, boxing the returned future.
    fn call(&self, ctx: Context) -> BoxFuture<Result<Response, BoxError>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future + Send + 'static,
    F::Output: Reply,
{
    fn call(&self, ctx: Context) -> BoxFuture<Result<Response, BoxError>> {
        let fut = (self)(ctx);
        Box::pin(async move { fut.await.into_result() })
    }
}

/// Conversion trait for async WebSocket handler functions.
pub trait IntoWsHandler: Send + Sync + 'static {
    fn call(&self, websocket: Websocket) -> BoxFuture<Result<(), BoxError>>;
}

impl<T, F> IntoWsHandler for T
where
    T: Fn(Websocket) -> F + Send + Sync + 'static,
    F: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    fn call(&self, websocket: Websocket) -> BoxFuture<Result<(), BoxError>> {
        Box::pin((self)(websocket))
    }
}

/// Erase a handler function into a [`Handler`].
pub fn handler(handler: impl IntoHandler) -> Handler {
    Arc::new(move |ctx| handler.call(ctx))
}

/// Erase a WebSocket handler function into a [`WsHandler`].
pub fn ws_handler(handler: impl IntoWsHandler) -> WsHandler {
    Arc::new(move |ws| handler.call(ws))
}

/// The table a route is registered in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RouteMethod {
    /// A method-specific HTTP route.
    Http(Method),
    /// Any-method fallback, consulted when no method-specific route matches.
    Any,
    /// HTTP route intercepting `Upgrade: websocket` requests.
    Upgrade,
    /// WebSocket route, invoked after the handshake.
    Ws,
}

impl RouteMethod {
    pub fn is_ws(&self) -> bool {
        matches!(self, RouteMethod::Ws)
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteMethod::Http(method) => f.write_str(method.as_str()),
            RouteMethod::Any => f.write_str("ANY"),
            RouteMethod::Upgrade => f.write_str("UPGRADE"),
            RouteMethod::Ws => f.write_str("WS"),
        }
    }
}

impl From<Method> for RouteMethod {
    fn from(method: Method) -> Self {
        RouteMethod::Http(method)
    }
}

/// Buffering hints forwarded to the connection layer's body stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    pub high_water_mark: Option<usize>,
}

/// Options of an HTTP route.
///
/// Everything except `middlewares` is plain data and can be loaded from
/// configuration:
///
/// ```
/// use switchyard::router::HttpOptions;
///
/// let options: HttpOptions = serde_json::from_str(r#"{ "max_body_length": 1024 }"#).unwrap();
/// assert_eq!(options.max_body_length, Some(1024));
/// assert!(options.middlewares.is_empty());
/// ```
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpOptions {
    /// Route-specific middleware, run after the router-level chain.
    #[serde(skip)]
    pub middlewares: Vec<MiddlewareHandler>,
    pub stream_options: StreamOptions,
    pub max_body_length: Option<usize>,
}

impl HttpOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn middleware(mut self, middleware: MiddlewareHandler) -> Self {
        self.middlewares.push(middleware);
        self
    }

    #[must_use]
    pub fn max_body_length(mut self, limit: usize) -> Self {
        self.max_body_length = Some(limit);
        self
    }

    #[must_use]
    pub fn stream_options(mut self, stream_options: StreamOptions) -> Self {
        self.stream_options = stream_options;
        self
    }
}

impl fmt::Debug for HttpOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpOptions")
            .field("middlewares", &self.middlewares.len())
            .field("stream_options", &self.stream_options)
            .field("max_body_length", &self.max_body_length)
            .finish()
    }
}

/// How incoming WebSocket payloads are presented to the handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    #[default]
    String,
    Buffer,
    ArrayBuffer,
}

/// Options of a WebSocket route.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WsOptions {
    pub message_type: MessageType,
    /// Seconds of silence before the connection layer closes the socket.
    pub idle_timeout: u32,
    /// Bytes buffered for a slow client before the connection layer applies backpressure.
    pub max_backpressure: usize,
    /// Largest accepted message payload, in bytes.
    pub max_payload_length: usize,
    /// Inline middleware for this route only; router-level middleware never runs for WS routes.
    #[serde(skip)]
    pub middlewares: Vec<MiddlewareHandler>,
}

impl Default for WsOptions {
    fn default() -> Self {
        Self {
            message_type: MessageType::String,
            idle_timeout: 32,
            max_backpressure: 1024 * 1024,
            max_payload_length: 32 * 1024,
            middlewares: Vec::new(),
        }
    }
}

impl WsOptions {
    #[must_use]
    pub fn middleware(mut self, middleware: MiddlewareHandler) -> Self {
        self.middlewares.push(middleware);
        self
    }
}

impl fmt::Debug for WsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsOptions")
            .field("message_type", &self.message_type)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_backpressure", &self.max_backpressure)
            .field("max_payload_length", &self.max_payload_length)
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}

/// Route options, by route kind.
#[derive(Debug, Clone)]
pub enum RouteOptions {
    Http(HttpOptions),
    Ws(WsOptions),
}

impl RouteOptions {
    /// Route-specific middleware, in execution order.
    pub fn middlewares(&self) -> &[MiddlewareHandler] {
        match self {
            RouteOptions::Http(o) => &o.middlewares,
            RouteOptions::Ws(o) => &o.middlewares,
        }
    }

    pub(crate) fn middlewares_mut(&mut self) -> &mut Vec<MiddlewareHandler> {
        match self {
            RouteOptions::Http(o) => &mut o.middlewares,
            RouteOptions::Ws(o) => &mut o.middlewares,
        }
    }

    pub(crate) fn to_json(&self) -> serde_json::Value {
        let value = match self {
            RouteOptions::Http(o) => serde_json::to_value(o),
            RouteOptions::Ws(o) => serde_json::to_value(o),
        };
        value.unwrap_or_default()
    }
}

impl From<HttpOptions> for RouteOptions {
    fn from(options: HttpOptions) -> Self {
        RouteOptions::Http(options)
    }
}

impl From<WsOptions> for RouteOptions {
    fn from(options: WsOptions) -> Self {
        RouteOptions::Ws(options)
    }
}

/// The terminal handler of a route.
#[derive(Clone)]
pub enum RouteHandler {
    Http(Handler),
    Ws(WsHandler),
}

impl fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteHandler::Http(_) => f.write_str("RouteHandler::Http(..)"),
            RouteHandler::Ws(_) => f.write_str("RouteHandler::Ws(..)"),
        }
    }
}

/// One registered route. Immutable once created.
#[derive(Debug, Clone)]
pub struct RouteRecord {
    method: RouteMethod,
    pattern: Pattern,
    options: RouteOptions,
    handler: RouteHandler,
}

impl RouteRecord {
    pub(crate) fn new(
        method: RouteMethod,
        pattern: Pattern,
        options: RouteOptions,
        handler: RouteHandler,
    ) -> Self {
        Self {
            method,
            pattern,
            options,
            handler,
        }
    }

    pub fn method(&self) -> &RouteMethod {
        &self.method
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn options(&self) -> &RouteOptions {
        &self.options
    }

    pub fn handler(&self) -> &RouteHandler {
        &self.handler
    }

    // Same route, mounted under `prefix`.
    pub(crate) fn rebase(mut self, prefix: &Pattern) -> Result<Self, PatternError> {
        self.pattern = prefix.join(&self.pattern)?;
        Ok(self)
    }
}

/// One router-level middleware registration.
#[derive(Clone)]
pub struct MiddlewareRecord {
    prefix: Pattern,
    middleware: MiddlewareHandler,
}

impl MiddlewareRecord {
    pub(crate) fn new(prefix: Pattern, middleware: MiddlewareHandler) -> Self {
        Self { prefix, middleware }
    }

    pub fn prefix(&self) -> &Pattern {
        &self.prefix
    }

    pub fn middleware(&self) -> &MiddlewareHandler {
        &self.middleware
    }

    pub(crate) fn rebase(mut self, prefix: &Pattern) -> Result<Self, PatternError> {
        self.prefix = prefix.join(&self.prefix)?;
        Ok(self)
    }
}

impl fmt::Debug for MiddlewareRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareRecord")
            .field("prefix", &self.prefix.to_string())
            .finish_non_exhaustive()
    }
}
