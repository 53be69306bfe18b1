//! Route registration: verb methods, chainable pattern scopes, and router mounting.
//!
//! A [`Router`] accumulates routes and middleware during startup:
//!
//! | Style          | Example                                                    |
//! |----------------|------------------------------------------------------------|
//! | verb methods   | `router.get("/users/:id", show)?`                          |
//! | pattern scope  | `router.route("/users").get(list)?.post(create)?`          |
//! | mounting       | `router.mount("/api", api_router)?`                        |
//! | argument lists | `router.use_args(["/api".into(), auth.into(), api.into()])?` |
//!
//! Patterns support static segments, `:name` parameters, and a trailing `*`
//! wildcard; see [`Pattern`]. At match time static beats param beats wildcard.
//!
//! Router-level middleware is matched by path prefix, independent of method,
//! and runs in registration order. Mounting splices a child router's
//! middleware into that order at the position of the mount call.
//!
//! Registering the same method and exact pattern twice replaces the first
//! route; the replacement is logged at `warn`.
//!
//! Once registration is done, [`Router::into_dispatcher`] seals the router.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

mod args;
mod builder;
mod index;
mod pattern;
mod record;
mod tree;

pub use args::{ParsedRoute, ParsedUse, RouteArg, UseArg, parse_route_args, parse_use_args};
pub use builder::RouteBuilder;
pub use index::MiddlewareIndex;
pub use pattern::{PathSegment, Pattern, PatternError, split_path};
pub use record::{
    BoxError, BoxFuture, Handler, HttpOptions, IntoHandler, IntoWsHandler, MessageType,
    MiddlewareRecord, Reply, RouteHandler, RouteMethod, RouteOptions, RouteRecord, StreamOptions,
    WsHandler, WsOptions, handler, ws_handler,
};
pub use tree::{RouteMatch, RouteTree};

use crate::dispatch::Dispatcher;
use crate::http::Method;
use crate::middleware::MiddlewareHandler;

/// Invalid router configuration, detected at registration time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ANY route `{pattern}` does not support route-specific middleware")]
    MiddlewareOnAnyRoute { pattern: String },

    #[error("only one router may be mounted per use() call")]
    MultipleRouters,

    #[error("only one path prefix may be given per use() call")]
    MultiplePrefixes,

    #[error("route registration is missing a pattern")]
    MissingPattern,

    #[error("route registration is missing a handler")]
    MissingHandler,

    #[error("unexpected {found} at argument {position}: {reason}")]
    UnexpectedArgument {
        position: usize,
        found: &'static str,
        reason: &'static str,
    },

    #[error("{method} route `{pattern}` needs {expected}")]
    KindMismatch {
        method: String,
        pattern: String,
        expected: &'static str,
    },
}

/// Errors returned by registration calls.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Route and middleware registry.
///
/// # Examples
///
/// ```rust
/// use switchyard::{Context, Response, Router, StatusCode};
/// use switchyard::middleware::{Next, middleware};
///
/// # fn build() -> Result<Router, switchyard::RouterError> {
/// let mut api = Router::new();
/// api.get("/users/:id", |ctx: Context| async move {
///     Response::new(StatusCode::Ok).body(ctx.param("id").unwrap_or_default().to_owned())
/// })?;
///
/// let mut app = Router::new();
/// app.use_middleware(middleware(|ctx: Context, next: Next| next.run(ctx)));
/// app.mount("/api", api)?;
///
/// assert_eq!(app.routes().next().unwrap().pattern().to_string(), "/api/users/:id");
/// # Ok(app)
/// # }
/// # build().unwrap();
/// ```
#[derive(Default)]
pub struct Router {
    methods: HashMap<Method, RouteTree>,
    any: RouteTree,
    upgrade: RouteTree,
    ws: RouteTree,
    // Live records in registration order.
    routes: Vec<Arc<RouteRecord>>,
    middlewares: MiddlewareIndex,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes.len())
            .field("middlewares", &self.middlewares.len())
            .finish_non_exhaustive()
    }
}

macro_rules! http_verbs {
    ($( $verb:ident, $verb_with:ident => $method:expr, $name:literal; )*) => {
        $(
            #[doc = concat!("Register a handler for `", $name, "` requests matching `pattern`.")]
            pub fn $verb(
                &mut self,
                pattern: &str,
                handler: impl IntoHandler,
            ) -> Result<&mut Self, RouterError> {
                self.$verb_with(pattern, HttpOptions::default(), handler)
            }

            #[doc = concat!("Register a `", $name, "` handler with route options and inline middleware.")]
            pub fn $verb_with(
                &mut self,
                pattern: &str,
                options: HttpOptions,
                handler: impl IntoHandler,
            ) -> Result<&mut Self, RouterError> {
                self.add_http(RouteMethod::Http($method), pattern, options, record::handler(handler))
            }
        )*
    };
}

impl Router {
    /// Create a new, empty `Router`.
    ///
    /// ```rust
    /// use switchyard::Router;
    ///
    /// let router = Router::new();
    /// assert!(router.is_empty());
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a chainable scope bound to `pattern`.
    ///
    /// ```rust
    /// use switchyard::{Context, Router, StatusCode};
    ///
    /// # fn build() -> Result<(), switchyard::RouterError> {
    /// let mut router = Router::new();
    /// router
    ///     .route("/api/v1")
    ///     .get(|_ctx: Context| async { StatusCode::Ok })?
    ///     .post(|_ctx: Context| async { StatusCode::Created })?;
    /// assert_eq!(router.len(), 2);
    /// # Ok(())
    /// # }
    /// # build().unwrap();
    /// ```
    pub fn route(&mut self, pattern: impl Into<String>) -> RouteBuilder<'_> {
        RouteBuilder::new(self, pattern.into())
    }

    http_verbs! {
        get, get_with => Method::Get, "GET";
        post, post_with => Method::Post, "POST";
        put, put_with => Method::Put, "PUT";
        delete, delete_with => Method::Delete, "DELETE";
        head, head_with => Method::Head, "HEAD";
        options, options_with => Method::Options, "OPTIONS";
        patch, patch_with => Method::Patch, "PATCH";
        trace, trace_with => Method::Trace, "TRACE";
        connect, connect_with => Method::Connect, "CONNECT";
    }

    /// Register a handler for an arbitrary method, including extension methods.
    pub fn on(
        &mut self,
        method: Method,
        pattern: &str,
        handler: impl IntoHandler,
    ) -> Result<&mut Self, RouterError> {
        self.add_http(
            RouteMethod::Http(method),
            pattern,
            HttpOptions::default(),
            record::handler(handler),
        )
    }

    /// Register a fallback handler for any method.
    ///
    /// Consulted only when no method-specific route matches. ANY routes do not
    /// accept route-specific middleware.
    pub fn any(&mut self, pattern: &str, handler: impl IntoHandler) -> Result<&mut Self, RouterError> {
        self.any_with(pattern, HttpOptions::default(), handler)
    }

    /// [`any`](Self::any) with route options.
    ///
    /// # Errors
    ///
    /// [`ConfigError::MiddlewareOnAnyRoute`] if `options.middlewares` is not empty.
    pub fn any_with(
        &mut self,
        pattern: &str,
        options: HttpOptions,
        handler: impl IntoHandler,
    ) -> Result<&mut Self, RouterError> {
        self.add_http(RouteMethod::Any, pattern, options, record::handler(handler))
    }

    /// Alias of [`any`](Self::any).
    pub fn all(&mut self, pattern: &str, handler: impl IntoHandler) -> Result<&mut Self, RouterError> {
        self.any(pattern, handler)
    }

    /// Alias of [`any_with`](Self::any_with).
    pub fn all_with(
        &mut self,
        pattern: &str,
        options: HttpOptions,
        handler: impl IntoHandler,
    ) -> Result<&mut Self, RouterError> {
        self.any_with(pattern, options, handler)
    }

    /// Intercept `Upgrade: websocket` requests for `pattern`.
    ///
    /// The handler runs behind the router-level middleware chain and decides
    /// whether to accept the handshake (typically answering `101`).
    pub fn upgrade(&mut self, pattern: &str, handler: impl IntoHandler) -> Result<&mut Self, RouterError> {
        self.upgrade_with(pattern, HttpOptions::default(), handler)
    }

    pub fn upgrade_with(
        &mut self,
        pattern: &str,
        options: HttpOptions,
        handler: impl IntoHandler,
    ) -> Result<&mut Self, RouterError> {
        self.add_http(RouteMethod::Upgrade, pattern, options, record::handler(handler))
    }

    /// Register a WebSocket handler, invoked once the handshake completes.
    pub fn ws(&mut self, pattern: &str, handler: impl IntoWsHandler) -> Result<&mut Self, RouterError> {
        self.ws_with(pattern, WsOptions::default(), handler)
    }

    /// [`ws`](Self::ws) with options; `options.middlewares` run before the
    /// handler, and they are the only middleware a WebSocket route ever runs.
    pub fn ws_with(
        &mut self,
        pattern: &str,
        options: WsOptions,
        handler: impl IntoWsHandler,
    ) -> Result<&mut Self, RouterError> {
        let record = RouteRecord::new(
            RouteMethod::Ws,
            Pattern::compile(pattern)?,
            RouteOptions::Ws(options),
            RouteHandler::Ws(record::ws_handler(handler)),
        );
        self.insert(record)?;
        Ok(self)
    }

    /// Register a route from a tagged argument list
    /// (`pattern, [options], [middleware..], handler`).
    ///
    /// The handler kind must fit `method`: a [`WsHandler`] for
    /// [`RouteMethod::Ws`], an HTTP [`Handler`] otherwise. For `Ws` the second
    /// argument may be options or directly the handler.
    pub fn register<I>(&mut self, method: RouteMethod, args: I) -> Result<&mut Self, RouterError>
    where
        I: IntoIterator<Item = RouteArg>,
    {
        let parsed = parse_route_args(args, None)?;
        self.register_parsed(method, parsed)
    }

    pub(crate) fn register_parsed(
        &mut self,
        method: RouteMethod,
        parsed: ParsedRoute,
    ) -> Result<&mut Self, RouterError> {
        let ParsedRoute {
            pattern,
            options,
            middlewares,
            handler,
        } = parsed;

        let mismatch = |expected: &'static str| ConfigError::KindMismatch {
            method: method.to_string(),
            pattern: pattern.clone(),
            expected,
        };

        let mut options = match (method.is_ws(), options) {
            (false, None) => RouteOptions::Http(HttpOptions::default()),
            (true, None) => RouteOptions::Ws(WsOptions::default()),
            (false, Some(o @ RouteOptions::Http(_))) | (true, Some(o @ RouteOptions::Ws(_))) => o,
            (false, Some(_)) => return Err(mismatch("HTTP route options").into()),
            (true, Some(_)) => return Err(mismatch("WebSocket route options").into()),
        };
        match (&handler, method.is_ws()) {
            (RouteHandler::Http(_), false) | (RouteHandler::Ws(_), true) => {}
            (_, false) => return Err(mismatch("an HTTP handler").into()),
            (_, true) => return Err(mismatch("a WebSocket handler").into()),
        }
        options.middlewares_mut().extend(middlewares);

        let record = RouteRecord::new(method, Pattern::compile(&pattern)?, options, handler);
        self.insert(record)?;
        Ok(self)
    }

    /// Register middleware for every path.
    pub fn use_middleware(&mut self, middleware: MiddlewareHandler) -> &mut Self {
        self.middlewares.register(Pattern::root(), middleware);
        self
    }

    /// Register middleware for every path under `prefix`.
    pub fn use_at(&mut self, prefix: &str, middleware: MiddlewareHandler) -> Result<&mut Self, RouterError> {
        self.middlewares
            .register(Pattern::compile_prefix(prefix)?, middleware);
        Ok(self)
    }

    /// Mount `router` under `prefix`.
    ///
    /// Every route and middleware of `router` is moved into `self` with
    /// `prefix` prepended. Its middleware lands as one contiguous block at the
    /// current end of this router's middleware order.
    ///
    /// # Errors
    ///
    /// Fails without modifying `self` if a prefixed pattern is invalid.
    pub fn mount(&mut self, prefix: &str, router: Router) -> Result<&mut Self, RouterError> {
        let prefix = Pattern::compile_prefix(prefix)?;
        let mounted = Mounted::rebase(&prefix, router)?;
        self.splice(&prefix, mounted)?;
        Ok(self)
    }

    /// Register middleware and/or mount a router from a tagged argument list.
    ///
    /// The prefix (default `/`) is resolved first, then plain middleware is
    /// registered in argument order, then the router, if any, is merged.
    pub fn use_args<I>(&mut self, args: I) -> Result<&mut Self, RouterError>
    where
        I: IntoIterator<Item = UseArg>,
    {
        let ParsedUse {
            prefix,
            middlewares,
            router,
        } = parse_use_args(args)?;

        let prefix = match prefix {
            Some(p) => Pattern::compile_prefix(&p)?,
            None => Pattern::root(),
        };
        // Rebase the child up front so a bad prefix leaves `self` untouched.
        let mounted = router.map(|r| Mounted::rebase(&prefix, r)).transpose()?;

        for middleware in middlewares {
            self.middlewares.register(prefix.clone(), middleware);
        }
        if let Some(mounted) = mounted {
            self.splice(&prefix, mounted)?;
        }
        Ok(self)
    }

    /// Routes in registration order. A route replaced by a later registration
    /// of the same method and pattern is no longer listed.
    pub fn routes(&self) -> impl Iterator<Item = &RouteRecord> {
        self.routes.iter().map(|r| r.as_ref())
    }

    /// Router-level middleware in registration (and execution) order.
    pub fn middlewares(&self) -> &[MiddlewareRecord] {
        self.middlewares.records()
    }

    /// Number of live routes across all tables.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Serializable summary of the registrations, for diagnostics.
    pub fn snapshot(&self) -> RouterSnapshot {
        RouterSnapshot {
            routes: self
                .routes()
                .map(|r| RouteSummary {
                    method: r.method().to_string(),
                    pattern: r.pattern().to_string(),
                    middlewares: r.options().middlewares().len(),
                    options: r.options().to_json(),
                })
                .collect(),
            middlewares: self
                .middlewares()
                .iter()
                .map(|m| MiddlewareSummary {
                    prefix: m.prefix().to_string(),
                })
                .collect(),
        }
    }

    /// Seal the router for dispatch. No further registration is possible.
    pub fn into_dispatcher(self) -> Dispatcher {
        debug!(
            routes = self.routes.len(),
            middlewares = self.middlewares.len(),
            "router sealed"
        );
        Dispatcher::new(self)
    }

    pub(crate) fn find(&self, method: &Method, path: &[&str]) -> Option<RouteMatch> {
        self.methods
            .get(method)
            .and_then(|tree| tree.find(path))
            .or_else(|| self.any.find(path))
    }

    pub(crate) fn find_upgrade(&self, path: &[&str]) -> Option<RouteMatch> {
        self.upgrade.find(path)
    }

    pub(crate) fn find_ws(&self, path: &[&str]) -> Option<RouteMatch> {
        self.ws.find(path)
    }

    pub(crate) fn chain_for(&self, path: &[&str]) -> Vec<MiddlewareHandler> {
        self.middlewares.resolve(path)
    }

    fn add_http(
        &mut self,
        method: RouteMethod,
        pattern: &str,
        options: HttpOptions,
        handler: Handler,
    ) -> Result<&mut Self, RouterError> {
        let record = RouteRecord::new(
            method,
            Pattern::compile(pattern)?,
            RouteOptions::Http(options),
            RouteHandler::Http(handler),
        );
        self.insert(record)?;
        Ok(self)
    }

    fn insert(&mut self, record: RouteRecord) -> Result<(), RouterError> {
        if *record.method() == RouteMethod::Any && !record.options().middlewares().is_empty() {
            return Err(ConfigError::MiddlewareOnAnyRoute {
                pattern: record.pattern().to_string(),
            }
            .into());
        }

        let record = Arc::new(record);
        let tree = match record.method() {
            RouteMethod::Http(method) => self.methods.entry(method.clone()).or_default(),
            RouteMethod::Any => &mut self.any,
            RouteMethod::Upgrade => &mut self.upgrade,
            RouteMethod::Ws => &mut self.ws,
        };

        if let Some(previous) = tree.insert(Arc::clone(&record)) {
            warn!(
                method = %record.method(),
                pattern = %record.pattern(),
                "route registered twice; the later handler replaces the earlier one"
            );
            self.routes.retain(|r| !Arc::ptr_eq(r, &previous));
        }

        debug!(method = %record.method(), pattern = %record.pattern(), "route registered");
        self.routes.push(record);
        Ok(())
    }

    fn splice(&mut self, prefix: &Pattern, mounted: Mounted) -> Result<(), RouterError> {
        debug!(
            prefix = %prefix,
            routes = mounted.routes.len(),
            middlewares = mounted.middlewares.len(),
            "mounting router"
        );

        for middleware in mounted.middlewares {
            self.middlewares.push(middleware);
        }
        for route in mounted.routes {
            self.insert(route)?;
        }
        Ok(())
    }
}

// A child router's records, already moved under the mount prefix.
struct Mounted {
    routes: Vec<RouteRecord>,
    middlewares: Vec<MiddlewareRecord>,
}

impl Mounted {
    fn rebase(prefix: &Pattern, child: Router) -> Result<Self, PatternError> {
        let Router {
            methods,
            any,
            upgrade,
            ws,
            routes,
            middlewares,
        } = child;
        // Drop the child's trees so its records are uniquely owned by `routes`.
        drop((methods, any, upgrade, ws));

        let routes = routes
            .into_iter()
            .map(|r| Arc::try_unwrap(r).unwrap_or_else(|shared| (*shared).clone()))
            .map(|r| r.rebase(prefix))
            .collect::<Result<Vec<_>, _>>()?;
        let middlewares = middlewares
            .into_records()
            .into_iter()
            .map(|m| m.rebase(prefix))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { routes, middlewares })
    }
}

/// Diagnostic view of a router's registrations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterSnapshot {
    pub routes: Vec<RouteSummary>,
    pub middlewares: Vec<MiddlewareSummary>,
}

impl RouterSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub method: String,
    pub pattern: String,
    /// Route-specific middleware count.
    pub middlewares: usize,
    pub options: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiddlewareSummary {
    pub prefix: String,
}
