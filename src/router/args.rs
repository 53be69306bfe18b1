//! Argument-list registration: `register(method, [pattern, options, mw.., handler])`
//! and `use_args([prefix, mw.., router])`.
//!
//! Each positional argument is tagged by kind. Route arguments must follow
//!
//! ```text
//! Pattern? Options? (Middleware | Middlewares)* Handler
//! ```
//!
//! where the pattern may only be omitted when the caller supplies one (a
//! [`RouteBuilder`](super::RouteBuilder)). Anything out of that order is a
//! [`ConfigError`].

use std::fmt;

use super::record::{Handler, RouteHandler, RouteOptions, WsHandler};
use super::{ConfigError, HttpOptions, Router, WsOptions};
use crate::middleware::MiddlewareHandler;

/// One positional argument of a route registration.
pub enum RouteArg {
    Pattern(String),
    Options(RouteOptions),
    Middleware(MiddlewareHandler),
    Middlewares(Vec<MiddlewareHandler>),
    Handler(RouteHandler),
}

impl RouteArg {
    fn kind(&self) -> &'static str {
        match self {
            RouteArg::Pattern(_) => "pattern",
            RouteArg::Options(_) => "options",
            RouteArg::Middleware(_) | RouteArg::Middlewares(_) => "middleware",
            RouteArg::Handler(_) => "handler",
        }
    }
}

impl From<&str> for RouteArg {
    fn from(pattern: &str) -> Self {
        RouteArg::Pattern(pattern.to_owned())
    }
}

impl From<String> for RouteArg {
    fn from(pattern: String) -> Self {
        RouteArg::Pattern(pattern)
    }
}

impl From<HttpOptions> for RouteArg {
    fn from(options: HttpOptions) -> Self {
        RouteArg::Options(RouteOptions::Http(options))
    }
}

impl From<WsOptions> for RouteArg {
    fn from(options: WsOptions) -> Self {
        RouteArg::Options(RouteOptions::Ws(options))
    }
}

impl From<MiddlewareHandler> for RouteArg {
    fn from(middleware: MiddlewareHandler) -> Self {
        RouteArg::Middleware(middleware)
    }
}

impl From<Vec<MiddlewareHandler>> for RouteArg {
    fn from(middlewares: Vec<MiddlewareHandler>) -> Self {
        RouteArg::Middlewares(middlewares)
    }
}

impl From<Handler> for RouteArg {
    fn from(handler: Handler) -> Self {
        RouteArg::Handler(RouteHandler::Http(handler))
    }
}

impl From<WsHandler> for RouteArg {
    fn from(handler: WsHandler) -> Self {
        RouteArg::Handler(RouteHandler::Ws(handler))
    }
}

/// A route argument list after classification.
pub struct ParsedRoute {
    pub pattern: String,
    pub options: Option<RouteOptions>,
    pub middlewares: Vec<MiddlewareHandler>,
    pub handler: RouteHandler,
}

impl fmt::Debug for ParsedRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedRoute")
            .field("pattern", &self.pattern)
            .field("options", &self.options)
            .field("middlewares", &self.middlewares.len())
            .field("handler", &self.handler)
            .finish()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Start,
    Pattern,
    Options,
    Middleware,
    Handler,
}

/// Classify a route argument list.
///
/// `default_pattern` is used when the list does not start with a pattern.
pub fn parse_route_args<I>(args: I, default_pattern: Option<&str>) -> Result<ParsedRoute, ConfigError>
where
    I: IntoIterator<Item = RouteArg>,
{
    let mut stage = Stage::Start;
    let mut pattern = None;
    let mut options = None;
    let mut middlewares = Vec::new();
    let mut handler = None;

    for (position, arg) in args.into_iter().enumerate() {
        let found = arg.kind();
        let unexpected = |reason: &'static str| ConfigError::UnexpectedArgument {
            position,
            found,
            reason,
        };

        if stage == Stage::Handler {
            return Err(unexpected("the handler must be the last argument"));
        }

        stage = match arg {
            RouteArg::Pattern(_) if stage != Stage::Start => {
                return Err(unexpected("the pattern must be the first argument"));
            }
            RouteArg::Options(_) if stage >= Stage::Options => {
                return Err(unexpected("options must come once, before any middleware"));
            }
            RouteArg::Pattern(p) => {
                pattern = Some(p);
                Stage::Pattern
            }
            RouteArg::Options(o) => {
                options = Some(o);
                Stage::Options
            }
            RouteArg::Middleware(m) => {
                middlewares.push(m);
                Stage::Middleware
            }
            RouteArg::Middlewares(ms) => {
                middlewares.extend(ms);
                Stage::Middleware
            }
            RouteArg::Handler(h) => {
                handler = Some(h);
                Stage::Handler
            }
        };
    }

    let pattern = pattern
        .or_else(|| default_pattern.map(str::to_owned))
        .ok_or(ConfigError::MissingPattern)?;
    let handler = handler.ok_or(ConfigError::MissingHandler)?;

    Ok(ParsedRoute {
        pattern,
        options,
        middlewares,
        handler,
    })
}

/// One positional argument of a `use_args` call.
pub enum UseArg {
    Prefix(String),
    Middleware(MiddlewareHandler),
    Middlewares(Vec<MiddlewareHandler>),
    Router(Router),
}

impl From<&str> for UseArg {
    fn from(prefix: &str) -> Self {
        UseArg::Prefix(prefix.to_owned())
    }
}

impl From<String> for UseArg {
    fn from(prefix: String) -> Self {
        UseArg::Prefix(prefix)
    }
}

impl From<MiddlewareHandler> for UseArg {
    fn from(middleware: MiddlewareHandler) -> Self {
        UseArg::Middleware(middleware)
    }
}

impl From<Vec<MiddlewareHandler>> for UseArg {
    fn from(middlewares: Vec<MiddlewareHandler>) -> Self {
        UseArg::Middlewares(middlewares)
    }
}

impl From<Router> for UseArg {
    fn from(router: Router) -> Self {
        UseArg::Router(router)
    }
}

/// A `use_args` argument list after classification.
pub struct ParsedUse {
    pub prefix: Option<String>,
    pub middlewares: Vec<MiddlewareHandler>,
    pub router: Option<Router>,
}

impl fmt::Debug for ParsedUse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedUse")
            .field("prefix", &self.prefix)
            .field("middlewares", &self.middlewares.len())
            .field("router", &self.router)
            .finish()
    }
}

/// Classify a `use_args` argument list. Arguments may come in any order, but
/// at most one prefix and one router are accepted.
pub fn parse_use_args<I>(args: I) -> Result<ParsedUse, ConfigError>
where
    I: IntoIterator<Item = UseArg>,
{
    let mut parsed = ParsedUse {
        prefix: None,
        middlewares: Vec::new(),
        router: None,
    };

    for arg in args {
        match arg {
            UseArg::Prefix(_) if parsed.prefix.is_some() => return Err(ConfigError::MultiplePrefixes),
            UseArg::Router(_) if parsed.router.is_some() => return Err(ConfigError::MultipleRouters),
            UseArg::Prefix(p) => parsed.prefix = Some(p),
            UseArg::Router(r) => parsed.router = Some(r),
            UseArg::Middleware(m) => parsed.middlewares.push(m),
            UseArg::Middlewares(ms) => parsed.middlewares.extend(ms),
        }
    }
    Ok(parsed)
}
