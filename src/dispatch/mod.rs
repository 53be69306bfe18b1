//! Per-request dispatch over a finished [`Router`].
//!
//! Every request walks `MatchRoute → RunMiddleware → RunHandler → Done`, with
//! `Errored` reachable from any step after matching. A miss is not an error:
//! it ends in [`Outcome::NotFound`].
//!
//! The [`Dispatcher`] holds the router behind an [`Arc`] and never mutates it,
//! so one instance can be cloned into every connection task.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{Instrument, debug, debug_span, warn};

use crate::context::{Context, Parameters};
use crate::http::{Method, Request, Response, StatusCode};
use crate::middleware::{ChainState, MiddlewareHandler, Next, Terminal};
use crate::realtime::Websocket;
use crate::router::{
    BoxError, RouteHandler, RouteMatch, RouteOptions, RouteRecord, Router, split_path,
};

/// A request-scoped failure raised while running a chain.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("middleware #{position} failed: {source}")]
    Middleware {
        /// Zero-based position in the request's chain (router-level first,
        /// then route-specific).
        position: usize,
        #[source]
        source: BoxError,
    },

    #[error("route handler failed: {source}")]
    Handler {
        #[source]
        source: BoxError,
    },

    #[error("request cancelled before step {step}")]
    Cancelled { step: usize },
}

impl DispatchError {
    // Attribute a failure to the middleware at `position`, unless it already
    // carries a location from further down the chain.
    pub(crate) fn at_middleware(position: usize, err: BoxError) -> BoxError {
        if err.is::<DispatchError>() {
            err
        } else {
            Box::new(DispatchError::Middleware {
                position,
                source: err,
            })
        }
    }

    pub(crate) fn in_handler(err: BoxError) -> BoxError {
        Box::new(DispatchError::Handler { source: err })
    }

    fn from_boxed(err: BoxError) -> Self {
        match err.downcast::<DispatchError>() {
            Ok(err) => *err,
            Err(source) => DispatchError::Handler { source },
        }
    }
}

/// Signals that the connection behind a request has gone away.
///
/// Clones share one flag. Once [`cancel`](Self::cancel) is called, the chain
/// stops before its next step; a step already running is left to finish.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    cancelled: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// The terminal result of one dispatch.
#[derive(Debug)]
pub enum Outcome {
    /// The route handler ran and produced this response.
    ///
    /// A handshake accepted for a `ws` route with no `upgrade` route also
    /// completes, with `101 Switching Protocols`: accepting is that route's
    /// terminal step on the HTTP side.
    Completed(Response),
    /// A middleware answered without reaching the handler.
    ShortCircuited(Response),
    /// A middleware or the handler failed, or the request was cancelled.
    Errored(DispatchError),
    /// No route matched.
    NotFound,
}

impl Outcome {
    pub fn response(&self) -> Option<&Response> {
        match self {
            Outcome::Completed(r) | Outcome::ShortCircuited(r) => Some(r),
            Outcome::Errored(_) | Outcome::NotFound => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Outcome::NotFound)
    }

    pub fn is_errored(&self) -> bool {
        matches!(self, Outcome::Errored(_))
    }

    /// Collapse into the response the connection layer should send:
    /// `500` for errors, `404` for misses.
    pub fn into_response(self) -> Response {
        match self {
            Outcome::Completed(r) | Outcome::ShortCircuited(r) => r,
            Outcome::Errored(_) => Response::new(StatusCode::InternalServerError)
                .body(StatusCode::InternalServerError.canonical_reason()),
            Outcome::NotFound => {
                Response::new(StatusCode::NotFound).body(StatusCode::NotFound.canonical_reason())
            }
        }
    }

    /// Short name for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Completed(_) => "completed",
            Outcome::ShortCircuited(_) => "short-circuited",
            Outcome::Errored(_) => "errored",
            Outcome::NotFound => "not-found",
        }
    }
}

/// What a request would run, without running it.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub record: Arc<RouteRecord>,
    pub params: Parameters,
    /// Router-level plus route-specific middleware count.
    pub chain_len: usize,
}

/// Read-only, shareable request dispatcher.
///
/// # Examples
///
/// ```rust
/// use switchyard::{Context, Method, Outcome, Request, Router, StatusCode};
///
/// # async fn example() -> Result<(), switchyard::RouterError> {
/// let mut router = Router::new();
/// router.get("/users/:id", |ctx: Context| async move {
///     let id = ctx.param("id").unwrap_or_default().to_owned();
///     switchyard::Response::new(StatusCode::Ok).body(id)
/// })?;
///
/// let dispatcher = router.into_dispatcher();
/// let outcome = dispatcher.dispatch(Request::new(Method::Get, "/users/42")).await;
/// assert!(matches!(outcome, Outcome::Completed(_)));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    router: Arc<Router>,
}

impl Dispatcher {
    pub fn new(router: Router) -> Self {
        Self {
            router: Arc::new(router),
        }
    }

    /// The sealed router, for introspection.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Resolve the HTTP route and chain for `method` and `path`.
    pub fn resolve(&self, method: &Method, path: &str) -> Option<Resolution> {
        let segments = split_path(path);
        let RouteMatch { record, params } = self.router.find(method, &segments)?;
        let chain_len =
            self.router.chain_for(&segments).len() + record.options().middlewares().len();
        Some(Resolution {
            record,
            params,
            chain_len,
        })
    }

    /// Dispatch an HTTP request, including WebSocket upgrade requests.
    pub async fn dispatch(&self, request: Request) -> Outcome {
        self.dispatch_with(request, Cancellation::new()).await
    }

    /// [`dispatch`](Self::dispatch) with a cancellation handle owned by the
    /// connection layer.
    pub async fn dispatch_with(&self, request: Request, cancel: Cancellation) -> Outcome {
        let span = debug_span!("dispatch", method = %request.method(), path = %request.path());
        async move {
            let outcome = self.dispatch_http(request, cancel).await;
            report(&outcome);
            outcome
        }
        .instrument(span)
        .await
    }

    /// Run the `ws` route for a completed handshake.
    ///
    /// Only the route's own inline middleware runs before the handler; the
    /// router-level chain never applies to WebSocket routes. On success the
    /// outcome carries a `101 Switching Protocols` marker response.
    pub async fn dispatch_websocket(&self, request: Request, websocket: Websocket) -> Outcome {
        self.dispatch_websocket_with(request, websocket, Cancellation::new())
            .await
    }

    pub async fn dispatch_websocket_with(
        &self,
        request: Request,
        websocket: Websocket,
        cancel: Cancellation,
    ) -> Outcome {
        let span = debug_span!("dispatch_ws", path = %request.path());
        async move {
            let found = self.router.find_ws(&split_path(request.path()));
            let outcome = match found {
                Some(RouteMatch { record, params }) => {
                    debug!(route = %record.pattern(), "ws route matched");
                    match (record.handler(), record.options()) {
                        (RouteHandler::Ws(handler), RouteOptions::Ws(options)) => {
                            let terminal = Terminal::Ws {
                                handler: Arc::clone(handler),
                                websocket,
                                options: options.clone(),
                            };
                            let chain = options.middlewares.clone();
                            execute(chain, Context::with_params(request, params), terminal, cancel)
                                .await
                        }
                        _ => Outcome::NotFound,
                    }
                }
                None => Outcome::NotFound,
            };
            report(&outcome);
            outcome
        }
        .instrument(span)
        .await
    }

    async fn dispatch_http(&self, request: Request, cancel: Cancellation) -> Outcome {
        let segments = split_path(request.path());

        let found = if request.is_websocket_upgrade() {
            match self.router.find_upgrade(&segments) {
                Some(found) => Some(found),
                // The handshake is the ws route's own first step; its handler
                // runs later through `dispatch_websocket`.
                None if self.router.find_ws(&segments).is_some() => {
                    debug!("no upgrade route; accepting handshake for ws route");
                    return Outcome::Completed(Response::new(StatusCode::SwitchingProtocols));
                }
                None => self.router.find(request.method(), &segments),
            }
        } else {
            self.router.find(request.method(), &segments)
        };

        let Some(RouteMatch { record, params }) = found else {
            return Outcome::NotFound;
        };
        debug!(route = %record.pattern(), kind = %record.method(), "route matched");

        let RouteHandler::Http(handler) = record.handler() else {
            return Outcome::NotFound;
        };
        let mut chain: Vec<MiddlewareHandler> = self.router.chain_for(&segments);
        chain.extend(record.options().middlewares().iter().cloned());

        let terminal = Terminal::Http(Arc::clone(handler));
        execute(chain, Context::with_params(request, params), terminal, cancel).await
    }
}

async fn execute(
    chain: Vec<MiddlewareHandler>,
    ctx: Context,
    terminal: Terminal,
    cancel: Cancellation,
) -> Outcome {
    let state = Arc::new(ChainState::new(cancel));
    let next = Next::new(chain, terminal, Arc::clone(&state));

    match next.run(ctx).await {
        Ok(response) if state.handler_reached() => Outcome::Completed(response),
        Ok(response) => Outcome::ShortCircuited(response),
        Err(err) => Outcome::Errored(DispatchError::from_boxed(err)),
    }
}

fn report(outcome: &Outcome) {
    match outcome {
        Outcome::Errored(err) => warn!(error = %err, "dispatch errored"),
        other => debug!(outcome = other.label(), "dispatch finished"),
    }
}

#[cfg(test)]
mod scenarios;
