//! Middleware chain: composable logic that runs before a route's handler.
//!
//! Each middleware receives the request [`Context`] and a [`Next`] cursor
//! into the rest of the chain. It may:
//!
//! - **continue**: `next.run(ctx).await`, optionally decorating the response;
//! - **short-circuit**: return a [`Response`] without calling `next`;
//! - **fail**: return `Err(..)`, which aborts the request with
//!   [`DispatchError::Middleware`].
//!
//! ## Core types
//!
//! - [`Middleware`]: trait for middleware implemented as types.
//! - [`MiddlewareHandler`]: type-erased, cheaply-cloneable middleware function.
//! - [`middleware`] / [`from_middleware`]: build a [`MiddlewareHandler`] from a
//!   closure or a [`Middleware`] implementation.
//! - [`LoggerMiddleware`]: built-in request logger.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::time::Instant;
use tracing::debug;

use crate::context::Context;
use crate::dispatch::{Cancellation, DispatchError};
use crate::http::{Response, StatusCode};
use crate::realtime::Websocket;
use crate::router::{BoxError, BoxFuture, Handler, Reply, WsHandler, WsOptions};

/// A type-erased, reference-counted middleware function.
///
/// Construct one with [`middleware`] or [`from_middleware`]:
///
/// ```rust
/// use switchyard::{Context, middleware::{MiddlewareHandler, Next, middleware}};
///
/// let passthrough: MiddlewareHandler = middleware(|ctx: Context, next: Next| next.run(ctx));
/// ```
pub type MiddlewareHandler =
    Arc<dyn Fn(Context, Next) -> BoxFuture<Result<Response, BoxError>> + Send + Sync + 'static>;

/// Erase a middleware closure into a [`MiddlewareHandler`].
///
/// The closure's future may resolve to a [`Response`], a [`StatusCode`], or a
/// `Result<Response, BoxError>`.
pub fn middleware<F, Fut>(f: F) -> MiddlewareHandler
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: Reply,
{
    Arc::new(move |ctx, next| {
        let fut = f(ctx, next);
        Box::pin(async move { fut.await.into_result() })
    })
}

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// The core trait for middleware implemented as types.
///
/// # Contract
///
/// - Implementations **must** be `Send + Sync`; one instance serves every
///   concurrent request.
/// - `handle` **must** return a pinned, `Send` future.
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next layer.
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Result<Response, BoxError>>;
}

/// What runs once the middleware chain is exhausted.
pub(crate) enum Terminal {
    Http(Handler),
    Ws {
        handler: WsHandler,
        websocket: Websocket,
        options: WsOptions,
    },
}

/// Per-request bookkeeping shared along one chain.
pub(crate) struct ChainState {
    cancel: Cancellation,
    handler_reached: AtomicBool,
}

impl ChainState {
    pub(crate) fn new(cancel: Cancellation) -> Self {
        Self {
            cancel,
            handler_reached: AtomicBool::new(false),
        }
    }

    pub(crate) fn handler_reached(&self) -> bool {
        self.handler_reached.load(Ordering::Acquire)
    }
}

/// A cursor into the remaining middleware chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run), so each middleware can continue
/// the chain at most once.
pub struct Next {
    middlewares: Vec<MiddlewareHandler>,
    // Position of the middleware the next `run` invokes.
    index: usize,
    terminal: Terminal,
    state: Arc<ChainState>,
}

impl Next {
    pub(crate) fn new(
        middlewares: Vec<MiddlewareHandler>,
        terminal: Terminal,
        state: Arc<ChainState>,
    ) -> Self {
        Self {
            middlewares,
            index: 0,
            terminal,
            state,
        }
    }

    /// Number of middleware still ahead of the handler.
    pub fn remaining(&self) -> usize {
        self.middlewares.len() - self.index
    }

    /// Invoke the next middleware, or the route handler once the chain is
    /// exhausted, and return its response.
    ///
    /// # Errors
    ///
    /// Returns a boxed [`DispatchError`]:
    ///
    /// - `Cancelled`: the connection went away before this step was scheduled;
    /// - `Middleware`: a downstream middleware failed;
    /// - `Handler`: the route handler failed.
    ///
    /// A middleware that simply propagates this error keeps the original
    /// failure location intact.
    pub async fn run(self, ctx: Context) -> Result<Response, BoxError> {
        let Next {
            middlewares,
            index,
            terminal,
            state,
        } = self;

        if state.cancel.is_cancelled() {
            debug!(step = index, "request cancelled; chain stopped");
            return Err(Box::new(DispatchError::Cancelled { step: index }));
        }

        if let Some(current) = middlewares.get(index).cloned() {
            let next = Next {
                middlewares,
                index: index + 1,
                terminal,
                state,
            };
            return current(ctx, next)
                .await
                .map_err(|err| DispatchError::at_middleware(index, err));
        }

        state.handler_reached.store(true, Ordering::Release);
        match terminal {
            Terminal::Http(handler) => handler(ctx).await.map_err(DispatchError::in_handler),
            Terminal::Ws {
                handler,
                mut websocket,
                options,
            } => {
                let (_, params, _) = ctx.into_parts();
                websocket.bind(params, options);
                handler(websocket)
                    .await
                    .map(|()| Response::new(StatusCode::SwitchingProtocols))
                    .map_err(DispatchError::in_handler)
            }
        }
    }
}

/// Built-in middleware that logs each request's method, path, status, and duration.
///
/// Emits one `tracing::info!` line after the downstream chain completes:
///
/// ```text
/// METHOD /path - STATUS (duration)
/// ```
///
/// Failures are logged at `warn` and propagated unchanged.
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<Result<Response, BoxError>> {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.request().method().to_string();
            let path = ctx.request().path().to_owned();

            let result = next.run(ctx).await;
            let duration = start.elapsed();

            match &result {
                Ok(response) => {
                    tracing::info!("{} {} - {} ({:?})", method, path, response.status().as_u16(), duration);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "{} {} - failed ({:?})", method, path, duration);
                }
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::Request;
    use crate::http::Method;
    use crate::router::handler;

    fn chain(
        middlewares: Vec<MiddlewareHandler>,
        terminal: Handler,
        cancel: Cancellation,
    ) -> (Next, Arc<ChainState>) {
        let state = Arc::new(ChainState::new(cancel));
        (
            Next::new(middlewares, Terminal::Http(terminal), Arc::clone(&state)),
            state,
        )
    }

    fn ctx() -> Context {
        Context::new(Request::new(Method::Get, "/"))
    }

    fn recording(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> MiddlewareHandler {
        let log = Arc::clone(log);
        middleware(move |ctx: Context, next: Next| {
            log.lock().unwrap().push(name);
            next.run(ctx)
        })
    }

    #[tokio::test]
    async fn runs_in_order_then_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler_log = Arc::clone(&log);
        let terminal = handler(move |_ctx: Context| {
            handler_log.lock().unwrap().push("handler");
            async { StatusCode::Ok }
        });

        let (next, state) = chain(
            vec![recording(&log, "a"), recording(&log, "b")],
            terminal,
            Cancellation::new(),
        );
        assert_eq!(next.remaining(), 2);

        let res = next.run(ctx()).await.unwrap();
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(*log.lock().unwrap(), ["a", "b", "handler"]);
        assert!(state.handler_reached());
    }

    #[tokio::test]
    async fn short_circuit_skips_handler() {
        let gate = middleware(|_ctx: Context, _next: Next| async { StatusCode::Unauthorized });
        let (next, state) = chain(
            vec![gate],
            handler(|_ctx: Context| async { StatusCode::Ok }),
            Cancellation::new(),
        );
        let res = next.run(ctx()).await.unwrap();
        assert_eq!(res.status(), StatusCode::Unauthorized);
        assert!(!state.handler_reached());
    }

    #[tokio::test]
    async fn failure_records_position() {
        let pass = middleware(|ctx: Context, next: Next| next.run(ctx));
        let fail = middleware(|_ctx: Context, _next: Next| async {
            Err::<Response, BoxError>("denied".into())
        });
        let (next, _) = chain(
            vec![pass, fail],
            handler(|_ctx: Context| async { StatusCode::Ok }),
            Cancellation::new(),
        );

        let err = next.run(ctx()).await.unwrap_err();
        let err = err.downcast::<DispatchError>().unwrap();
        assert!(matches!(*err, DispatchError::Middleware { position: 1, .. }));
    }

    #[tokio::test]
    async fn handler_failure_passes_through_middleware() {
        let pass = middleware(|ctx: Context, next: Next| next.run(ctx));
        let (next, _) = chain(
            vec![pass],
            handler(|_ctx: Context| async { Err::<Response, BoxError>("boom".into()) }),
            Cancellation::new(),
        );

        let err = next.run(ctx()).await.unwrap_err();
        let err = err.downcast::<DispatchError>().unwrap();
        assert!(matches!(*err, DispatchError::Handler { .. }));
        assert_eq!(err.to_string(), "route handler failed: boom");
    }

    #[tokio::test]
    async fn cancellation_stops_scheduling() {
        let cancel = Cancellation::new();
        let trip = cancel.clone();
        let cancelling = middleware(move |ctx: Context, next: Next| {
            trip.cancel();
            next.run(ctx)
        });
        let (next, state) = chain(
            vec![cancelling],
            handler(|_ctx: Context| async { StatusCode::Ok }),
            cancel,
        );

        let err = next.run(ctx()).await.unwrap_err();
        let err = err.downcast::<DispatchError>().unwrap();
        assert!(matches!(*err, DispatchError::Cancelled { step: 1 }));
        assert!(!state.handler_reached());
    }

    #[tokio::test]
    async fn logger_passes_response_through() {
        let (next, _) = chain(
            vec![from_middleware(Arc::new(LoggerMiddleware))],
            handler(|_ctx: Context| async { StatusCode::Created }),
            Cancellation::new(),
        );
        let res = next.run(ctx()).await.unwrap();
        assert_eq!(res.status(), StatusCode::Created);
    }
}
