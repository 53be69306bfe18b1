//! # switchyard
//!
//! Request routing and middleware composition for async HTTP and WebSocket
//! servers. The connection layer parses requests; switchyard decides which
//! handler runs and which middleware wraps it.
//!
//! ## Quick Start
//!
//! ```rust
//! use switchyard::middleware::{Next, middleware};
//! use switchyard::{Context, Method, Outcome, Request, Response, Router, StatusCode};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), switchyard::RouterError> {
//! let mut api = Router::new();
//! api.get("/users/:id", |ctx: Context| async move {
//!     let id = ctx.param("id").unwrap_or_default().to_owned();
//!     Response::new(StatusCode::Ok).body(id)
//! })?;
//!
//! let mut app = Router::new();
//! app.use_middleware(middleware(|ctx: Context, next: Next| async move {
//!     let response = next.run(ctx).await?;
//!     Ok::<_, switchyard::BoxError>(response.header("x-served-by", "switchyard"))
//! }));
//! app.mount("/api", api)?;
//!
//! let dispatcher = app.into_dispatcher();
//! match dispatcher.dispatch(Request::new(Method::Get, "/api/users/42")).await {
//!     Outcome::Completed(response) => assert_eq!(response.body_bytes().as_ref(), b"42"),
//!     other => panic!("unexpected outcome: {}", other.label()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`router`]: patterns, the route trie, registration and mounting.
//! - [`dispatch`]: sealed, shareable request dispatch.
//! - [`middleware`]: the onion chain and [`Next`].
//! - [`context`]: per-request params and extensions.
//! - [`realtime`]: the WebSocket handle passed to WS handlers.
//! - [`http`]: request, response, method, and status types.

pub mod context;
pub mod dispatch;
pub mod http;
pub mod middleware;
pub mod realtime;
pub mod router;

pub use context::{Context, Extensions, Parameters};
pub use dispatch::{Cancellation, DispatchError, Dispatcher, Outcome};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use middleware::{MiddlewareHandler, Next, middleware};
pub use realtime::{Message, Websocket};
pub use router::{
    BoxError, ConfigError, HttpOptions, PatternError, RouteMethod, Router, RouterError, WsOptions,
    handler, ws_handler,
};
