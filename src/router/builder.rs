//! Chainable registration scope returned by [`Router::route`].

use std::fmt;

use super::args::{RouteArg, parse_route_args};
use super::record::{HttpOptions, IntoHandler, IntoWsHandler, RouteMethod, WsOptions};
use super::{ConfigError, Router, RouterError};
use crate::http::Method;
use crate::middleware::MiddlewareHandler;

/// Registers several routes against one pattern.
///
/// ```rust
/// use switchyard::{Context, Router, StatusCode};
///
/// # fn build() -> Result<(), switchyard::RouterError> {
/// let mut router = Router::new();
/// router
///     .route("/items/:id")
///     .get(|_ctx: Context| async { StatusCode::Ok })?
///     .delete(|_ctx: Context| async { StatusCode::NoContent })?;
/// # Ok(())
/// # }
/// # build().unwrap();
/// ```
pub struct RouteBuilder<'r> {
    router: &'r mut Router,
    pattern: String,
}

impl fmt::Debug for RouteBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteBuilder")
            .field("pattern", &self.pattern)
            .field("router", &self.router)
            .finish()
    }
}

macro_rules! scoped_verbs {
    ($( $verb:ident, $verb_with:ident; )*) => {
        $(
            pub fn $verb(&mut self, handler: impl IntoHandler) -> Result<&mut Self, RouterError> {
                self.router.$verb(&self.pattern, handler)?;
                Ok(self)
            }

            pub fn $verb_with(
                &mut self,
                options: HttpOptions,
                handler: impl IntoHandler,
            ) -> Result<&mut Self, RouterError> {
                self.router.$verb_with(&self.pattern, options, handler)?;
                Ok(self)
            }
        )*
    };
}

impl<'r> RouteBuilder<'r> {
    pub(crate) fn new(router: &'r mut Router, pattern: String) -> Self {
        Self { router, pattern }
    }

    /// The pattern every registration in this scope uses.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    scoped_verbs! {
        get, get_with;
        post, post_with;
        put, put_with;
        delete, delete_with;
        head, head_with;
        options, options_with;
        patch, patch_with;
        trace, trace_with;
        connect, connect_with;
        any, any_with;
        all, all_with;
        upgrade, upgrade_with;
    }

    pub fn on(&mut self, method: Method, handler: impl IntoHandler) -> Result<&mut Self, RouterError> {
        self.router.on(method, &self.pattern, handler)?;
        Ok(self)
    }

    pub fn ws(&mut self, handler: impl IntoWsHandler) -> Result<&mut Self, RouterError> {
        self.router.ws(&self.pattern, handler)?;
        Ok(self)
    }

    pub fn ws_with(
        &mut self,
        options: WsOptions,
        handler: impl IntoWsHandler,
    ) -> Result<&mut Self, RouterError> {
        self.router.ws_with(&self.pattern, options, handler)?;
        Ok(self)
    }

    /// Register router-level middleware for every path under this pattern.
    pub fn use_middleware(&mut self, middleware: MiddlewareHandler) -> Result<&mut Self, RouterError> {
        self.router.use_at(&self.pattern, middleware)?;
        Ok(self)
    }

    /// Argument-list registration. A leading pattern argument is rejected;
    /// the scope's pattern is always used.
    pub fn register<I>(&mut self, method: RouteMethod, args: I) -> Result<&mut Self, RouterError>
    where
        I: IntoIterator<Item = RouteArg>,
    {
        let args: Vec<RouteArg> = args.into_iter().collect();
        if let Some(position) = args.iter().position(|a| matches!(a, RouteArg::Pattern(_))) {
            return Err(ConfigError::UnexpectedArgument {
                position,
                found: "pattern",
                reason: "a route scope already fixes the pattern",
            }
            .into());
        }
        let parsed = parse_route_args(args, Some(self.pattern.as_str()))?;
        self.router.register_parsed(method, parsed)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::http::StatusCode;
    use crate::middleware::{Next, middleware};
    use crate::router::handler;

    fn ok() -> impl IntoHandler {
        |_ctx: Context| async { StatusCode::Ok }
    }

    #[test]
    fn scope_registers_each_verb_on_its_pattern() {
        let mut router = Router::new();
        router
            .route("/items/:id")
            .get(ok())
            .unwrap()
            .put_with(HttpOptions::new().max_body_length(16), ok())
            .unwrap()
            .on(Method::Custom("PURGE".into()), ok())
            .unwrap();

        let registered: Vec<String> = router
            .routes()
            .map(|r| format!("{} {}", r.method(), r.pattern()))
            .collect();
        assert_eq!(registered, ["GET /items/:id", "PUT /items/:id", "PURGE /items/:id"]);
    }

    #[test]
    fn scoped_middleware_uses_pattern_as_prefix() {
        let mut router = Router::new();
        router
            .route("/admin/*")
            .use_middleware(middleware(|ctx: Context, next: Next| next.run(ctx)))
            .unwrap();
        assert_eq!(router.middlewares()[0].prefix().to_string(), "/admin");
    }

    #[test]
    fn scoped_register_rejects_explicit_pattern() {
        let mut router = Router::new();
        let mut scope = router.route("/a");
        scope
            .register(RouteMethod::Http(Method::Post), vec![RouteArg::from(handler(ok()))])
            .unwrap();
        let err = scope
            .register(
                RouteMethod::Http(Method::Get),
                vec![RouteArg::from("/b"), handler(ok()).into()],
            )
            .unwrap_err();
        assert!(matches!(
            err,
            RouterError::Config(ConfigError::UnexpectedArgument { position: 0, .. })
        ));
        assert_eq!(router.len(), 1);
    }
}
