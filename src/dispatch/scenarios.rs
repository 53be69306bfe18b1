//! End-to-end routing scenarios: register, seal, dispatch.

use std::sync::{Arc, Mutex};

use super::*;
use crate::middleware::middleware;
use crate::realtime::Message;
use crate::router::{BoxError, HttpOptions, UseArg, WsOptions};

type Log = Arc<Mutex<Vec<&'static str>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn tag(log: &Log, name: &'static str) -> MiddlewareHandler {
    let log = Arc::clone(log);
    middleware(move |ctx: Context, next: Next| {
        log.lock().unwrap().push(name);
        next.run(ctx)
    })
}

fn text(body: &'static str) -> impl Fn(Context) -> std::future::Ready<Response> + Send + Sync + 'static {
    move |_ctx: Context| std::future::ready(Response::new(StatusCode::Ok).body(body))
}

fn echo_params(ctx: Context) -> std::future::Ready<Response> {
    let rendered = ctx
        .params()
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",");
    std::future::ready(Response::new(StatusCode::Ok).body(rendered))
}

fn body(outcome: Outcome) -> String {
    match outcome {
        Outcome::Completed(r) => String::from_utf8(r.body_bytes().to_vec()).unwrap(),
        other => panic!("expected a completed dispatch, got {other:?}"),
    }
}

fn get(path: &str) -> Request {
    Request::new(Method::Get, path)
}

#[tokio::test]
async fn mounted_router_binds_params_under_prefix() {
    init_tracing();
    let mut users = Router::new();
    users.get("/:id", echo_params).unwrap();
    users.get("/:id/posts/:postId", echo_params).unwrap();

    let mut app = Router::new();
    app.mount("/users", users).unwrap();
    let dispatcher = app.into_dispatcher();

    assert_eq!(body(dispatcher.dispatch(get("/users/7")).await), "id=7");
    assert_eq!(
        body(dispatcher.dispatch(get("/users/7/posts/99?draft=1")).await),
        "id=7,postId=99"
    );
    assert!(dispatcher.dispatch(get("/users")).await.is_not_found());
}

#[tokio::test]
async fn users_and_posts_share_prefix_middleware() {
    let log: Log = Arc::default();
    let mut router = Router::new();

    let h1_log = Arc::clone(&log);
    router
        .get("/users/:id", move |ctx: Context| {
            h1_log.lock().unwrap().push("h1");
            echo_params(ctx)
        })
        .unwrap();
    router.use_at("/users", tag(&log, "mw1")).unwrap();
    let h2_log = Arc::clone(&log);
    router
        .get("/users/:id/posts/*", move |ctx: Context| {
            h2_log.lock().unwrap().push("h2");
            echo_params(ctx)
        })
        .unwrap();
    let dispatcher = router.into_dispatcher();

    assert_eq!(body(dispatcher.dispatch(get("/users/42")).await), "id=42");
    assert_eq!(*log.lock().unwrap(), ["mw1", "h1"]);

    log.lock().unwrap().clear();
    assert_eq!(
        body(dispatcher.dispatch(get("/users/42/posts/2024/jan")).await),
        "id=42"
    );
    assert_eq!(*log.lock().unwrap(), ["mw1", "h2"]);

    let resolved = dispatcher.resolve(&Method::Get, "/users/42/posts").unwrap();
    assert_eq!(resolved.record.pattern().to_string(), "/users/:id/posts/*");
    assert_eq!(resolved.chain_len, 1);
}

#[tokio::test]
async fn middleware_runs_in_registration_order_across_mounts() {
    let log: Log = Arc::default();

    let mut child = Router::new();
    child.use_at("/x", tag(&log, "child")).unwrap();
    child.get("/x/leaf", text("leaf")).unwrap();

    let mut app = Router::new();
    app.use_at("/a", tag(&log, "first")).unwrap();
    app.use_args(vec![
        UseArg::from("/a"),
        tag(&log, "plain").into(),
        child.into(),
    ])
    .unwrap();
    app.use_middleware(tag(&log, "last"));

    let dispatcher = app.into_dispatcher();
    assert_eq!(body(dispatcher.dispatch(get("/a/x/leaf")).await), "leaf");
    assert_eq!(*log.lock().unwrap(), ["first", "plain", "child", "last"]);

    log.lock().unwrap().clear();
    assert!(dispatcher.dispatch(get("/a/y")).await.is_not_found());
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn static_beats_param_beats_wildcard() {
    let mut router = Router::new();
    router.get("/files/*", text("wildcard")).unwrap();
    router.get("/files/:name", text("param")).unwrap();
    router.get("/files/new", text("static")).unwrap();
    let dispatcher = router.into_dispatcher();

    assert_eq!(body(dispatcher.dispatch(get("/files/new")).await), "static");
    assert_eq!(body(dispatcher.dispatch(get("/files/report")).await), "param");
    assert_eq!(body(dispatcher.dispatch(get("/files/a/b/c")).await), "wildcard");
    assert_eq!(body(dispatcher.dispatch(get("/files")).await), "wildcard");
}

#[tokio::test]
async fn any_route_is_a_fallback() {
    let mut router = Router::new();
    router.any("/thing", text("any")).unwrap();
    router.get("/thing", text("get")).unwrap();
    let dispatcher = router.into_dispatcher();

    assert_eq!(body(dispatcher.dispatch(get("/thing")).await), "get");
    assert_eq!(
        body(dispatcher.dispatch(Request::new(Method::Delete, "/thing")).await),
        "any"
    );
}

#[tokio::test]
async fn ws_route_skips_router_middleware() {
    let log: Log = Arc::default();
    let mut router = Router::new();
    router.use_at("/chat", tag(&log, "router")).unwrap();
    router
        .ws_with(
            "/chat/:room",
            WsOptions::default().middleware(tag(&log, "inline")),
            |ws: Websocket| async move {
                let room = ws.params().get("room").unwrap_or_default().to_owned();
                ws.send(Message::Text(room)).await?;
                Ok::<(), BoxError>(())
            },
        )
        .unwrap();
    let dispatcher = router.into_dispatcher();

    let (ws, mut peer) = Websocket::channel(4);
    let outcome = dispatcher.dispatch_websocket(get("/chat/lobby"), ws).await;
    match outcome {
        Outcome::Completed(r) => assert_eq!(r.status(), StatusCode::SwitchingProtocols),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(peer.outbound.recv().await, Some(Message::Text("lobby".into())));
    assert_eq!(*log.lock().unwrap(), ["inline"]);

    // Handshake without an upgrade route is accepted before any middleware runs.
    log.lock().unwrap().clear();
    let handshake = get("/chat/lobby")
        .with_header("Connection", "Upgrade")
        .with_header("Upgrade", "websocket");
    match dispatcher.dispatch(handshake).await {
        Outcome::Completed(r) => assert_eq!(r.status(), StatusCode::SwitchingProtocols),
        other => panic!("unexpected {other:?}"),
    }
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn upgrade_route_runs_router_chain() {
    let log: Log = Arc::default();
    let mut router = Router::new();
    router.use_middleware(tag(&log, "auth"));
    router
        .upgrade("/live", |_ctx: Context| async { StatusCode::SwitchingProtocols })
        .unwrap();
    router
        .ws("/live", |_ws: Websocket| async { Ok::<(), BoxError>(()) })
        .unwrap();

    let handshake = get("/live")
        .with_header("Connection", "keep-alive, Upgrade")
        .with_header("Upgrade", "websocket");
    let outcome = router.into_dispatcher().dispatch(handshake).await;
    assert!(matches!(outcome, Outcome::Completed(_)));
    assert_eq!(*log.lock().unwrap(), ["auth"]);
}

#[tokio::test]
async fn repeated_dispatch_is_stable() {
    let mut router = Router::new();
    router.get("/users/:id", echo_params).unwrap();
    let dispatcher = router.into_dispatcher();

    let first = body(dispatcher.dispatch(get("/users/1")).await);
    let second = body(dispatcher.dispatch(get("/users/1")).await);
    assert_eq!(first, second);
}

#[tokio::test]
async fn duplicate_route_last_registration_wins() {
    init_tracing();
    let mut router = Router::new();
    router.get("/dup", text("first")).unwrap();
    router.get("/dup", text("second")).unwrap();
    assert_eq!(router.len(), 1);
    assert_eq!(body(router.into_dispatcher().dispatch(get("/dup")).await), "second");
}

#[tokio::test]
async fn route_middleware_can_reject() {
    let mut router = Router::new();
    let deny = middleware(|ctx: Context, next: Next| async move {
        if ctx.request().headers().contains("authorization") {
            next.run(ctx).await
        } else {
            Ok(Response::new(StatusCode::Unauthorized))
        }
    });
    router
        .post_with("/items", HttpOptions::new().middleware(deny), text("created"))
        .unwrap();
    let dispatcher = router.into_dispatcher();

    let denied = dispatcher.dispatch(Request::new(Method::Post, "/items")).await;
    assert!(matches!(denied, Outcome::ShortCircuited(ref r) if r.status() == StatusCode::Unauthorized));

    let allowed = Request::new(Method::Post, "/items").with_header("Authorization", "Bearer t");
    assert_eq!(body(dispatcher.dispatch(allowed).await), "created");
}

#[tokio::test]
async fn cancellation_mid_chain_stops_before_handler() {
    let cancel = Cancellation::new();
    let trip = cancel.clone();
    let mut router = Router::new();
    router.use_middleware(middleware(move |ctx: Context, next: Next| {
        trip.cancel();
        next.run(ctx)
    }));
    router.get("/", text("unreachable")).unwrap();

    let outcome = router.into_dispatcher().dispatch_with(get("/"), cancel).await;
    assert!(matches!(
        outcome,
        Outcome::Errored(DispatchError::Cancelled { step: 1 })
    ));
}

#[tokio::test]
async fn middleware_failure_names_position() {
    let log: Log = Arc::default();
    let mut router = Router::new();
    router.use_middleware(tag(&log, "ok"));
    router.use_middleware(middleware(|_ctx: Context, _next: Next| async {
        Err::<Response, BoxError>("quota exceeded".into())
    }));
    router.get("/", text("unreachable")).unwrap();

    match router.into_dispatcher().dispatch(get("/")).await {
        Outcome::Errored(err @ DispatchError::Middleware { position: 1, .. }) => {
            assert!(err.to_string().contains("quota exceeded"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dispatcher_is_shared_across_tasks() {
    let mut router = Router::new();
    router.get("/n/:n", echo_params).unwrap();
    let dispatcher = router.into_dispatcher();

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { body(dispatcher.dispatch(get(&format!("/n/{i}"))).await) })
        })
        .collect();

    for (i, task) in tasks.into_iter().enumerate() {
        assert_eq!(task.await.unwrap(), format!("n={i}"));
    }
}
