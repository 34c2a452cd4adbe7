use futures::future::BoxFuture;
use hyper::StatusCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wiring::handler::{Arguments, Dependant};
use wiring::injection::{ContainerBuilder, current_connection, current_scope};
use wiring::integration::{SetupOptions, get_app_container, setup, setup_with};
use wiring::router::Router;
use wiring::{AppResult, Application, ApplicationConfig, LifecycleHook};

struct Database;
struct Unregistered;

#[derive(Default)]
struct Seen(Mutex<Vec<String>>);

fn new_app(router: Router) -> Application {
    Application::new(ApplicationConfig::default(), router)
}

fn count_injected(app: &mut Application) -> BoxFuture<'_, AppResult<()>> {
    Box::pin(async move {
        let injected = app
            .router()
            .routes()
            .iter()
            .filter(|r| r.dependant().is_some_and(|d| d.is_injected()))
            .count();
        if let Some(seen) = app.state().get::<Seen>() {
            seen.0.lock().unwrap().push(format!("startup saw {injected} injected"));
        }
        Ok(())
    })
}

fn container_still_open(app: &mut Application) -> BoxFuture<'_, AppResult<()>> {
    Box::pin(async move {
        let open = !get_app_container(app)?.is_closed();
        if let Some(seen) = app.state().get::<Seen>() {
            seen.0.lock().unwrap().push(format!("shutdown saw open={open}"));
        }
        Ok::<_, wiring::AppError>(())
    })
}

fn inject_routes(app: &mut Application) -> BoxFuture<'_, AppResult<()>> {
    Box::pin(wiring::integration::on_startup(app))
}

async fn uses_database(args: Arguments) -> AppResult<&'static str> {
    args.get::<Database>("db")?;
    Ok("db")
}

#[tokio::test]
async fn injector_runs_first_and_container_closes_last() {
    let container = ContainerBuilder::new().instance(Database).build();
    let mut router = Router::new();
    router.get("/db", Dependant::new(uses_database).inject::<Database>("db"));

    let mut app = new_app(router);
    app.state_mut().insert(Seen::default());
    app.on_startup_mut()
        .push(LifecycleHook::new("count", count_injected));
    app.on_shutdown_mut()
        .push(LifecycleHook::new("check", container_still_open));
    setup(container.clone(), &mut app);

    app.startup().await.unwrap();
    app.shutdown().await.unwrap();

    let seen = app.state().get::<Seen>().unwrap();
    assert_eq!(
        *seen.0.lock().unwrap(),
        ["startup saw 1 injected", "shutdown saw open=true"]
    );
    assert!(container.is_closed());
}

#[tokio::test]
async fn startup_fails_when_the_container_was_never_bound() {
    let mut app = new_app(Router::new());
    app.on_startup_mut()
        .push(LifecycleHook::new("inject", inject_routes));
    let err = app.startup().await.unwrap_err();
    assert_eq!(err.error_code(), "MISSING_STATE");
}

#[tokio::test]
async fn ambient_context_publishes_connection_and_scope() {
    async fn inspect(args: Arguments) -> AppResult<String> {
        args.get::<Database>("db")?;
        let connection = current_connection().expect("connection published");
        let scope = current_scope().expect("scope published");
        Ok(format!("{} closed={}", connection.path(), scope.is_closed()))
    }

    let container = ContainerBuilder::new().instance(Database).build();
    let mut router = Router::new();
    router.get("/inspect", Dependant::new(inspect).inject::<Database>("db"));

    for connection_context in [false, true] {
        let mut app = new_app(router.clone());
        setup_with(container.clone(), &mut app, SetupOptions { connection_context });
        let client = app.test_client().await.unwrap();
        client
            .get("/inspect")
            .send()
            .await
            .assert_ok()
            .assert_text("/inspect closed=false");
    }
}

#[tokio::test]
async fn resolution_failures_become_injection_errors() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);

    async fn never(_args: Arguments) -> &'static str {
        CALLS.fetch_add(1, Ordering::SeqCst);
        "unreachable"
    }

    let container = ContainerBuilder::new()
        .scoped::<Database, _, _>(|_| async { Err::<Database, _>(anyhow::anyhow!("db down")) })
        .build();
    let mut router = Router::new();
    router
        .get("/missing", Dependant::new(never).inject::<Unregistered>("x"))
        .get("/failing", Dependant::new(never).inject::<Database>("db"));

    let mut app = new_app(router);
    setup(container, &mut app);
    let client = app.test_client().await.unwrap();

    for path in ["/missing", "/failing"] {
        client
            .get(path)
            .send()
            .await
            .assert_status(StatusCode::INTERNAL_SERVER_ERROR)
            .assert_error_code("INJECTION_ERROR");
    }
    assert_eq!(CALLS.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn requests_get_distinct_scopes() {
    struct Token;

    async fn token_addr(args: Arguments) -> AppResult<String> {
        let token = args.get::<Token>("token")?;
        Ok(format!("{:p}", Arc::as_ptr(&token)))
    }

    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let container = ContainerBuilder::new()
        .scoped::<Token, _, _>(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, anyhow::Error>(Token) }
        })
        .build();
    let mut router = Router::new();
    router.get("/token", Dependant::new(token_addr).inject::<Token>("token"));

    let mut app = new_app(router);
    setup_with(
        container,
        &mut app,
        SetupOptions {
            connection_context: true,
        },
    );
    let client = app.test_client().await.unwrap();
    let (a, b) = tokio::join!(client.get("/token").send(), client.get("/token").send());
    a.assert_ok();
    b.assert_ok();
    assert_eq!(created.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn injected_http_route_is_wrapped_and_plain_websocket_route_is_not() {
    async fn ws_handler(_args: Arguments) {}

    let container = ContainerBuilder::new().instance(Database).build();
    let http = Dependant::new(uses_database).inject::<Database>("db");
    let ws = Dependant::new(ws_handler).socket("socket");
    let http_call = http.call.clone().unwrap();
    let ws_call = ws.call.clone().unwrap();

    let mut router = Router::new();
    router.get("/db", http).websocket("/ws", ws);
    let mut app = new_app(router);
    setup(container, &mut app);
    let client = app.test_client().await.unwrap();

    let routes = app.router().routes();
    let http = routes[0].dependant().unwrap();
    assert!(!Arc::ptr_eq(http.call.as_ref().unwrap(), &http_call));
    assert_eq!(
        http.http_connection_param_name.as_deref(),
        Some(wiring::integration::CONNECTION_PARAM_NAME)
    );
    let ws = routes[1].dependant().unwrap();
    assert!(Arc::ptr_eq(ws.call.as_ref().unwrap(), &ws_call));
    assert_eq!(ws.http_connection_param_name, None);

    client.get("/db").send().await.assert_ok().assert_text("db");
}

#[tokio::test]
async fn path_params_reach_factories_only_without_the_ambient_layer() {
    struct PathId(Option<String>);

    async fn show(args: Arguments) -> AppResult<String> {
        let id = args.get::<PathId>("path_id")?;
        Ok(id.0.clone().unwrap_or_else(|| "-".to_string()))
    }

    let container = ContainerBuilder::new()
        .scoped::<PathId, _, _>(|_| {
            let id = current_connection().and_then(|c| c.path_param("id").map(str::to_string));
            async move { Ok::<_, anyhow::Error>(PathId(id)) }
        })
        .build();
    let mut router = Router::new();
    router.get(
        "/users/{id}",
        Dependant::new(show).path("id").inject::<PathId>("path_id"),
    );

    for (connection_context, expected) in [(false, "7"), (true, "-")] {
        let mut app = new_app(router.clone());
        setup_with(container.clone(), &mut app, SetupOptions { connection_context });
        let client = app.test_client().await.unwrap();
        client
            .get("/users/7")
            .send()
            .await
            .assert_ok()
            .assert_text(expected);
    }
}
