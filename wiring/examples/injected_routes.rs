use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tungstenite::Message;
use wiring::handler::{Arguments, Dependant, HttpConnection};
use wiring::injection::ContainerBuilder;
use wiring::integration::{CONNECTION_PARAM_NAME, SetupOptions, setup_with};
use wiring::router::Router;
use wiring::ws::WsSocket;
use wiring::{AppError, AppResult, Application, ApplicationConfig, IntoResponse, Json};

/// 单例：问候语前缀
pub struct Greeter {
    pub prefix: String,
}

/// 作用域：每个请求或每个 WebSocket 会话一个编号
pub struct RequestId(pub usize);

/// 观察容器行为的计数器
#[derive(Clone, Default)]
pub struct Probes {
    pub request_ids: Arc<AtomicUsize>,
    pub scopes_finalized: Arc<AtomicUsize>,
    pub greeter_closed: Arc<AtomicUsize>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct Hello {
    pub greeting: String,
    pub request_id: usize,
    pub same_scope: bool,
    pub connection_visible: bool,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct WhoAmI {
    pub method: String,
    pub path: String,
    pub request_id: usize,
}

async fn index(_args: Arguments) -> &'static str {
    "wiring demo"
}

async fn hello(args: Arguments) -> AppResult<Json<Hello>> {
    let name = args.get::<String>("name")?;
    let greeter = args.get::<Greeter>("greeter")?;
    let first = args.get::<RequestId>("request_id")?;
    let second = args.get::<RequestId>("same_request_id")?;
    Ok(Json(Hello {
        greeting: format!("{}, {}!", greeter.prefix, name),
        request_id: first.0,
        same_scope: Arc::ptr_eq(&first, &second),
        connection_visible: args.contains(CONNECTION_PARAM_NAME),
    }))
}

async fn whoami(args: Arguments) -> AppResult<Json<WhoAmI>> {
    let request = args.get::<HttpConnection>("request")?;
    let id = args.get::<RequestId>("request_id")?;
    Ok(Json(WhoAmI {
        method: request.method().to_string(),
        path: request.path().to_string(),
        request_id: id.0,
    }))
}

async fn echo(mut args: Arguments) -> AppResult<()> {
    let greeter = args.get::<Greeter>("greeter")?;
    let session = args.get::<RequestId>("session_id")?;
    tracing::debug!(session = session.0, "echo session started");
    let mut socket = args.take::<WsSocket>("socket")?;
    while let Some(Ok(msg)) = socket.next().await {
        match msg {
            Message::Text(text) => socket
                .send(format!("{} {}", greeter.prefix, text.as_str()))
                .await
                .map_err(|e| AppError::InternalServerError(e.to_string()))?,
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}

pub fn build_router() -> Router {
    let health = tower::service_fn(|_req: wiring::handler::Req| async {
        Ok::<_, AppError>("ok".into_response())
    });

    let mut router = Router::new();
    router
        .get("/", Dependant::new(index))
        .service("/health", tower::util::BoxCloneService::new(health))
        .get(
            "/hello/{name}",
            Dependant::new(hello)
                .path("name")
                .inject::<Greeter>("greeter")
                .inject::<RequestId>("request_id")
                .inject::<RequestId>("same_request_id"),
        )
        .get(
            "/whoami",
            Dependant::new(whoami)
                .connection("request")
                .inject::<RequestId>("request_id"),
        )
        .websocket(
            "/ws/echo",
            Dependant::new(echo)
                .socket("socket")
                .inject::<Greeter>("greeter")
                .inject::<RequestId>("session_id"),
        );
    router
}

pub fn create_app(options: SetupOptions) -> (Application, Probes) {
    let probes = Probes::default();
    let request_ids = probes.request_ids.clone();
    let scopes_finalized = probes.scopes_finalized.clone();
    let greeter_closed = probes.greeter_closed.clone();

    let container = ContainerBuilder::new()
        .singleton::<Greeter, _, _>(|_| async {
            Ok::<_, anyhow::Error>(Greeter {
                prefix: "Hello".to_string(),
            })
        })
        .on_close::<Greeter, _, _>(move |_| {
            let greeter_closed = greeter_closed.clone();
            async move {
                greeter_closed.fetch_add(1, Ordering::SeqCst);
            }
        })
        .scoped::<RequestId, _, _>(move |_| {
            let id = request_ids.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok::<_, anyhow::Error>(RequestId(id)) }
        })
        .on_close::<RequestId, _, _>(move |_| {
            let scopes_finalized = scopes_finalized.clone();
            async move {
                scopes_finalized.fetch_add(1, Ordering::SeqCst);
            }
        })
        .build();

    let mut app = Application::new(ApplicationConfig::default(), build_router());
    setup_with(container, &mut app, options);
    (app, probes)
}

#[allow(dead_code)]
#[tokio::main]
async fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();
    let (app, _probes) = create_app(SetupOptions {
        connection_context: true,
    });
    app.run().await
}
