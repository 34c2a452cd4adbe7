//! 把依赖容器接入 [`Application`] 的生命周期
//!
//! ```rust,ignore
//! let container = ContainerBuilder::new()
//!     .scoped::<Session, _, _>(|_| async { Ok(Session::default()) })
//!     .build();
//!
//! let mut router = Router::new();
//! router.get("/me", Dependant::new(me).inject::<Session>("session"));
//!
//! let mut app = Application::new_(router);
//! wiring::integration::setup(container, &mut app);
//! app.run().await?;
//! ```
//!
//! `setup` 只登记容器与钩子；真正改写路由发生在 [`Application::startup`]，
//! 因此 `setup` 之后注册的路由同样会被注入。

use crate::app::{Application, LifecycleHook};
use crate::error::{AppError, AppResult};
use crate::injection::{AsyncContainer, InjectionMode, connection_context_layer, inject_from_container};
use crate::router::Route;
use futures::future::BoxFuture;

/// 自动补充的连接参数名，框架会在调用原 handler 前移除它
pub const CONNECTION_PARAM_NAME: &str = "_wiring_http_connection";

/// 应用状态中保存容器的槽位
#[derive(Clone, Debug)]
pub struct BoundContainer(pub AsyncContainer);

/// 标记连接上下文中间件已挂载到 Router 上
#[derive(Clone, Copy, Debug)]
pub struct ConnectionContextInstalled;

#[derive(Clone, Copy, Debug, Default)]
pub struct SetupOptions {
    /// 为所有 HTTP 请求挂载连接上下文中间件
    ///
    /// 挂载后 HTTP 路由直接从中间件发布的请求作用域解析依赖，
    /// 无需向参数表补充连接参数；WebSocket 路由不受影响。
    ///
    /// 注意：中间件在路由匹配之前运行，此时发布的 `HttpConnection` 不含路径参数。
    /// 工厂里通过 `current_connection().path_param(..)` 读取路径参数只在未开启时有效；
    /// handler 自己声明的连接参数始终带有路径参数。
    pub connection_context: bool,
}

/// 将容器绑定到应用：写入状态，并在钩子列表两端登记启动与停机钩子
///
/// 启动钩子插在最前面，保证其它启动钩子看到的已经是注入后的路由；
/// 停机钩子追加在最后，容器在其它停机钩子之后关闭。
pub fn setup(container: AsyncContainer, app: &mut Application) {
    setup_with(container, app, SetupOptions::default())
}

/// 同 [`setup`]，可指定 [`SetupOptions`]
///
/// 每个应用只绑定一次容器：已经绑定过时忽略本次调用，保留原来的容器与钩子。
pub fn setup_with(container: AsyncContainer, app: &mut Application, options: SetupOptions) {
    if app.state().contains::<BoundContainer>() {
        tracing::warn!("application already has a container bound, ignoring setup");
        return;
    }
    if options.connection_context {
        app.router_mut()
            .with_layer(connection_context_layer(container.clone()));
        app.state_mut().insert(ConnectionContextInstalled);
    }
    app.state_mut().insert(BoundContainer(container));
    app.on_startup_mut()
        .insert(0, LifecycleHook::new("wiring.inject_routes", startup_hook));
    app.on_shutdown_mut()
        .push(LifecycleHook::new("wiring.close_container", shutdown_hook));
    tracing::debug!(
        connection_context = options.connection_context,
        "container bound to application"
    );
}

/// 读取绑定到应用上的容器；在 [`setup`] 之前调用会失败
pub fn get_app_container(app: &Application) -> AppResult<AsyncContainer> {
    app.state()
        .get::<BoundContainer>()
        .map(|bound| bound.0.clone())
        .ok_or(AppError::MissingState("BoundContainer"))
}

/// 改写路由集合中需要注入的 handler，返回被改写的路由数
///
/// `uses_connection_context` 为 true 时，HTTP 路由从外层中间件发布的作用域解析依赖；
/// 否则（以及所有 WebSocket 路由）由包装层自己从连接参数打开作用域。
pub fn inject_routes(
    container: &AsyncContainer,
    routes: &mut [Route],
    uses_connection_context: bool,
) -> usize {
    let mut wrapped = 0;
    for route in routes.iter_mut() {
        let is_websocket = route.is_websocket();
        let path = route.path().to_string();
        let Some(dependant) = route.dependant_mut() else {
            continue;
        };
        let Some(call) = dependant.call.clone() else {
            continue;
        };
        if dependant.is_injected() {
            continue;
        }
        let params = dependant.injected_params();
        if params.is_empty() {
            continue;
        }

        let mode = if !is_websocket && uses_connection_context {
            InjectionMode::Ambient
        } else {
            match dependant.http_connection_param_name.clone() {
                Some(name) => InjectionMode::Connection {
                    param_name: name,
                    remove_from_arguments: false,
                },
                None => {
                    dependant.http_connection_param_name = Some(CONNECTION_PARAM_NAME.to_string());
                    InjectionMode::Connection {
                        param_name: CONNECTION_PARAM_NAME.to_string(),
                        remove_from_arguments: true,
                    }
                }
            }
        };
        tracing::debug!(
            path = %path,
            websocket = is_websocket,
            injected = params.len(),
            mode = ?mode,
            "injecting route handler"
        );
        dependant.call = Some(inject_from_container(container, mode).wrap(call, params));
        dependant.injected = true;
        wrapped += 1;
    }
    wrapped
}

/// 启动钩子：把容器注入到应用的路由集合
pub async fn on_startup(app: &mut Application) -> AppResult<()> {
    let container = get_app_container(app)?;
    let uses_connection_context = app.state().contains::<ConnectionContextInstalled>();
    let wrapped = inject_routes(&container, app.routes_mut(), uses_connection_context);
    tracing::info!(routes = wrapped, "injected route handlers");
    Ok(())
}

/// 停机钩子：关闭绑定的容器
pub async fn on_shutdown(app: &mut Application) -> AppResult<()> {
    let container = get_app_container(app)?;
    container.close().await;
    Ok(())
}

fn startup_hook(app: &mut Application) -> BoxFuture<'_, AppResult<()>> {
    Box::pin(on_startup(app))
}

fn shutdown_hook(app: &mut Application) -> BoxFuture<'_, AppResult<()>> {
    Box::pin(on_shutdown(app))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::ApplicationConfig;
    use crate::handler::{Arguments, Dependant};
    use crate::injection::ContainerBuilder;
    use crate::router::Router;
    use std::sync::Arc;

    struct Clock;

    async fn handler(_args: Arguments) -> &'static str {
        "ok"
    }

    fn noop(_app: &mut Application) -> BoxFuture<'_, AppResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn app() -> Application {
        Application::new(ApplicationConfig::default(), Router::new())
    }

    #[test]
    fn accessor_fails_before_setup() {
        let err = get_app_container(&app()).unwrap_err();
        assert!(matches!(err, AppError::MissingState("BoundContainer")));
    }

    #[test]
    fn setup_stores_container_and_brackets_hooks() {
        let mut app = app();
        app.on_startup_mut()
            .push(LifecycleHook::new("user.startup", noop));
        app.on_shutdown_mut()
            .push(LifecycleHook::new("user.shutdown", noop));

        let container = ContainerBuilder::new().build();
        setup(container.clone(), &mut app);

        assert!(get_app_container(&app).unwrap().ptr_eq(&container));
        let startup: Vec<_> = app.on_startup_hooks().iter().map(LifecycleHook::name).collect();
        let shutdown: Vec<_> = app.on_shutdown_hooks().iter().map(LifecycleHook::name).collect();
        assert_eq!(startup, ["wiring.inject_routes", "user.startup"]);
        assert_eq!(shutdown, ["user.shutdown", "wiring.close_container"]);
        assert!(!app.state().contains::<ConnectionContextInstalled>());
    }

    #[test]
    fn routes_are_rewritten_according_to_their_kind() {
        let container = ContainerBuilder::new().instance(Clock).build();
        let plain = Dependant::new(handler).query("q");
        let plain_call = plain.call.clone().unwrap();

        let mut router = Router::new();
        router
            .service("/raw", tower::util::BoxCloneService::new(tower::service_fn(
                |_req: wiring_core::Req| async { Ok::<_, AppError>(crate::IntoResponse::into_response("raw")) },
            )))
            .get("/plain", plain)
            .get("/empty", Dependant::empty().inject::<Clock>("clock"))
            .get("/fresh", Dependant::new(handler).inject::<Clock>("clock"))
            .get(
                "/declared",
                Dependant::new(handler)
                    .connection("request")
                    .inject::<Clock>("clock"),
            )
            .websocket("/ws", Dependant::new(handler).inject::<Clock>("clock"));

        let wrapped = inject_routes(&container, router.routes_mut(), true);
        assert_eq!(wrapped, 3);

        let routes = router.routes();
        assert!(matches!(routes[0], Route::Service(_)));
        let plain = routes[1].dependant().unwrap();
        assert!(Arc::ptr_eq(plain.call.as_ref().unwrap(), &plain_call));
        assert!(!plain.is_injected());
        assert!(routes[2].dependant().unwrap().call.is_none());

        // 有连接上下文中间件时 HTTP 路由不需要连接参数
        let fresh = routes[3].dependant().unwrap();
        assert!(fresh.is_injected());
        assert_eq!(fresh.http_connection_param_name, None);

        let declared = routes[4].dependant().unwrap();
        assert_eq!(declared.http_connection_param_name.as_deref(), Some("request"));

        // WebSocket 路由总是需要连接参数
        let ws = routes[5].dependant().unwrap();
        assert_eq!(
            ws.http_connection_param_name.as_deref(),
            Some(CONNECTION_PARAM_NAME)
        );

        assert_eq!(inject_routes(&container, router.routes_mut(), true), 0);
    }

    #[test]
    fn without_connection_context_http_routes_get_the_reserved_param() {
        let container = ContainerBuilder::new().instance(Clock).build();
        let mut router = Router::new();
        router.get("/fresh", Dependant::new(handler).inject::<Clock>("clock"));

        assert_eq!(inject_routes(&container, router.routes_mut(), false), 1);
        let fresh = router.routes()[0].dependant().unwrap();
        assert_eq!(
            fresh.http_connection_param_name.as_deref(),
            Some(CONNECTION_PARAM_NAME)
        );
    }

    #[test]
    fn second_setup_is_ignored() {
        let mut app = app();
        let first = ContainerBuilder::new().build();
        let second = ContainerBuilder::new().build();
        setup(first.clone(), &mut app);
        setup_with(
            second,
            &mut app,
            SetupOptions {
                connection_context: true,
            },
        );

        assert!(get_app_container(&app).unwrap().ptr_eq(&first));
        assert_eq!(app.on_startup_hooks().len(), 1);
        assert_eq!(app.on_shutdown_hooks().len(), 1);
        assert!(!app.state().contains::<ConnectionContextInstalled>());
    }
}
