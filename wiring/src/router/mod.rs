pub mod nested;
pub mod route;
pub mod router_svc;

use crate::AppError;
use crate::error::AppResult;
use crate::handler::Dependant;
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::{Method, Response};
use nested::NestLayer;
pub use route::{HttpRoute, Route, ServiceRoute, WebSocketRoute};
use router_svc::{RouteTable, RouterSvc};
use std::sync::Arc;
use tower::{Layer, Service, util::BoxCloneService};
use wiring_core::{BoxError, CoreError, IntoMethods, Req, Resp};

/// 生成各 HTTP 方法的简化注册函数（如 get/post/...）
macro_rules! define_method {
    ($name:ident, $m:ident) => {
        /// 将 handler 绑定到给定路径上（此函数注册指定的 HTTP 方法）
        pub fn $name(&mut self, path: &str, dependant: Dependant) -> &mut Self {
            self.route(Method::$m, path, dependant)
        }
    };
}

/// Tower 兼容的 Service 类型别名
pub type HttpSvc<T = Req> = BoxCloneService<T, Resp, AppError>;

type RouterLayer = Arc<dyn Fn(HttpSvc) -> HttpSvc + Send + Sync>;

/// Service 路由挂载时覆盖的方法
pub(crate) fn service_methods() -> [Method; 7] {
    [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::PATCH,
        Method::HEAD,
        Method::OPTIONS,
    ]
}

/// 路由器：按注册顺序保存路由集合，在 [`Router::into_tower_service`] 时编译为匹配表
///
/// 路由集合是普通数据，启动阶段可以直接改写其中的 [`Dependant`]。
#[derive(Clone, Default)]
pub struct Router {
    /// 已注册的路由
    pub routes: Vec<Route>,
    /// 待应用的中间件层，按注册顺序由内向外包裹
    pub layers: Vec<RouterLayer>,
}

impl Router {
    /// 创建一个空路由器
    pub fn new() -> Self {
        Self::default()
    }

    /// 将 handler 挂载到指定 path
    ///
    /// 支持一次性注册多个方法，如 `"GET,POST"` 或 `vec![Method::GET, Method::POST]`
    pub fn route(&mut self, method: impl IntoMethods, path: &str, dependant: Dependant) -> &mut Self {
        self.routes.push(Route::Http(HttpRoute {
            path: path.to_string(),
            methods: method.into_methods(),
            dependant,
        }));
        self
    }

    define_method!(get, GET);
    define_method!(post, POST);
    define_method!(put, PUT);
    define_method!(delete, DELETE);
    define_method!(head, HEAD);
    define_method!(options, OPTIONS);
    define_method!(patch, PATCH);

    /// 挂载 WebSocket 路由
    ///
    /// 握手请求匹配到该路由时先完成升级，handler 在独立任务中运行，
    /// 通过声明的 `socket` 参数拿到 [`WsSocket`](crate::ws::WsSocket)。
    pub fn websocket(&mut self, path: &str, dependant: Dependant) -> &mut Self {
        self.routes.push(Route::WebSocket(WebSocketRoute {
            path: path.to_string(),
            dependant,
        }));
        self
    }

    /// 将一个 Service 挂载到所有常用 HTTP 方法
    pub fn service(&mut self, path: &str, svc: HttpSvc) -> &mut Self {
        self.routes.push(Route::Service(ServiceRoute {
            path: path.to_string(),
            svc,
            catch_all: false,
        }));
        self
    }

    /// 将一个 Service 挂载到前缀下的所有路径
    ///
    /// 内层 Service 看到的是去除前缀后的路径
    pub fn nest_service(&mut self, prefix: &str, svc: HttpSvc) -> &mut Self {
        let prefix = prefix.trim_end_matches('/').to_string();
        let svc = BoxCloneService::new(NestLayer::new(&prefix).layer(svc));
        self.routes.push(Route::Service(ServiceRoute {
            path: prefix,
            svc,
            catch_all: true,
        }));
        self
    }

    /// 合并另一个 Router 的所有路由
    ///
    /// 被合并 Router 的 layers 只作用于它的 Service 路由；
    /// 带 Dependant 的路由保持原样，以便启动阶段仍能改写它们。
    pub fn merge(&mut self, mut other: Router) -> &mut Self {
        let layers = std::mem::take(&mut other.layers);
        warn_dropped_layers("merge", &layers, &other.routes);
        for mut route in other.routes {
            if let Route::Service(r) = &mut route {
                r.svc = apply_layers(r.svc.clone(), &layers);
            }
            self.routes.push(route);
        }
        self
    }

    /// 将另一个 Router 挂载到指定前缀
    ///
    /// 路由路径被改写为 `prefix + path`；Service 路由看到的仍是去除前缀后的路径。
    pub fn nest(&mut self, prefix: &str, mut other: Router) -> &mut Self {
        let prefix = prefix.trim_end_matches('/').to_string();
        let layers = std::mem::take(&mut other.layers);
        warn_dropped_layers("nest", &layers, &other.routes);
        for mut route in other.routes {
            if let Route::Service(r) = &mut route {
                let layered = apply_layers(r.svc.clone(), &layers);
                r.svc = BoxCloneService::new(NestLayer::new(&prefix).layer(layered));
            }
            let path = route.path_mut();
            *path = format!("{}{}", prefix, path);
            self.routes.push(route);
        }
        self
    }

    /// 追加一个中间件 Layer，稍后在 into_tower_service 时顺序应用
    pub fn with_layer<L, B>(&mut self, layer: L) -> &mut Self
    where
        L: Layer<HttpSvc> + Send + Sync + 'static,
        L::Service: Service<Req, Response = Response<B>> + Clone + Send + 'static,
        <L::Service as Service<Req>>::Error: Into<AppError> + Send + Sync + 'static,
        <L::Service as Service<Req>>::Future: Send + 'static,
        B: http_body::Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        self.layers.push(Arc::new(move |svc: HttpSvc| {
            let wrapped = layer.layer(svc);
            let standardized = tower::ServiceBuilder::new()
                .map_response(|resp: Response<B>| {
                    let (parts, body) = resp.into_parts();
                    let body = body.map_err(|e| CoreError::from(e.into())).boxed();
                    Response::from_parts(parts, body)
                })
                .map_err(Into::into)
                .service(wrapped);
            BoxCloneService::new(standardized)
        }));
        self
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn routes_mut(&mut self) -> &mut Vec<Route> {
        &mut self.routes
    }

    /// 将路由器转换为 Tower Service，自动应用之前注册的 Layer
    ///
    /// 路径冲突在这里报告为 [`AppError::RouteConflict`]
    pub fn into_tower_service(mut self) -> AppResult<HttpSvc> {
        let layers = std::mem::take(&mut self.layers);
        let table = RouteTable::compile(self.routes)?;
        let svc: HttpSvc = BoxCloneService::new(RouterSvc::new(table));
        Ok(apply_layers(svc, &layers))
    }

    /// 从可变借用中取出所有权，便于在构建链路中重组 Router
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

fn apply_layers(mut svc: HttpSvc, layers: &[RouterLayer]) -> HttpSvc {
    for apply in layers {
        svc = apply(svc);
    }
    svc
}

fn warn_dropped_layers(op: &str, layers: &[RouterLayer], routes: &[Route]) {
    if !layers.is_empty() && routes.iter().any(|r| r.dependant().is_some()) {
        tracing::warn!(
            op = %op,
            layers = layers.len(),
            "layers of the inner router only wrap its service routes"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Arguments;

    async fn ok(_args: Arguments) -> &'static str {
        "ok"
    }

    #[test]
    fn nest_prefixes_every_route() {
        let mut api = Router::new();
        api.get("/users/{id}", Dependant::new(ok))
            .websocket("/events", Dependant::new(ok));

        let mut router = Router::new();
        router.nest("/api/", api);

        let paths: Vec<&str> = router.routes().iter().map(Route::path).collect();
        assert_eq!(paths, ["/api/users/{id}", "/api/events"]);
        assert!(router.routes()[1].is_websocket());
    }

    #[test]
    fn merge_keeps_dependants_intact() {
        let dependant = Dependant::new(ok).query("q");
        let call = dependant.call.clone().unwrap();
        let mut other = Router::new();
        other.route("GET,POST", "/search", dependant);

        let mut router = Router::new();
        router.merge(other);

        let Route::Http(route) = &router.routes()[0] else {
            panic!("expected an http route");
        };
        assert_eq!(route.methods, vec![Method::GET, Method::POST]);
        assert!(Arc::ptr_eq(route.dependant.call.as_ref().unwrap(), &call));
        assert_eq!(route.dependant.params.len(), 1);
    }

    #[test]
    fn conflicting_paths_are_reported() {
        let mut router = Router::new();
        router
            .get("/users/{id}", Dependant::new(ok))
            .get("/users/{name}", Dependant::new(ok));
        let err = router.into_tower_service().err().unwrap();
        assert!(matches!(err, AppError::RouteConflict { .. }));
    }
}
