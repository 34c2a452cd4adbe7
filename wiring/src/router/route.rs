use super::HttpSvc;
use crate::handler::Dependant;
use hyper::Method;
use std::fmt;

/// 路由集合中的一项
///
/// 只有 `Http` 与 `WebSocket` 带有 [`Dependant`]，注入层只会改写这两类路由。
#[derive(Clone, Debug)]
pub enum Route {
    /// 直接挂载的 tower Service，没有参数描述
    Service(ServiceRoute),
    Http(HttpRoute),
    WebSocket(WebSocketRoute),
}

#[derive(Clone)]
pub struct ServiceRoute {
    pub path: String,
    pub svc: HttpSvc,
    /// 挂载在前缀下，匹配前缀自身以及它下面的所有路径
    pub catch_all: bool,
}

#[derive(Clone, Debug)]
pub struct HttpRoute {
    pub path: String,
    pub methods: Vec<Method>,
    pub dependant: Dependant,
}

#[derive(Clone, Debug)]
pub struct WebSocketRoute {
    pub path: String,
    pub dependant: Dependant,
}

impl Route {
    pub fn path(&self) -> &str {
        match self {
            Route::Service(r) => &r.path,
            Route::Http(r) => &r.path,
            Route::WebSocket(r) => &r.path,
        }
    }

    pub(crate) fn path_mut(&mut self) -> &mut String {
        match self {
            Route::Service(r) => &mut r.path,
            Route::Http(r) => &mut r.path,
            Route::WebSocket(r) => &mut r.path,
        }
    }

    pub fn dependant(&self) -> Option<&Dependant> {
        match self {
            Route::Service(_) => None,
            Route::Http(r) => Some(&r.dependant),
            Route::WebSocket(r) => Some(&r.dependant),
        }
    }

    pub fn dependant_mut(&mut self) -> Option<&mut Dependant> {
        match self {
            Route::Service(_) => None,
            Route::Http(r) => Some(&mut r.dependant),
            Route::WebSocket(r) => Some(&mut r.dependant),
        }
    }

    pub fn is_websocket(&self) -> bool {
        matches!(self, Route::WebSocket(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Route::Service(_) => "service",
            Route::Http(_) => "http",
            Route::WebSocket(_) => "websocket",
        }
    }
}

impl fmt::Debug for ServiceRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRoute")
            .field("path", &self.path)
            .field("catch_all", &self.catch_all)
            .finish()
    }
}
