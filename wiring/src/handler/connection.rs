use super::PathParams;
use hyper::http::request::Parts;
use hyper::{HeaderMap, Method, Uri, Version};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionKind {
    Http,
    WebSocket,
}

/// 当前连接（HTTP 请求或 WebSocket 握手）的只读快照
///
/// 克隆开销很小，可以放进参数表或环境上下文。
#[derive(Clone, Debug)]
pub struct HttpConnection {
    inner: Arc<ConnectionInner>,
}

#[derive(Debug)]
struct ConnectionInner {
    kind: ConnectionKind,
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    path_params: PathParams,
}

impl HttpConnection {
    pub fn from_parts(kind: ConnectionKind, parts: &Parts) -> Self {
        let path_params = parts
            .extensions
            .get::<PathParams>()
            .cloned()
            .unwrap_or_default();
        Self {
            inner: Arc::new(ConnectionInner {
                kind,
                method: parts.method.clone(),
                uri: parts.uri.clone(),
                version: parts.version,
                headers: parts.headers.clone(),
                path_params,
            }),
        }
    }

    pub fn kind(&self) -> ConnectionKind {
        self.inner.kind
    }
    pub fn is_websocket(&self) -> bool {
        self.inner.kind == ConnectionKind::WebSocket
    }
    pub fn method(&self) -> &Method {
        &self.inner.method
    }
    pub fn uri(&self) -> &Uri {
        &self.inner.uri
    }
    pub fn path(&self) -> &str {
        self.inner.uri.path()
    }
    pub fn query(&self) -> Option<&str> {
        self.inner.uri.query()
    }
    pub fn version(&self) -> Version {
        self.inner.version
    }
    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }
    /// 读取一个可按 UTF-8 解释的请求头
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers.get(name).and_then(|v| v.to_str().ok())
    }
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.inner.path_params.get(name)
    }
    pub fn path_params(&self) -> &PathParams {
        &self.inner.path_params
    }

    /// 两个句柄是否指向同一个连接
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
