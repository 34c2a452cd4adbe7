use super::{ArgValue, Arguments, ConnectionKind, DynEndpoint, Endpoint, HttpConnection};
use crate::error::{AppError, AppResult};
use crate::injection::ServiceKey;
use bytes::Bytes;
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use wiring_core::Req;

/// 把请求体解码为参数值的函数
pub type BodyDecoder = fn(&Bytes) -> AppResult<ArgValue>;

/// 参数的来源
#[derive(Clone)]
pub enum ParamSource {
    /// 路径参数，值类型为 `String`
    Path,
    /// 查询参数，值类型为 `String`，缺失时不写入
    Query,
    /// 请求头，值类型为 `String`，缺失时不写入
    Header,
    /// 原始请求体 `Bytes`
    Body,
    /// JSON 请求体，解码为声明的类型
    Json(BodyDecoder),
    /// 升级后的 [`WsSocket`](crate::ws::WsSocket)，仅 WebSocket 路由可用
    Socket,
    /// 由容器注入的依赖
    Injected(ServiceKey),
}

impl fmt::Debug for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path => f.write_str("Path"),
            Self::Query => f.write_str("Query"),
            Self::Header => f.write_str("Header"),
            Self::Body => f.write_str("Body"),
            Self::Json(_) => f.write_str("Json"),
            Self::Socket => f.write_str("Socket"),
            Self::Injected(key) => f.debug_tuple("Injected").field(key).finish(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Param {
    pub name: String,
    pub source: ParamSource,
}

/// 需要由容器注入的参数
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InjectedParam {
    pub name: String,
    pub key: ServiceKey,
}

/// handler 的签名描述：被调用的 Endpoint 与它声明的参数
///
/// `http_connection_param_name` 不为空时，框架在调用前把当前连接
/// ([`HttpConnection`]) 以该名称放进参数表。
#[derive(Clone)]
pub struct Dependant {
    pub call: Option<DynEndpoint>,
    pub params: Vec<Param>,
    pub http_connection_param_name: Option<String>,
    pub(crate) injected: bool,
}

impl Dependant {
    pub fn new<E: Endpoint>(endpoint: E) -> Self {
        Self::from_endpoint(Arc::new(endpoint))
    }

    pub fn from_endpoint(endpoint: DynEndpoint) -> Self {
        Self {
            call: Some(endpoint),
            params: Vec::new(),
            http_connection_param_name: None,
            injected: false,
        }
    }

    /// 没有 handler 的描述，路由分发时返回 500
    pub fn empty() -> Self {
        Self {
            call: None,
            params: Vec::new(),
            http_connection_param_name: None,
            injected: false,
        }
    }

    fn param(mut self, name: impl Into<String>, source: ParamSource) -> Self {
        self.params.push(Param {
            name: name.into(),
            source,
        });
        self
    }

    pub fn path(self, name: impl Into<String>) -> Self {
        self.param(name, ParamSource::Path)
    }
    pub fn query(self, name: impl Into<String>) -> Self {
        self.param(name, ParamSource::Query)
    }
    pub fn header(self, name: impl Into<String>) -> Self {
        self.param(name, ParamSource::Header)
    }
    pub fn body(self, name: impl Into<String>) -> Self {
        self.param(name, ParamSource::Body)
    }
    pub fn json<T: DeserializeOwned + Send + Sync + 'static>(self, name: impl Into<String>) -> Self {
        self.param(name, ParamSource::Json(decode_json::<T>))
    }
    pub fn socket(self, name: impl Into<String>) -> Self {
        self.param(name, ParamSource::Socket)
    }

    /// 在签名中声明当前连接参数
    pub fn connection(mut self, name: impl Into<String>) -> Self {
        self.http_connection_param_name = Some(name.into());
        self
    }

    /// 声明一个由容器注入的依赖
    pub fn inject<T: Send + Sync + 'static>(self, name: impl Into<String>) -> Self {
        self.param(name, ParamSource::Injected(ServiceKey::of::<T>()))
    }

    /// 声明一个带限定名的注入依赖
    pub fn inject_named<T: Send + Sync + 'static>(
        self,
        name: impl Into<String>,
        qualifier: &'static str,
    ) -> Self {
        self.param(name, ParamSource::Injected(ServiceKey::named::<T>(qualifier)))
    }

    /// 所有声明为注入的参数
    pub fn injected_params(&self) -> Vec<InjectedParam> {
        self.params
            .iter()
            .filter_map(|p| match &p.source {
                ParamSource::Injected(key) => Some(InjectedParam {
                    name: p.name.clone(),
                    key: key.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// handler 是否已被注入层包装过
    pub fn is_injected(&self) -> bool {
        self.injected
    }

    /// 根据声明从请求中构造参数表
    ///
    /// 注入参数与 socket 参数不在这里提供。
    pub async fn solve(&self, req: Req, kind: ConnectionKind) -> AppResult<Arguments> {
        let (parts, body) = req.into_parts();
        let mut args = Arguments::new();

        let query: HashMap<String, String> =
            if self.params.iter().any(|p| matches!(p.source, ParamSource::Query)) {
                let pairs: Vec<(String, String)> =
                    serde_urlencoded::from_str(parts.uri.query().unwrap_or(""))?;
                let mut map = HashMap::with_capacity(pairs.len());
                for (k, v) in pairs {
                    map.entry(k).or_insert(v);
                }
                map
            } else {
                HashMap::new()
            };

        let needs_body = self
            .params
            .iter()
            .any(|p| matches!(p.source, ParamSource::Body | ParamSource::Json(_)));
        let body = if needs_body {
            body.collect()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read request body: {}", e)))?
                .to_bytes()
        } else {
            Bytes::new()
        };

        let connection = HttpConnection::from_parts(kind, &parts);
        for param in &self.params {
            match &param.source {
                ParamSource::Path => {
                    let value = connection
                        .path_param(&param.name)
                        .ok_or_else(|| AppError::MissingArgument(param.name.clone()))?;
                    args.insert(param.name.clone(), value.to_string());
                }
                ParamSource::Query => {
                    if let Some(value) = query.get(&param.name) {
                        args.insert(param.name.clone(), value.clone());
                    }
                }
                ParamSource::Header => {
                    if let Some(value) = connection.header(&param.name) {
                        args.insert(param.name.clone(), value.to_string());
                    }
                }
                ParamSource::Body => args.insert(param.name.clone(), body.clone()),
                ParamSource::Json(decode) => {
                    args.insert_value(param.name.clone(), decode(&body)?);
                }
                ParamSource::Socket | ParamSource::Injected(_) => {}
            }
        }

        if let Some(name) = &self.http_connection_param_name {
            args.insert(name.clone(), connection);
        }
        Ok(args)
    }
}

impl fmt::Debug for Dependant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependant")
            .field("has_call", &self.call.is_some())
            .field("params", &self.params)
            .field("http_connection_param_name", &self.http_connection_param_name)
            .field("injected", &self.injected)
            .finish()
    }
}

fn decode_json<T: DeserializeOwned + Send + Sync + 'static>(body: &Bytes) -> AppResult<ArgValue> {
    Ok(Arc::new(serde_json::from_slice::<T>(body)?))
}
