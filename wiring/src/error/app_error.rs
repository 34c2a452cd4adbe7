use super::error_response::ErrorResponse;
use crate::http::response::into_response::IntoResponse;
use crate::injection::ContainerError;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Response, StatusCode};
use serde_json::json;
use std::convert::Infallible;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use wiring_core::Resp;

tokio::task_local! {
    /// 当前请求的 trace_id，由 RouterSvc 在分发时设置
    pub static TRACE_ID: String;
}

/// 获取当前请求的 trace_id（不在请求上下文中时为 None）
pub fn get_trace_id() -> Option<String> {
    TRACE_ID.try_with(|id| id.clone()).ok()
}

/// 框架统一错误类型
///
/// 所有错误都会被转换为 HTTP 响应，提供一致的错误处理体验
#[derive(Debug)]
pub enum AppError {
    // ============ 客户端错误 (4xx) ============
    /// 400 Bad Request - 请求格式错误或参数不合法
    BadRequest(String),

    /// 404 Not Found - 资源不存在
    NotFound(String),

    // ============ 服务器错误 (5xx) ============
    /// 500 Internal Server Error - 内部错误
    InternalServerError(String),

    /// 503 Service Unavailable - 服务不可用
    ServiceUnavailable(String),

    // ============ 具体错误类型 ============
    /// JSON 解析错误
    JsonParseError(serde_json::Error),

    /// URL 编码解析错误
    UrlEncodedParseError(serde_urlencoded::de::Error),

    /// IO 错误
    IoError(std::io::Error),

    /// handler 读取了一个未提供（或类型不符）的参数
    MissingArgument(String),

    /// 应用状态中缺少必需的条目，例如在 `setup` 之前读取容器
    MissingState(&'static str),

    /// 路由表编译时出现冲突
    RouteConflict { path: String, reason: String },

    /// 依赖解析失败
    Injection(ContainerError),

    // ============ 自定义错误 ============
    /// 自定义错误，允许完全控制状态码和响应内容
    Custom {
        status: StatusCode,
        error_code: String,
        message: String,
        details: Option<serde_json::Value>,
    },
}

impl AppError {
    /// 创建自定义错误
    pub fn custom(
        status: StatusCode,
        error_code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Custom {
            status,
            error_code: error_code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// 获取 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::JsonParseError(_) | Self::UrlEncodedParseError(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InternalServerError(_)
            | Self::IoError(_)
            | Self::MissingArgument(_)
            | Self::MissingState(_)
            | Self::RouteConflict { .. }
            | Self::Injection(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Custom { status, .. } => *status,
        }
    }

    /// 获取错误代码
    pub fn error_code(&self) -> String {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::JsonParseError(_) => "JSON_PARSE_ERROR",
            Self::UrlEncodedParseError(_) => "URL_ENCODED_PARSE_ERROR",
            Self::IoError(_) => "IO_ERROR",
            Self::MissingArgument(_) => "MISSING_ARGUMENT",
            Self::MissingState(_) => "MISSING_STATE",
            Self::RouteConflict { .. } => "ROUTE_CONFLICT",
            Self::Injection(_) => "INJECTION_ERROR",
            Self::Custom { error_code, .. } => return error_code.clone(),
        }
        .to_string()
    }

    /// 获取错误消息
    pub fn message(&self) -> String {
        match self {
            Self::BadRequest(msg)
            | Self::NotFound(msg)
            | Self::InternalServerError(msg)
            | Self::ServiceUnavailable(msg) => msg.clone(),
            Self::JsonParseError(e) => format!("Invalid JSON: {}", e),
            Self::UrlEncodedParseError(e) => format!("Invalid URL encoding: {}", e),
            Self::IoError(e) => format!("IO error: {}", e),
            Self::MissingArgument(name) => format!("Argument '{}' was not provided", name),
            Self::MissingState(slot) => format!("Application state has no '{}'", slot),
            Self::RouteConflict { path, reason } => {
                format!("Route '{}' conflicts: {}", path, reason)
            }
            Self::Injection(e) => e.to_string(),
            Self::Custom { message, .. } => message.clone(),
        }
    }

    /// 获取错误详细信息
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Injection(e) => e.service().map(|service| json!({ "service": service })),
            Self::Custom { details, .. } => details.clone(),
            _ => None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::JsonParseError(e) => Some(e),
            Self::UrlEncodedParseError(e) => Some(e),
            Self::IoError(e) => Some(e),
            Self::Injection(e) => Some(e),
            _ => None,
        }
    }
}

// ============ From 实现：自动转换常见错误类型 ============

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonParseError(err)
    }
}

impl From<serde_urlencoded::de::Error> for AppError {
    fn from(err: serde_urlencoded::de::Error) -> Self {
        Self::UrlEncodedParseError(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err)
    }
}

impl From<ContainerError> for AppError {
    fn from(err: ContainerError) -> Self {
        Self::Injection(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalServerError(err.to_string())
    }
}

impl From<Infallible> for AppError {
    fn from(err: Infallible) -> Self {
        match err {}
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for AppError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::InternalServerError(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Resp {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.message();
        let details = self.details();
        let trace_id = get_trace_id();

        // 记录服务器内部错误（5xx）
        if status.is_server_error() {
            tracing::error!(
                error_code = %error_code,
                message = %message,
                trace_id = ?trace_id,
                "Internal server error"
            );
        }

        let error_response = ErrorResponse {
            status: status.as_u16(),
            error: error_code,
            message,
            details,
            trace_id,
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        };

        let body = serde_json::to_string(&error_response).unwrap_or_else(|_| {
            r#"{"error":"SERIALIZATION_ERROR","message":"Failed to serialize error response"}"#
                .to_string()
        });

        let mut resp = Response::new(Full::new(Bytes::from(body)).map_err(Into::into).boxed());
        *resp.status_mut() = status;
        resp.headers_mut().insert(
            hyper::header::CONTENT_TYPE,
            hyper::header::HeaderValue::from_static("application/json"),
        );
        resp
    }
}
