use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::{Request, Response};
use std::fmt;

/// 请求体/响应体统一使用的错误类型
pub struct CoreError(pub Box<dyn std::error::Error + Send + Sync + 'static>);

impl fmt::Debug for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<Box<dyn std::error::Error + Send + Sync + 'static>> for CoreError {
    fn from(err: Box<dyn std::error::Error + Send + Sync + 'static>) -> Self {
        CoreError(err)
    }
}

impl From<std::convert::Infallible> for CoreError {
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}

impl From<hyper::Error> for CoreError {
    fn from(err: hyper::Error) -> Self {
        CoreError(Box::new(err))
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError(Box::new(err))
    }
}

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type RespBody = BoxBody<Bytes, CoreError>;
pub type ReqBody = BoxBody<Bytes, CoreError>;
pub type Resp = Response<RespBody>;
pub type Req = Request<ReqBody>;
