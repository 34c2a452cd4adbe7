use crate::error::AppError;
use bytes::Bytes;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Response, StatusCode};
use serde::Serialize;
use wiring_core::{Resp, box_empty_body, box_text_body};

/// 将一个类型转换为 HTTP 响应的通用能力
///
/// handler 的返回值只要实现了该 trait，就可以被框架自动转换为响应。
/// 框架已为 String、&str、Json<T>、Result、()、(StatusCode, T) 等常见类型提供实现。
pub trait IntoResponse {
    fn into_response(self) -> Resp;
}

fn with_content_type(bytes: Bytes, content_type: &'static str) -> Resp {
    let mut resp = Response::new(box_text_body(bytes));
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    resp
}

impl IntoResponse for String {
    fn into_response(self) -> Resp {
        with_content_type(Bytes::from(self), "text/plain; charset=utf-8")
    }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Resp {
        with_content_type(Bytes::from_static(self.as_bytes()), "text/plain; charset=utf-8")
    }
}

/// JSON 响应包装器
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Resp {
        match serde_json::to_vec(&self.0) {
            Ok(body) => with_content_type(Bytes::from(body), "application/json"),
            Err(e) => AppError::from(e).into_response(),
        }
    }
}

/// HTML 响应包装器
///
/// 用于返回 HTML 内容，自动设置 content-type 为 text/html
pub struct Html(pub String);

impl IntoResponse for Html {
    fn into_response(self) -> Resp {
        with_content_type(Bytes::from(self.0), "text/html; charset=utf-8")
    }
}

impl IntoResponse for Resp {
    fn into_response(self) -> Resp {
        self
    }
}

impl IntoResponse for () {
    fn into_response(self) -> Resp {
        Response::new(box_empty_body())
    }
}

impl IntoResponse for StatusCode {
    fn into_response(self) -> Resp {
        let mut resp = Response::new(box_empty_body());
        *resp.status_mut() = self;
        resp
    }
}

impl<T: IntoResponse> IntoResponse for (StatusCode, T) {
    fn into_response(self) -> Resp {
        let mut resp = self.1.into_response();
        *resp.status_mut() = self.0;
        resp
    }
}

impl<T, E> IntoResponse for Result<T, E>
where
    T: IntoResponse,
    E: IntoResponse,
{
    fn into_response(self) -> Resp {
        match self {
            Ok(v) => v.into_response(),
            Err(e) => e.into_response(),
        }
    }
}
