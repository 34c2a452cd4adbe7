use crate::error::ErrorResponse;
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use wiring_core::Resp;

/// 已收集完响应体的响应
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub async fn from_response(resp: Resp) -> Self {
        let (parts, body) = resp.into_parts();
        let body = body
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        Self {
            status: parts.status,
            headers: parts.headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    #[track_caller]
    pub fn json<T: DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).unwrap_or_else(|e| {
            panic!(
                "Failed to deserialize response\nerror={:?}\nbody={}",
                e,
                self.text()
            )
        })
    }

    /// 框架错误响应
    #[track_caller]
    pub fn error(&self) -> ErrorResponse {
        self.json()
    }

    #[track_caller]
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "unexpected status, body={}",
            self.text()
        );
        self
    }

    #[track_caller]
    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    #[track_caller]
    pub fn assert_text(&self, expected: &str) -> &Self {
        assert_eq!(self.text(), expected, "Response text does not match");
        self
    }

    /// 断言为框架错误响应，且错误码一致
    #[track_caller]
    pub fn assert_error_code(&self, expected: &str) -> &Self {
        assert_eq!(self.error().error, expected, "body={}", self.text());
        self
    }
}
