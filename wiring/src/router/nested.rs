use crate::AppError;
use hyper::Uri;
use hyper::http::uri::PathAndQuery;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use wiring_core::{Req, Resp};

/// 把请求路径去掉挂载前缀后再交给内层 Service
#[derive(Clone)]
pub struct NestLayer {
    prefix: Arc<str>,
}

impl NestLayer {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: Arc::from(prefix.trim_end_matches('/')),
        }
    }
}

impl<S> Layer<S> for NestLayer {
    type Service = Nested<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Nested {
            prefix: self.prefix.clone(),
            inner,
        }
    }
}

#[derive(Clone)]
pub struct Nested<S> {
    prefix: Arc<str>,
    inner: S,
}

impl<S> Service<Req> for Nested<S>
where
    S: Service<Req, Response = Resp, Error = AppError>,
{
    type Response = Resp;
    type Error = AppError;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Req) -> Self::Future {
        if let Some(uri) = strip_prefix(req.uri(), &self.prefix) {
            *req.uri_mut() = uri;
        }
        self.inner.call(req)
    }
}

fn strip_prefix(uri: &Uri, prefix: &str) -> Option<Uri> {
    let rest = uri.path().strip_prefix(prefix)?;
    let path = if rest.is_empty() { "/" } else { rest };
    if !path.starts_with('/') {
        return None;
    }
    let path_and_query = match uri.query() {
        Some(q) => format!("{}?{}", path, q),
        None => path.to_string(),
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(path_and_query).ok()?);
    Uri::from_parts(parts).ok()
}
