use crate::router::HttpSvc;
use http_body_util::BodyExt;
use hyper::Request;
use hyper::body::Incoming;
use std::convert::Infallible;
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tower::Service;
use wiring_core::{Req, Resp};

/// 将 hyper 的 `Request<Incoming>` 转换为框架内部的 [`Req`]
#[derive(Clone)]
pub struct IncomingToInternal {
    pub inner: HttpSvc,
}

impl Service<Request<Incoming>> for IncomingToInternal {
    type Response = Resp;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Resp, Infallible>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req_incoming: Request<Incoming>) -> Self::Future {
        let mut inner = self.inner.clone();
        Box::pin(async move {
            let req: Req = req_incoming.map(|inc| inc.map_err(Into::into).boxed());
            // RouterSvc 总是把错误渲染为响应，这里只做兜底
            match inner.call(req).await {
                Ok(resp) => Ok(resp),
                Err(err) => Ok(crate::IntoResponse::into_response(err)),
            }
        })
    }
}
