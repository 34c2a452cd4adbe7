use crate::{AppError, AppResult};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::util::BoxCloneService;
use tower::{Layer, Service};
use wiring_core::{Req, Resp};

/// 中间件函数返回的 Future 类型
pub type MiddlewareFuture = Pin<Box<dyn Future<Output = AppResult<Resp>> + Send>>;

pub struct Next {
    inner: BoxCloneService<Req, Resp, AppError>,
}

impl Next {
    /// Execute the next middleware or handler
    pub async fn run(mut self, req: Req) -> AppResult<Resp> {
        self.inner.call(req).await
    }
}

/// Use async functions as middleware
///
/// # Example
///
/// ```rust,ignore
/// use wiring::middleware::{middleware_from_fn, Next};
/// use wiring::handler::{Req, Resp};
/// use wiring::AppResult;
///
/// async fn my_middleware(req: Req, next: Next) -> AppResult<Resp> {
///     tracing::info!(path = %req.uri().path(), "incoming");
///     next.run(req).await
/// }
///
/// // router.with_layer(middleware_from_fn(my_middleware));
/// ```
pub fn middleware_from_fn<F>(f: F) -> FromFnLayer<F> {
    FromFnLayer { f }
}

/// Layer created by `middleware_from_fn`
#[derive(Clone, Copy)]
pub struct FromFnLayer<F> {
    f: F,
}

impl<S, F> Layer<S> for FromFnLayer<F>
where
    F: Clone,
    S: Service<Req, Response = Resp, Error = AppError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Service = MiddlewareFromFn<F>;

    fn layer(&self, inner: S) -> Self::Service {
        MiddlewareFromFn {
            f: self.f.clone(),
            inner: BoxCloneService::new(inner),
        }
    }
}

/// Service created by `middleware_from_fn`
#[derive(Clone)]
pub struct MiddlewareFromFn<F> {
    f: F,
    inner: BoxCloneService<Req, Resp, AppError>,
}

impl<F, Fut> Service<Req> for MiddlewareFromFn<F>
where
    F: Fn(Req, Next) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = AppResult<Resp>> + Send + 'static,
{
    type Response = Resp;
    type Error = AppError;
    type Future = Fut;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let next = Next {
            inner: self.inner.clone(),
        };
        (self.f)(req, next)
    }
}
