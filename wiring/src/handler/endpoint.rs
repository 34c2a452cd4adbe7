use super::Arguments;
use crate::http::response::into_response::IntoResponse;
use std::pin::Pin;
use std::sync::Arc;
use wiring_core::Resp;

pub type EndpointFuture = Pin<Box<dyn Future<Output = Resp> + Send>>;

/// 通用处理器接口
///
/// 框架以命名参数表 [`Arguments`] 调用 handler；普通 async 函数
/// `async fn(Arguments) -> impl IntoResponse` 自动实现此 trait。
pub trait Endpoint: Send + Sync + 'static {
    fn call(&self, args: Arguments) -> EndpointFuture;
}

impl<F, Fut, Res> Endpoint for F
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Res> + Send + 'static,
    Res: IntoResponse,
{
    fn call(&self, args: Arguments) -> EndpointFuture {
        let fut = self(args);
        Box::pin(async move { fut.await.into_response() })
    }
}

/// 动态处理器对象
pub type DynEndpoint = Arc<dyn Endpoint>;
