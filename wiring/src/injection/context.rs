use super::{AsyncContainer, ScopedContainer};
use crate::handler::{ConnectionKind, HttpConnection};
use crate::middleware::{FromFnLayer, MiddlewareFuture, Next, middleware_from_fn};
use crate::ws::toolkit::is_upgrade_request;
use futures::FutureExt;
use std::future::Future;
use std::panic::{AssertUnwindSafe, resume_unwind};
use wiring_core::Req;

tokio::task_local! {
    static CURRENT_CONNECTION: ConnectionContext;
}

/// 环境上下文：当前连接与为它打开的作用域容器
///
/// 通过 task-local 发布，使没有显式接收连接参数的代码也能拿到它们。
#[derive(Clone, Debug)]
pub struct ConnectionContext {
    pub connection: HttpConnection,
    pub scope: ScopedContainer,
}

impl ConnectionContext {
    pub fn new(connection: HttpConnection, scope: ScopedContainer) -> Self {
        Self { connection, scope }
    }

    /// 在该上下文中运行 `fut`
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        CURRENT_CONNECTION.scope(self, fut).await
    }

    /// 在该上下文中运行 `fut`，结束后关闭作用域
    ///
    /// `fut` panic 时先关闭作用域，再继续向上传播 panic。
    pub async fn run_and_close<F: Future>(self, fut: F) -> F::Output {
        let scope = self.scope.clone();
        let outcome = AssertUnwindSafe(self.scope(fut)).catch_unwind().await;
        scope.close().await;
        match outcome {
            Ok(output) => output,
            Err(panic) => resume_unwind(panic),
        }
    }
}

pub fn current_context() -> Option<ConnectionContext> {
    CURRENT_CONNECTION.try_with(Clone::clone).ok()
}

pub fn current_connection() -> Option<HttpConnection> {
    CURRENT_CONNECTION
        .try_with(|ctx| ctx.connection.clone())
        .ok()
}

pub fn current_scope() -> Option<ScopedContainer> {
    CURRENT_CONNECTION.try_with(|ctx| ctx.scope.clone()).ok()
}

/// 为每个请求发布环境上下文的中间件
///
/// 请求进入时打开一个作用域，响应返回后关闭。挂在 Router 上之后，
/// HTTP 路由的注入层直接从环境上下文中取作用域。
/// 该层在路由匹配之前运行，因此这里的连接快照不含路径参数。
pub fn connection_context_layer(
    container: AsyncContainer,
) -> FromFnLayer<impl Fn(Req, Next) -> MiddlewareFuture + Clone + Send + Sync + 'static> {
    middleware_from_fn(move |req: Req, next: Next| {
        let container = container.clone();
        Box::pin(async move {
            let kind = if is_upgrade_request(&req) {
                ConnectionKind::WebSocket
            } else {
                ConnectionKind::Http
            };
            let (parts, body) = req.into_parts();
            let connection = HttpConnection::from_parts(kind, &parts);
            let req = Req::from_parts(parts, body);

            ConnectionContext::new(connection, container.enter_scope())
                .run_and_close(next.run(req))
                .await
        }) as MiddlewareFuture
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injection::ContainerBuilder;
    use hyper::http::Request;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn context_is_visible_only_inside_scope() {
        assert!(current_connection().is_none());

        let container = ContainerBuilder::new().build();
        let (parts, _) = Request::builder().uri("/ping").body(()).unwrap().into_parts();
        let connection = HttpConnection::from_parts(ConnectionKind::Http, &parts);
        let scope = container.enter_scope();

        let seen = ConnectionContext::new(connection.clone(), scope.clone())
            .scope(async {
                let current = current_connection().unwrap();
                let current_scope = current_scope().unwrap();
                current.ptr_eq(&connection) && current_scope.ptr_eq(&scope)
            })
            .await;

        assert!(seen);
        assert!(current_scope().is_none());
    }

    #[tokio::test]
    async fn scope_is_closed_even_if_the_future_panics() {
        struct Tx;

        let finalized = Arc::new(AtomicUsize::new(0));
        let counter = finalized.clone();
        let container = ContainerBuilder::new()
            .scoped(|_| async { Ok::<_, anyhow::Error>(Tx) })
            .on_close::<Tx, _, _>(move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .build();
        let (parts, _) = Request::builder().uri("/tx").body(()).unwrap().into_parts();
        let connection = HttpConnection::from_parts(ConnectionKind::Http, &parts);
        let scope = container.enter_scope();

        let joined = tokio::spawn({
            let scope = scope.clone();
            async move {
                ConnectionContext::new(connection, scope.clone())
                    .run_and_close(async move {
                        scope.get::<Tx>().await.unwrap();
                        panic!("handler failed");
                    })
                    .await
            }
        })
        .await;

        assert!(joined.unwrap_err().is_panic());
        assert!(scope.is_closed());
        assert_eq!(finalized.load(Ordering::SeqCst), 1);
    }
}
