use super::context::{ConnectionContext, current_scope};
use super::{AsyncContainer, ContainerError, ScopedContainer};
use crate::error::{AppError, AppResult};
use crate::handler::{
    Arguments, DynEndpoint, Endpoint, EndpointFuture, HttpConnection, InjectedParam,
};
use crate::http::response::into_response::IntoResponse;
use std::sync::Arc;
use wiring_core::Resp;

/// 注入层获取作用域容器的方式
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InjectionMode {
    /// 外层的连接上下文中间件已经发布了作用域，直接使用
    Ambient,
    /// 从参数表中取出当前连接，自行发布连接上下文并打开作用域
    Connection {
        param_name: String,
        /// 连接参数不是 handler 自己声明的，调用前需要移除
        remove_from_arguments: bool,
    },
}

/// 将 Endpoint 包装为"先解析依赖再调用"的形式
#[derive(Clone, Debug)]
pub struct Injector {
    container: AsyncContainer,
    mode: InjectionMode,
}

/// 创建绑定到 `container` 的注入器
pub fn inject_from_container(container: &AsyncContainer, mode: InjectionMode) -> Injector {
    Injector {
        container: container.clone(),
        mode,
    }
}

impl Injector {
    pub fn mode(&self) -> &InjectionMode {
        &self.mode
    }

    pub fn wrap(&self, target: DynEndpoint, params: Vec<InjectedParam>) -> DynEndpoint {
        Arc::new(InjectedEndpoint {
            container: self.container.clone(),
            mode: self.mode.clone(),
            target,
            params: params.into(),
        })
    }
}

struct InjectedEndpoint {
    container: AsyncContainer,
    mode: InjectionMode,
    target: DynEndpoint,
    params: Arc<[InjectedParam]>,
}

impl Endpoint for InjectedEndpoint {
    fn call(&self, args: Arguments) -> EndpointFuture {
        let container = self.container.clone();
        let mode = self.mode.clone();
        let target = self.target.clone();
        let params = self.params.clone();
        Box::pin(async move {
            invoke(container, mode, target, params, args)
                .await
                .unwrap_or_else(IntoResponse::into_response)
        })
    }
}

async fn invoke(
    container: AsyncContainer,
    mode: InjectionMode,
    target: DynEndpoint,
    params: Arc<[InjectedParam]>,
    mut args: Arguments,
) -> AppResult<Resp> {
    match mode {
        InjectionMode::Ambient => {
            let scope = current_scope().ok_or(ContainerError::NoActiveScope)?;
            resolve_into(&scope, &params, &mut args).await?;
            Ok(target.call(args).await)
        }
        InjectionMode::Connection {
            param_name,
            remove_from_arguments,
        } => {
            let connection = connection_argument(&mut args, &param_name, remove_from_arguments)?;
            let scope = container.enter_scope();
            ConnectionContext::new(connection, scope.clone())
                .run_and_close(async {
                    resolve_into(&scope, &params, &mut args).await?;
                    Ok::<_, AppError>(target.call(args).await)
                })
                .await
        }
    }
}

fn connection_argument(
    args: &mut Arguments,
    name: &str,
    remove: bool,
) -> AppResult<HttpConnection> {
    if remove {
        let value = args
            .remove(name)
            .ok_or_else(|| AppError::MissingArgument(name.to_string()))?;
        value
            .downcast::<HttpConnection>()
            .map(|c| (*c).clone())
            .map_err(|_| AppError::MissingArgument(name.to_string()))
    } else {
        args.get::<HttpConnection>(name).map(|c| (*c).clone())
    }
}

async fn resolve_into(
    scope: &ScopedContainer,
    params: &[InjectedParam],
    args: &mut Arguments,
) -> AppResult<()> {
    for param in params {
        let instance = scope.resolve(&param.key).await.inspect_err(|e| {
            tracing::debug!(param = %param.name, service = %param.key, error = %e, "injection failed");
        })?;
        args.insert_value(param.name.clone(), instance);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{ConnectionKind, Dependant};
    use crate::injection::ContainerBuilder;
    use http_body_util::BodyExt;
    use hyper::http::Request;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Greeter(&'static str);

    async fn greet(args: Arguments) -> AppResult<String> {
        let greeter = args.get::<Greeter>("greeter")?;
        let names: Vec<&str> = {
            let mut n: Vec<&str> = args.names().collect();
            n.sort_unstable();
            n
        };
        Ok(format!("{} [{}]", greeter.0, names.join(",")))
    }

    fn connection() -> HttpConnection {
        let (parts, _) = Request::builder().uri("/").body(()).unwrap().into_parts();
        HttpConnection::from_parts(ConnectionKind::Http, &parts)
    }

    async fn body_text(resp: Resp) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8_lossy(&bytes).to_string()
    }

    #[tokio::test]
    async fn connection_mode_strips_synthesized_parameter() {
        let container = ContainerBuilder::new().instance(Greeter("hi")).build();
        let dependant = Dependant::new(greet).inject::<Greeter>("greeter");
        let wrapped = inject_from_container(
            &container,
            InjectionMode::Connection {
                param_name: "_conn".into(),
                remove_from_arguments: true,
            },
        )
        .wrap(dependant.call.clone().unwrap(), dependant.injected_params());

        let mut args = Arguments::new();
        args.insert("_conn", connection());
        assert_eq!(body_text(wrapped.call(args).await).await, "hi [greeter]");
    }

    #[tokio::test]
    async fn ambient_mode_without_context_is_an_injection_error() {
        let container = ContainerBuilder::new().instance(Greeter("hi")).build();
        let dependant = Dependant::new(greet).inject::<Greeter>("greeter");
        let wrapped = inject_from_container(&container, InjectionMode::Ambient)
            .wrap(dependant.call.clone().unwrap(), dependant.injected_params());

        let resp = wrapped.call(Arguments::new()).await;
        assert_eq!(resp.status(), hyper::StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(resp).await.contains("INJECTION_ERROR"));
    }

    #[tokio::test]
    async fn panicking_handler_still_finalizes_its_scope() {
        struct Tx;

        async fn explode(args: Arguments) -> &'static str {
            let _tx = args.get::<Tx>("tx");
            panic!("handler failed")
        }

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
        let dependant = Dependant::new(explode).inject::<Tx>("tx");
        let wrapped = inject_from_container(
            &container,
            InjectionMode::Connection {
                param_name: "_conn".into(),
                remove_from_arguments: true,
            },
        )
        .wrap(dependant.call.clone().unwrap(), dependant.injected_params());

        let mut args = Arguments::new();
        args.insert("_conn", connection());
        let joined = tokio::spawn(async move { wrapped.call(args).await }).await;

        assert!(matches!(joined, Err(e) if e.is_panic()));
        assert_eq!(finalized.load(Ordering::SeqCst), 1);

        container.close().await;
        assert_eq!(finalized.load(Ordering::SeqCst), 1);
    }
}
