use crate::error::AppResult;
use crate::http::convert::incoming_to_req::IncomingToInternal;
use crate::router::{HttpSvc, Route, Router};
use self::config::ApplicationConfig;
use futures::future::BoxFuture;
use hyper::Error as HyperError;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto::Builder as AutoBuilder,
    service::TowerToHyperService,
};
use self::state::StateMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub mod config;
pub mod state;

type HookFn = dyn for<'a> Fn(&'a mut Application) -> BoxFuture<'a, AppResult<()>> + Send + Sync;

/// 启动或停机时执行的钩子
///
/// 钩子拿到 `&mut Application`，可以读写状态与路由集合。
#[derive(Clone)]
pub struct LifecycleHook {
    name: &'static str,
    f: Arc<HookFn>,
}

impl LifecycleHook {
    pub fn new<F>(name: &'static str, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Application) -> BoxFuture<'a, AppResult<()>> + Send + Sync + 'static,
    {
        Self {
            name,
            f: Arc::new(f),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn call(&self, app: &mut Application) -> AppResult<()> {
        (self.f)(app).await
    }
}

impl fmt::Debug for LifecycleHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LifecycleHook").field(&self.name).finish()
    }
}

/// 应用程序入口，持有配置、路由集合、应用状态与生命周期钩子
pub struct Application {
    config: ApplicationConfig,
    router: Router,
    state: StateMap,
    on_startup: Vec<LifecycleHook>,
    on_shutdown: Vec<LifecycleHook>,
    started: bool,
    stopped: bool,
}

impl Application {
    /// 使用给定的配置与 Router 构建一个应用实例
    pub fn new(config: ApplicationConfig, router: Router) -> Self {
        Self {
            config,
            router,
            state: StateMap::new(),
            on_startup: Vec::new(),
            on_shutdown: Vec::new(),
            started: false,
            stopped: false,
        }
    }

    /// 使用配置文件/环境变量中的配置构建应用实例，读取失败时使用默认配置
    pub fn new_(router: Router) -> Self {
        let config = ApplicationConfig::load_().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load configuration, using defaults");
            ApplicationConfig::default()
        });
        Self::new(config, router)
    }

    pub fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    pub fn state(&self) -> &StateMap {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut StateMap {
        &mut self.state
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// 路由集合，启动钩子在这里改写 handler
    pub fn routes_mut(&mut self) -> &mut Vec<Route> {
        self.router.routes_mut()
    }

    pub fn on_startup_mut(&mut self) -> &mut Vec<LifecycleHook> {
        &mut self.on_startup
    }

    pub fn on_shutdown_mut(&mut self) -> &mut Vec<LifecycleHook> {
        &mut self.on_shutdown
    }

    pub fn on_startup_hooks(&self) -> &[LifecycleHook] {
        &self.on_startup
    }

    pub fn on_shutdown_hooks(&self) -> &[LifecycleHook] {
        &self.on_shutdown
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// 按顺序执行启动钩子，只会执行一次
    ///
    /// 任一钩子失败时立即返回该错误，后续钩子不再执行。
    pub async fn startup(&mut self) -> AppResult<()> {
        if self.started {
            return Ok(());
        }
        self.started = true;
        let hooks = self.on_startup.clone();
        for hook in &hooks {
            tracing::debug!(hook = hook.name(), "running startup hook");
            hook.call(self).await.inspect_err(|e| {
                tracing::error!(hook = hook.name(), error = %e, "startup hook failed");
            })?;
        }
        tracing::info!(hooks = hooks.len(), "application started");
        Ok(())
    }

    /// 按顺序执行停机钩子，只会执行一次
    ///
    /// 单个钩子失败不会阻止后续钩子，返回第一个错误。
    pub async fn shutdown(&mut self) -> AppResult<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        let hooks = self.on_shutdown.clone();
        let mut first_error = None;
        for hook in &hooks {
            tracing::debug!(hook = hook.name(), "running shutdown hook");
            if let Err(e) = hook.call(self).await {
                tracing::error!(hook = hook.name(), error = %e, "shutdown hook failed");
                first_error.get_or_insert(e);
            }
        }
        tracing::info!(hooks = hooks.len(), "application stopped");
        first_error.map_or(Ok(()), Err)
    }

    /// 把当前路由集合编译为 Tower Service
    pub fn service(&self) -> AppResult<HttpSvc> {
        self.router.clone().into_tower_service()
    }

    /// 运行应用：执行启动钩子，监听配置中的地址，收到 Ctrl+C / SIGTERM 后优雅停机并执行停机钩子
    pub async fn run(self) -> AppResult<()> {
        let addr = format!("{}:{}", self.config.addr, self.config.port);
        let listener = TcpListener::bind(addr).await?;
        self.serve_with_shutdown(listener, shutdown_signal()).await
    }

    /// 在给定的 listener 上服务，直到 `signal` 完成
    pub async fn serve_with_shutdown(
        mut self,
        listener: TcpListener,
        signal: impl Future<Output = ()> + Send,
    ) -> AppResult<()> {
        self.startup().await?;
        let service_handle = match self.service() {
            Ok(svc) => svc,
            Err(e) => {
                self.shutdown().await?;
                return Err(e);
            }
        };
        let executor = TokioExecutor::new();
        // 创建任务跟踪器以管理连接生命周期
        let tracker = TaskTracker::new();
        let shutdown_token = CancellationToken::new();

        if let Ok(local) = listener.local_addr() {
            tracing::info!("listening on {}", local);
        }

        tokio::pin!(signal);
        loop {
            tokio::select! {
                _ = &mut signal => {
                    tracing::info!("shutdown signal received, terminating...");
                    shutdown_token.cancel();
                    break;
                }
                r = listener.accept() => {
                    let (stream, _) = match r {
                        Ok(pair) => pair,
                        Err(err) => {
                            tracing::error!("failed to accept connection: {}", err);
                            continue;
                        }
                    };
                    let io = TokioIo::new(stream);

                    let service_with_conversion = IncomingToInternal {
                        inner: service_handle.clone(),
                    };
                    let hyper_service = TowerToHyperService::new(service_with_conversion);

                    let executor = executor.clone();
                    let shutdown_token = shutdown_token.clone();
                    tracker.spawn(async move {
                        let builder = AutoBuilder::new(executor);
                        let conn = builder.serve_connection_with_upgrades(io, hyper_service);
                        tokio::pin!(conn);
                        let res = tokio::select! {
                            r = conn.as_mut() => r,
                            _ = shutdown_token.cancelled() => {
                                conn.as_mut().graceful_shutdown();
                                conn.await
                            }
                        };
                        if let Err(err) = res {
                            if let Some(hyper_err) = err.downcast_ref::<HyperError>()
                                && hyper_err.is_incomplete_message() {
                                return;
                            }
                            tracing::warn!(error = ?err, "failed to serve connection");
                        }
                    });
                }
            }
        }

        tracker.close();
        tracing::info!(
            "waiting for existing {} connections to close...",
            tracker.len()
        );
        let timeout = Duration::from_secs(self.config.shutdown_timeout_secs);
        match tokio::time::timeout(timeout, tracker.wait()).await {
            Ok(_) => {
                tracing::info!("all connections closed");
            }
            Err(_) => {
                tracing::warn!(
                    "timeout ({:?}) reached, forcing shutdown with {} active connections.",
                    timeout,
                    tracker.len()
                );
            }
        }
        self.shutdown().await
    }
}

#[cfg(feature = "test")]
impl Application {
    /// 执行启动钩子并返回进程内测试客户端
    pub async fn test_client(&mut self) -> AppResult<crate::test::test_client::TestClient> {
        self.startup().await?;
        Ok(crate::test::test_client::TestClient::new(self.service()?))
    }
}

/// 监听终止信号
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
