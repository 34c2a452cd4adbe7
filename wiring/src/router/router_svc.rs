use super::{HttpSvc, Route, service_methods};
use crate::error::app_error::{TRACE_ID, get_trace_id};
use crate::error::AppResult;
use crate::handler::{ConnectionKind, Dependant, ParamSource, PathParams};
use crate::ws::{WsSocket, is_upgrade_request, upgrade_websocket};
use crate::{AppError, IntoResponse};
use hyper::Method;
use matchit::Router as MRouter;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tower::Service;
use wiring_core::{Req, Resp, encode_route};

enum Target {
    Endpoint(Arc<Dependant>),
    // BoxCloneService 不是 Sync，匹配表需要在多个连接间共享
    Service(Mutex<HttpSvc>),
}

enum Matched {
    Endpoint(Arc<Dependant>, PathParams),
    Service(HttpSvc, PathParams),
}

/// 编译后的匹配表
pub(crate) struct RouteTable {
    http: HashMap<Method, MRouter<Target>>,
    websocket: MRouter<Arc<Dependant>>,
}

impl RouteTable {
    pub(crate) fn compile(routes: Vec<Route>) -> AppResult<Self> {
        let mut table = RouteTable {
            http: HashMap::new(),
            websocket: MRouter::new(),
        };
        for route in routes {
            match route {
                Route::Http(r) => {
                    let dependant = Arc::new(r.dependant);
                    for method in r.methods {
                        table.insert_http(method, &r.path, Target::Endpoint(dependant.clone()))?;
                    }
                }
                Route::WebSocket(r) => {
                    let encoded = encode_route(&r.path);
                    table
                        .websocket
                        .insert(encoded, Arc::new(r.dependant))
                        .map_err(|e| conflict(&r.path, e))?;
                }
                Route::Service(r) => {
                    let paths = if r.catch_all {
                        vec![format!("{}/", r.path), format!("{}/{{*rest}}", r.path)]
                    } else {
                        vec![r.path.clone()]
                    };
                    for method in service_methods() {
                        for path in &paths {
                            table.insert_http(
                                method.clone(),
                                path,
                                Target::Service(Mutex::new(r.svc.clone())),
                            )?;
                        }
                    }
                }
            }
        }
        Ok(table)
    }

    fn insert_http(&mut self, method: Method, path: &str, target: Target) -> AppResult<()> {
        self.http
            .entry(method)
            .or_default()
            .insert(encode_route(path), target)
            .map_err(|e| conflict(path, e))
    }

    fn find(&self, method: &Method, path: &str) -> Option<Matched> {
        let matched = self.http.get(method)?.at(path).ok()?;
        let params = PathParams::from(&matched.params);
        Some(match matched.value {
            Target::Endpoint(d) => Matched::Endpoint(d.clone(), params),
            Target::Service(svc) => Matched::Service(
                svc.lock().unwrap_or_else(PoisonError::into_inner).clone(),
                params,
            ),
        })
    }

    fn find_websocket(&self, path: &str) -> Option<(Arc<Dependant>, PathParams)> {
        let matched = self.websocket.at(path).ok()?;
        Some((matched.value.clone(), PathParams::from(&matched.params)))
    }

    async fn dispatch(&self, mut req: Req) -> AppResult<Resp> {
        let path = req.uri().path().to_string();
        if is_upgrade_request(&req) {
            if let Some((dependant, params)) = self.find_websocket(&path) {
                req.extensions_mut().insert(params);
                return serve_websocket(dependant, req).await;
            }
        }
        match self.find(req.method(), &path) {
            Some(Matched::Endpoint(dependant, params)) => {
                req.extensions_mut().insert(params);
                call_endpoint(&dependant, req).await
            }
            Some(Matched::Service(mut svc, params)) => {
                req.extensions_mut().insert(params);
                svc.call(req).await
            }
            None => Err(AppError::NotFound("404 Not Found".to_string())),
        }
    }
}

fn conflict(path: &str, err: matchit::InsertError) -> AppError {
    AppError::RouteConflict {
        path: path.to_string(),
        reason: err.to_string(),
    }
}

async fn call_endpoint(dependant: &Dependant, req: Req) -> AppResult<Resp> {
    let call = dependant
        .call
        .clone()
        .ok_or_else(|| AppError::InternalServerError("route has no handler".to_string()))?;
    let args = dependant.solve(req, ConnectionKind::Http).await?;
    Ok(call.call(args).await)
}

/// 完成握手后在独立任务中运行 handler，该任务的生命周期就是会话的生命周期
async fn serve_websocket(dependant: Arc<Dependant>, mut req: Req) -> AppResult<Resp> {
    let call = dependant
        .call
        .clone()
        .ok_or_else(|| AppError::InternalServerError("route has no handler".to_string()))?;
    let (resp, on_upgrade) = upgrade_websocket(&mut req)?;
    let mut args = dependant.solve(req, ConnectionKind::WebSocket).await?;
    let socket_param = dependant
        .params
        .iter()
        .find(|p| matches!(p.source, ParamSource::Socket))
        .map(|p| p.name.clone());

    let session = async move {
        let upgraded = match on_upgrade.await {
            Ok(upgraded) => upgraded,
            Err(e) => {
                tracing::warn!(error = %e, "websocket upgrade failed");
                return;
            }
        };
        if let Some(name) = socket_param {
            args.insert(name, WsSocket::from_upgraded(upgraded, None).await);
        }
        let resp = call.call(args).await;
        if !resp.status().is_success() {
            tracing::warn!(status = %resp.status(), "websocket handler finished with an error");
        }
    };
    match get_trace_id() {
        Some(trace_id) => tokio::spawn(TRACE_ID.scope(trace_id, session)),
        None => tokio::spawn(session),
    };
    Ok(resp)
}

/// 路由分发 Service
#[derive(Clone)]
pub struct RouterSvc {
    table: Arc<RouteTable>,
}

impl RouterSvc {
    pub(crate) fn new(table: RouteTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }
}

impl Service<Req> for RouterSvc {
    type Response = Resp;
    type Error = AppError;
    type Future = Pin<Box<dyn Future<Output = Result<Resp, AppError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let table = self.table.clone();
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        // 优先从请求头获取 trace_id，没有则生成新的
        let trace_id = extract_or_generate_trace_id(&req);
        let trace_id_clone = trace_id.clone();

        let start = std::time::Instant::now();

        let task_future = async move {
            tracing::debug!(
                method = %method,
                path = %path,
                trace_id = %trace_id,
                "Request started"
            );
            let resp_result = table.dispatch(req).await;
            let elapsed = start.elapsed();
            match &resp_result {
                Ok(response) => {
                    tracing::debug!(
                        method = %method,
                        path = %path,
                        trace_id = %trace_id,
                        status = %response.status(),
                        elapsed_ms = elapsed.as_millis(),
                        "Request completed"
                    );
                }
                Err(err) => {
                    tracing::debug!(
                        method = %method,
                        path = %path,
                        trace_id = %trace_id,
                        status = %err.status_code(),
                        elapsed_ms = elapsed.as_millis(),
                        err = %err,
                        "Request completed with error"
                    );
                }
            }
            Ok(resp_result.unwrap_or_else(IntoResponse::into_response))
        };
        Box::pin(TRACE_ID.scope(trace_id_clone, task_future))
    }
}

/// 从请求中提取或生成 trace_id
///
/// 按优先级尝试:
/// 1. 从 `x-trace-id` 请求头获取
/// 2. 从 `x-request-id` 请求头获取
/// 3. 生成基于时间戳的 trace_id
fn extract_or_generate_trace_id(req: &Req) -> String {
    req.headers()
        .get("x-trace-id")
        .or_else(|| req.headers().get("x-request-id"))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(generate_trace_id)
}

/// 格式: `trace-{timestamp_micros}-{seq}`
fn generate_trace_id() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static SEQ: AtomicU64 = AtomicU64::new(0);
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros())
        .unwrap_or_default();
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    format!("trace-{:x}-{:x}", timestamp, seq)
}
