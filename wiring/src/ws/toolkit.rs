use crate::error::{AppError, AppResult};
use hyper::header::{CONNECTION, HeaderValue, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_VERSION, UPGRADE};
use hyper::{Response, StatusCode, upgrade::OnUpgrade};
use wiring_core::{Req, Resp, box_empty_body};

/// 执行协议握手，返回 101 Switching Protocols 响应与升级句柄
pub fn upgrade_websocket(req: &mut Req) -> AppResult<(Resp, OnUpgrade)> {
    let key = req
        .headers()
        .get(SEC_WEBSOCKET_KEY)
        .ok_or_else(|| AppError::BadRequest("missing Sec-WebSocket-Key header".to_string()))?;
    if req
        .headers()
        .get(SEC_WEBSOCKET_VERSION)
        .map(|v| v.as_bytes())
        != Some(b"13")
    {
        return Err(AppError::BadRequest(
            "unsupported Sec-WebSocket-Version, expected 13".to_string(),
        ));
    }
    let accept = tungstenite::handshake::derive_accept_key(key.as_bytes());
    let accept = HeaderValue::from_str(&accept)
        .map_err(|e| AppError::InternalServerError(format!("invalid accept key: {}", e)))?;

    let mut resp = Response::new(box_empty_body());
    *resp.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = resp.headers_mut();
    headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(SEC_WEBSOCKET_ACCEPT, accept);

    let on_upgrade = hyper::upgrade::on(req);
    Ok((resp, on_upgrade))
}

/// 判断请求是否为 WebSocket 升级请求
pub fn is_upgrade_request<B>(request: &hyper::Request<B>) -> bool {
    header_contains_value(request.headers(), CONNECTION, "Upgrade")
        && header_contains_value(request.headers(), UPGRADE, "websocket")
}

fn header_contains_value(
    headers: &hyper::HeaderMap,
    header: impl hyper::header::AsHeaderName,
    value: impl AsRef<[u8]>,
) -> bool {
    let value = value.as_ref();
    headers.get_all(header).iter().any(|header| {
        header
            .as_bytes()
            .split(|&c| c == b',')
            .any(|x| x.trim_ascii().eq_ignore_ascii_case(value))
    })
}
