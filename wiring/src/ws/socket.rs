use crate::http::response::Json;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tungstenite::protocol::{Role, WebSocketConfig};
use tungstenite::{Error, Message, Utf8Bytes};

type WsStream = WebSocketStream<TokioIo<Upgraded>>;

/// 升级完成后的 WebSocket 连接
///
/// 作为 `socket` 参数交给 handler，用 [`Arguments::take`](crate::handler::Arguments::take) 取得所有权。
pub struct WsSocket {
    // Upgraded 不是 Sync，参数表要求 Sync，这里用 Mutex 包一层；
    // 所有方法都走 get_mut，不会真的加锁
    io: Mutex<WsStream>,
}

impl WsSocket {
    pub async fn from_upgraded(upgraded: Upgraded, config: Option<WebSocketConfig>) -> Self {
        let io = WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, config).await;
        Self { io: Mutex::new(io) }
    }

    pub async fn send(&mut self, msg: impl IntoMessage) -> tungstenite::Result<()> {
        self.io.get_mut().send(msg.into_message()).await
    }

    pub async fn next(&mut self) -> Option<Result<Message, Error>> {
        self.io.get_mut().next().await
    }

    pub async fn close(&mut self) -> tungstenite::Result<()> {
        self.io.get_mut().close(None).await
    }
}

pub trait IntoMessage {
    fn into_message(self) -> Message;
}
impl IntoMessage for Message {
    fn into_message(self) -> Message {
        self
    }
}
impl IntoMessage for &str {
    fn into_message(self) -> Message {
        Message::Text(Utf8Bytes::from(self.to_string()))
    }
}
impl IntoMessage for String {
    fn into_message(self) -> Message {
        Message::Text(Utf8Bytes::from(self))
    }
}
impl<T: Serialize> IntoMessage for Json<T> {
    fn into_message(self) -> Message {
        Message::Text(Utf8Bytes::from(
            serde_json::to_string(&self.0).unwrap_or_default(),
        ))
    }
}
impl IntoMessage for Bytes {
    fn into_message(self) -> Message {
        Message::Binary(self)
    }
}
impl IntoMessage for Vec<u8> {
    fn into_message(self) -> Message {
        Message::Binary(self.into())
    }
}
