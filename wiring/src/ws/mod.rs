//! WebSocket 握手与连接封装
pub mod socket;
pub mod toolkit;

pub use socket::{IntoMessage, WsSocket};
pub use toolkit::{is_upgrade_request, upgrade_websocket};
