use crate::shared::RespBody;
use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full};

/// 空响应体
pub fn box_empty_body() -> RespBody {
    Empty::new().map_err(Into::into).boxed()
}

/// 纯文本响应体
pub fn box_text_body(text: impl Into<Bytes>) -> RespBody {
    let bytes: Bytes = text.into();
    Full::new(bytes).map_err(Into::into).boxed()
}
