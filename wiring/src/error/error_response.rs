use serde::{Deserialize, Serialize};

/// 标准错误响应结构
///
/// 所有的错误都会被转换为这个统一的格式，方便客户端解析
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP 状态码
    pub status: u16,

    /// 错误类型/代码（大写下划线格式，如 INJECTION_ERROR）
    pub error: String,

    /// 人类可读的错误消息
    pub message: String,

    /// 详细错误信息（可选）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// 请求追踪 ID（可选，用于日志关联）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    /// 错误发生时间戳（Unix 时间戳，秒）
    pub timestamp: u64,
}
