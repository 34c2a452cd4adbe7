use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

const SAFE_CHARS: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b':')
    .remove(b'*')
    .remove(b'{')
    .remove(b'}');

/// 对路由模板做百分号编码，保留 `{param}` 与 `{*rest}` 语法
pub fn encode_route(path: &str) -> String {
    utf8_percent_encode(path, SAFE_CHARS).to_string()
}
