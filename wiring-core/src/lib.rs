pub mod fast_builder;
pub mod into_method;
pub mod shared;
pub mod utils;

pub use fast_builder::{box_empty_body, box_text_body};
pub use into_method::IntoMethods;
pub use shared::{BoxError, CoreError, Req, ReqBody, Resp, RespBody};
pub use utils::encode_route;
