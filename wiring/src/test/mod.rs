//! 进程内测试工具：不经过网络直接驱动编译后的 Service
pub mod test_response;

pub use test_client::{TestClient, TestRequestBuilder};
pub use test_response::TestResponse;
