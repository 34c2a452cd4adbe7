//! handler 抽象：动态 Endpoint、命名参数表与签名描述（Dependant）
pub mod arguments;
pub mod connection;
pub mod dependant;
pub mod endpoint;
pub mod path_params;

pub use arguments::{ArgValue, Arguments};
pub use connection::{ConnectionKind, HttpConnection};
pub use dependant::{Dependant, InjectedParam, Param, ParamSource};
pub use endpoint::{DynEndpoint, Endpoint, EndpointFuture};
pub use path_params::PathParams;
pub use wiring_core::{Req, Resp, RespBody};
