//! 异步依赖容器、环境连接上下文与 handler 注入包装
pub mod container;
pub mod context;
pub mod error;
pub mod inject;

pub use container::{
    AsyncContainer, ContainerBuilder, Instance, Lifetime, Resolver, ScopedContainer, ServiceKey,
};
pub use context::{
    ConnectionContext, connection_context_layer, current_connection, current_context,
    current_scope,
};
pub use error::{ContainerError, ContainerResult};
pub use inject::{InjectionMode, Injector, inject_from_container};
