use std::fmt;

pub type ContainerResult<T> = Result<T, ContainerError>;

/// 容器解析依赖时可能出现的错误
#[derive(Debug)]
pub enum ContainerError {
    /// 没有为该类型（及限定名）注册工厂
    NotRegistered {
        service: &'static str,
        qualifier: Option<&'static str>,
    },
    /// 在根容器上解析了需要作用域的依赖（Scoped，或带清理逻辑的 Transient）
    ScopeMismatch { service: &'static str },
    /// 当前任务不在任何连接上下文中
    NoActiveScope,
    /// 容器或作用域已经关闭
    Closed,
    /// 工厂产出的实例类型与请求的类型不一致
    TypeMismatch { service: &'static str },
    /// 工厂执行失败
    Factory {
        service: &'static str,
        source: anyhow::Error,
    },
}

impl ContainerError {
    /// 出错的依赖类型名
    pub fn service(&self) -> Option<&'static str> {
        match self {
            Self::NotRegistered { service, .. }
            | Self::ScopeMismatch { service }
            | Self::TypeMismatch { service }
            | Self::Factory { service, .. } => Some(service),
            Self::NoActiveScope | Self::Closed => None,
        }
    }
}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRegistered {
                service,
                qualifier: Some(q),
            } => write!(f, "no provider registered for {service} (qualifier '{q}')"),
            Self::NotRegistered { service, .. } => {
                write!(f, "no provider registered for {service}")
            }
            Self::ScopeMismatch { service } => {
                write!(f, "{service} can only be resolved inside a scope")
            }
            Self::NoActiveScope => f.write_str("no connection scope is active for this task"),
            Self::Closed => f.write_str("container has been closed"),
            Self::TypeMismatch { service } => {
                write!(f, "provider for {service} returned a different type")
            }
            Self::Factory { service, source } => {
                write!(f, "failed to create {service}: {source}")
            }
        }
    }
}

impl std::error::Error for ContainerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Factory { source, .. } => Some(&**source),
            _ => None,
        }
    }
}
