use crate::error::{AppError, AppResult};
use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 类型擦除后的参数值
pub type ArgValue = Arc<dyn Any + Send + Sync>;

/// 调用 handler 时使用的命名参数表
///
/// 路由分发时由 [`Dependant::solve`](super::Dependant::solve) 根据声明的参数填充，
/// 注入层再把解析出的依赖按参数名写入。
#[derive(Clone, Default)]
pub struct Arguments {
    values: HashMap<String, ArgValue>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一个参数，同名参数会被覆盖
    pub fn insert<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: T) {
        self.values.insert(name.into(), Arc::new(value));
    }

    /// 写入一个已经擦除类型的参数值，返回被覆盖的旧值
    pub fn insert_value(&mut self, name: impl Into<String>, value: ArgValue) -> Option<ArgValue> {
        self.values.insert(name.into(), value)
    }

    /// 读取参数；缺失或类型不符时返回 [`AppError::MissingArgument`]
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> AppResult<Arc<T>> {
        let value = self
            .values
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::MissingArgument(name.to_string()))?;
        value
            .downcast::<T>()
            .map_err(|_| AppError::MissingArgument(format!("{name} ({})", type_name::<T>())))
    }

    /// 读取可选参数（如 query / header），类型不符同样视为缺失
    pub fn get_opt<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.values.get(name).cloned()?.downcast::<T>().ok()
    }

    /// 取出参数的所有权，要求该值没有其它引用
    pub fn take<T: Any + Send + Sync>(&mut self, name: &str) -> AppResult<T> {
        let value = self
            .values
            .remove(name)
            .ok_or_else(|| AppError::MissingArgument(name.to_string()))?;
        let typed = value
            .downcast::<T>()
            .map_err(|_| AppError::MissingArgument(format!("{name} ({})", type_name::<T>())))?;
        Arc::try_unwrap(typed)
            .map_err(|_| AppError::MissingArgument(format!("{name} (still shared)")))
    }

    pub fn remove(&mut self, name: &str) -> Option<ArgValue> {
        self.values.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("Arguments").field("names", &names).finish()
    }
}
