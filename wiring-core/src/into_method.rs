use std::str::FromStr;

use hyper::Method;

/// 可以转换为一组 HTTP 方法的类型，如 `"GET,POST"`、`Method::GET`
pub trait IntoMethods {
    fn into_methods(self) -> Vec<Method>;
}

/// 无法识别的方法名会被忽略
impl IntoMethods for &str {
    fn into_methods(self) -> Vec<Method> {
        self.split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .filter_map(|m| Method::from_str(&m.to_ascii_uppercase()).ok())
            .collect()
    }
}

impl IntoMethods for Vec<Method> {
    fn into_methods(self) -> Vec<Method> {
        self
    }
}

impl IntoMethods for Method {
    fn into_methods(self) -> Vec<Method> {
        vec![self]
    }
}

impl IntoMethods for &[Method] {
    fn into_methods(self) -> Vec<Method> {
        self.to_vec()
    }
}
