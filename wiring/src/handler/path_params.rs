/// 路由匹配得到的路径参数（按模板中出现的顺序）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(pub Vec<(String, String)>);

impl<'k, 'v> From<&matchit::Params<'k, 'v>> for PathParams {
    fn from(p: &matchit::Params<'k, 'v>) -> Self {
        Self(
            p.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl PathParams {
    /// 按名称查找
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    pub fn by_index(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(|(_, v)| v.as_str())
    }
}
