use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 以类型为键的应用状态表
///
/// 每个类型最多一个条目；集成层用自己的槽位类型避免与用户状态冲突。
#[derive(Default, Clone)]
pub struct StateMap {
    entries: HashMap<TypeId, (&'static str, Arc<dyn Any + Send + Sync>)>,
}

impl StateMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入状态，返回被替换的旧值
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<Arc<T>> {
        self.entries
            .insert(TypeId::of::<T>(), (type_name::<T>(), Arc::new(value)))
            .and_then(|(_, old)| old.downcast::<T>().ok())
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|(_, v)| v.clone().downcast::<T>().ok())
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<Arc<T>> {
        self.entries
            .remove(&TypeId::of::<T>())
            .and_then(|(_, v)| v.downcast::<T>().ok())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for StateMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.entries.values().map(|(name, _)| *name).collect();
        names.sort_unstable();
        f.debug_struct("StateMap").field("entries", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Version(u32);

    #[test]
    fn one_entry_per_type() {
        let mut state = StateMap::new();
        assert!(state.insert(Version(1)).is_none());
        assert_eq!(*state.insert(Version(2)).unwrap(), Version(1));
        assert_eq!(*state.get::<Version>().unwrap(), Version(2));
        assert_eq!(state.len(), 1);
        assert!(state.remove::<Version>().is_some());
        assert!(!state.contains::<Version>());
    }
}
