use super::error::{ContainerError, ContainerResult};
use futures::future::BoxFuture;
use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;

/// 类型擦除后的依赖实例
pub type Instance = Arc<dyn Any + Send + Sync>;

type Factory = Arc<dyn Fn(Resolver) -> BoxFuture<'static, ContainerResult<Instance>> + Send + Sync>;
type Finalizer = Arc<dyn Fn(Instance) -> BoxFuture<'static, ()> + Send + Sync>;

/// 依赖的查找键：类型 + 可选的限定名
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    type_id: TypeId,
    type_name: &'static str,
    qualifier: Option<&'static str>,
}

impl ServiceKey {
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            qualifier: None,
        }
    }

    pub fn named<T: 'static>(qualifier: &'static str) -> Self {
        Self {
            qualifier: Some(qualifier),
            ..Self::of::<T>()
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn qualifier(&self) -> Option<&'static str> {
        self.qualifier
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.qualifier {
            Some(q) => write!(f, "{}[{}]", self.type_name, q),
            None => f.write_str(self.type_name),
        }
    }
}

/// 依赖的生命周期
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifetime {
    /// 整个容器共享一个实例
    Singleton,
    /// 每个作用域（通常是一次请求或一个 WebSocket 会话）一个实例
    Scoped,
    /// 每次解析都创建新实例
    Transient,
}

struct Registration {
    lifetime: Lifetime,
    factory: Factory,
    finalizer: Option<Finalizer>,
    singleton: Option<Arc<OnceCell<Instance>>>,
}

struct Cleanup {
    key: ServiceKey,
    finalizer: Finalizer,
    instance: Instance,
}

/// 需要在关闭时执行的清理任务，按创建顺序入栈
#[derive(Default)]
struct CleanupStack {
    tasks: Mutex<Vec<Cleanup>>,
    closed: AtomicBool,
}

impl CleanupStack {
    /// 登记实例的清理逻辑
    ///
    /// 与 `close` 共用同一把锁判断是否已关闭：关闭之后才创建完成的实例
    /// 立即执行清理，并返回 `Closed`。
    async fn push(
        &self,
        key: &ServiceKey,
        finalizer: &Option<Finalizer>,
        instance: &Instance,
    ) -> ContainerResult<()> {
        let rejected = {
            let mut tasks = lock(&self.tasks);
            if !self.is_closed() {
                if let Some(finalizer) = finalizer {
                    tasks.push(Cleanup {
                        key: key.clone(),
                        finalizer: finalizer.clone(),
                        instance: instance.clone(),
                    });
                }
                return Ok(());
            }
            finalizer.clone()
        };
        if let Some(finalizer) = rejected {
            tracing::debug!(service = %key, "created after close, running finalizer now");
            finalizer(instance.clone()).await;
        }
        Err(ContainerError::Closed)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// 逆序执行清理；只有第一次调用会真正执行
    async fn close(&self) -> usize {
        {
            let _tasks = lock(&self.tasks);
            if self.closed.swap(true, Ordering::AcqRel) {
                return 0;
            }
        }
        let mut count = 0;
        loop {
            let next = lock(&self.tasks).pop();
            let Some(cleanup) = next else { break };
            tracing::debug!(service = %cleanup.key, "running finalizer");
            (cleanup.finalizer)(cleanup.instance).await;
            count += 1;
        }
        count
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 构建 [`AsyncContainer`]
///
/// ```no_run
/// use wiring::injection::{ContainerBuilder, Lifetime};
///
/// struct Config { url: String }
/// struct Db { url: String }
///
/// let container = ContainerBuilder::new()
///     .instance(Config { url: "postgres://localhost".into() })
///     .register(Lifetime::Scoped, |r| async move {
///         let config = r.get::<Config>().await?;
///         Ok::<_, anyhow::Error>(Db { url: config.url.clone() })
///     })
///     .build();
/// ```
#[derive(Default)]
pub struct ContainerBuilder {
    registry: HashMap<ServiceKey, Registration>,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert_entry<T, F, Fut>(mut self, key: ServiceKey, lifetime: Lifetime, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Resolver) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let service = key.type_name();
        let factory: Factory = Arc::new(move |resolver: Resolver| {
            let fut = factory(resolver);
            Box::pin(async move {
                fut.await
                    .map(|v| Arc::new(v) as Instance)
                    .map_err(|source| ContainerError::Factory { service, source })
            }) as BoxFuture<'static, ContainerResult<Instance>>
        });
        let singleton = matches!(lifetime, Lifetime::Singleton).then(|| Arc::new(OnceCell::new()));
        self.registry.insert(
            key,
            Registration {
                lifetime,
                factory,
                finalizer: None,
                singleton,
            },
        );
        self
    }

    /// 注册一个工厂；同一类型重复注册时后者覆盖前者
    pub fn register<T, F, Fut>(self, lifetime: Lifetime, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Resolver) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.insert_entry(ServiceKey::of::<T>(), lifetime, factory)
    }

    pub fn register_named<T, F, Fut>(
        self,
        qualifier: &'static str,
        lifetime: Lifetime,
        factory: F,
    ) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Resolver) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.insert_entry(ServiceKey::named::<T>(qualifier), lifetime, factory)
    }

    pub fn singleton<T, F, Fut>(self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Resolver) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.register(Lifetime::Singleton, factory)
    }

    pub fn scoped<T, F, Fut>(self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Resolver) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.register(Lifetime::Scoped, factory)
    }

    pub fn transient<T, F, Fut>(self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Resolver) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.register(Lifetime::Transient, factory)
    }

    /// 注册一个已经构造好的单例
    pub fn instance<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        let key = ServiceKey::of::<T>();
        let instance: Instance = Arc::new(value);
        let factory: Factory = Arc::new(move |_: Resolver| {
            let instance = instance.clone();
            Box::pin(async move { Ok(instance) }) as BoxFuture<'static, ContainerResult<Instance>>
        });
        self.registry.insert(
            key,
            Registration {
                lifetime: Lifetime::Singleton,
                factory,
                finalizer: None,
                singleton: Some(Arc::new(OnceCell::new())),
            },
        );
        self
    }

    fn set_finalizer(mut self, key: ServiceKey, finalizer: Finalizer) -> Self {
        match self.registry.get_mut(&key) {
            Some(registration) => registration.finalizer = Some(finalizer),
            None => tracing::warn!(service = %key, "finalizer ignored: service is not registered"),
        }
        self
    }

    /// 为已注册的类型附加关闭时执行的清理逻辑
    ///
    /// 清理在实例所属的容器/作用域关闭时按创建的逆序执行。
    pub fn on_close<T, F, Fut>(self, finalizer: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.set_finalizer(ServiceKey::of::<T>(), erase_finalizer(finalizer))
    }

    pub fn on_close_named<T, F, Fut>(self, qualifier: &'static str, finalizer: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.set_finalizer(ServiceKey::named::<T>(qualifier), erase_finalizer(finalizer))
    }

    pub fn build(self) -> AsyncContainer {
        tracing::debug!(services = self.registry.len(), "container built");
        AsyncContainer {
            inner: Arc::new(ContainerInner {
                registry: self.registry,
                cleanup: CleanupStack::default(),
            }),
        }
    }
}

fn erase_finalizer<T, F, Fut>(finalizer: F) -> Finalizer
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |instance: Instance| match instance.downcast::<T>() {
        Ok(typed) => Box::pin(finalizer(typed)) as BoxFuture<'static, ()>,
        Err(_) => Box::pin(async {}),
    })
}

struct ContainerInner {
    registry: HashMap<ServiceKey, Registration>,
    cleanup: CleanupStack,
}

/// 根容器
///
/// 持有全部注册信息与单例；克隆只复制句柄。
#[derive(Clone)]
pub struct AsyncContainer {
    inner: Arc<ContainerInner>,
}

impl AsyncContainer {
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    /// 打开一个新的作用域
    pub fn enter_scope(&self) -> ScopedContainer {
        ScopedContainer {
            root: self.clone(),
            inner: Arc::new(ScopeInner::default()),
        }
    }

    pub fn contains(&self, key: &ServiceKey) -> bool {
        self.inner.registry.contains_key(key)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.cleanup.is_closed()
    }

    /// 两个句柄是否指向同一个容器
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub async fn get<T: Send + Sync + 'static>(&self) -> ContainerResult<Arc<T>> {
        downcast(self.resolve(&ServiceKey::of::<T>()).await?)
    }

    pub async fn get_named<T: Send + Sync + 'static>(
        &self,
        qualifier: &'static str,
    ) -> ContainerResult<Arc<T>> {
        downcast(self.resolve(&ServiceKey::named::<T>(qualifier)).await?)
    }

    pub async fn resolve(&self, key: &ServiceKey) -> ContainerResult<Instance> {
        self.resolve_in(key, None).await
    }

    /// 关闭容器：逆序执行单例的清理逻辑
    ///
    /// 重复调用是安全的，只有第一次生效。
    pub async fn close(&self) {
        let finalized = self.inner.cleanup.close().await;
        tracing::info!(finalized, "container closed");
    }

    async fn resolve_in(
        &self,
        key: &ServiceKey,
        scope: Option<&ScopedContainer>,
    ) -> ContainerResult<Instance> {
        if self.is_closed() {
            return Err(ContainerError::Closed);
        }
        let registration =
            self.inner
                .registry
                .get(key)
                .ok_or_else(|| ContainerError::NotRegistered {
                    service: key.type_name(),
                    qualifier: key.qualifier(),
                })?;

        match registration.lifetime {
            Lifetime::Singleton => {
                let cell = registration
                    .singleton
                    .as_ref()
                    .ok_or(ContainerError::TypeMismatch {
                        service: key.type_name(),
                    })?;
                let instance = cell
                    .get_or_try_init(|| async {
                        let instance =
                            (registration.factory)(Resolver::Root(self.clone())).await?;
                        self.inner
                            .cleanup
                            .push(key, &registration.finalizer, &instance)
                            .await?;
                        Ok::<_, ContainerError>(instance)
                    })
                    .await?;
                Ok(instance.clone())
            }
            Lifetime::Scoped => {
                let scope = scope.ok_or(ContainerError::ScopeMismatch {
                    service: key.type_name(),
                })?;
                if scope.is_closed() {
                    return Err(ContainerError::Closed);
                }
                let cell = lock(&scope.inner.instances)
                    .entry(key.clone())
                    .or_default()
                    .clone();
                let instance = cell
                    .get_or_try_init(|| async {
                        let instance =
                            (registration.factory)(Resolver::Scope(scope.clone())).await?;
                        scope
                            .inner
                            .cleanup
                            .push(key, &registration.finalizer, &instance)
                            .await?;
                        Ok::<_, ContainerError>(instance)
                    })
                    .await?;
                Ok(instance.clone())
            }
            Lifetime::Transient => {
                // 带清理逻辑的瞬态实例只能在作用域内解析
                let scope = match scope {
                    Some(scope) => scope,
                    None if registration.finalizer.is_some() => {
                        return Err(ContainerError::ScopeMismatch {
                            service: key.type_name(),
                        });
                    }
                    None => return (registration.factory)(Resolver::Root(self.clone())).await,
                };
                let instance = (registration.factory)(Resolver::Scope(scope.clone())).await?;
                scope
                    .inner
                    .cleanup
                    .push(key, &registration.finalizer, &instance)
                    .await?;
                Ok(instance)
            }
        }
    }
}

impl fmt::Debug for AsyncContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncContainer")
            .field("services", &self.inner.registry.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[derive(Default)]
struct ScopeInner {
    instances: Mutex<HashMap<ServiceKey, Arc<OnceCell<Instance>>>>,
    cleanup: CleanupStack,
}

/// 作用域容器
///
/// Singleton 从根容器取得；Scoped 在本作用域内缓存；关闭时清理本作用域创建的实例。
#[derive(Clone)]
pub struct ScopedContainer {
    root: AsyncContainer,
    inner: Arc<ScopeInner>,
}

impl ScopedContainer {
    pub fn root(&self) -> &AsyncContainer {
        &self.root
    }

    pub fn is_closed(&self) -> bool {
        self.inner.cleanup.is_closed()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub async fn get<T: Send + Sync + 'static>(&self) -> ContainerResult<Arc<T>> {
        downcast(self.resolve(&ServiceKey::of::<T>()).await?)
    }

    pub async fn get_named<T: Send + Sync + 'static>(
        &self,
        qualifier: &'static str,
    ) -> ContainerResult<Arc<T>> {
        downcast(self.resolve(&ServiceKey::named::<T>(qualifier)).await?)
    }

    pub async fn resolve(&self, key: &ServiceKey) -> ContainerResult<Instance> {
        self.root.resolve_in(key, Some(self)).await
    }

    pub async fn close(&self) {
        let finalized = self.inner.cleanup.close().await;
        lock(&self.inner.instances).clear();
        if finalized > 0 {
            tracing::debug!(finalized, "scope closed");
        }
    }
}

impl fmt::Debug for ScopedContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedContainer")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// 工厂内部用于解析其它依赖的句柄
///
/// Singleton 的工厂拿到的总是根容器，避免把短生命周期的实例捕获进单例。
#[derive(Clone, Debug)]
pub enum Resolver {
    Root(AsyncContainer),
    Scope(ScopedContainer),
}

impl Resolver {
    pub async fn resolve(&self, key: &ServiceKey) -> ContainerResult<Instance> {
        match self {
            Self::Root(container) => container.resolve(key).await,
            Self::Scope(scope) => scope.resolve(key).await,
        }
    }

    pub async fn get<T: Send + Sync + 'static>(&self) -> ContainerResult<Arc<T>> {
        downcast(self.resolve(&ServiceKey::of::<T>()).await?)
    }

    pub async fn get_named<T: Send + Sync + 'static>(
        &self,
        qualifier: &'static str,
    ) -> ContainerResult<Arc<T>> {
        downcast(self.resolve(&ServiceKey::named::<T>(qualifier)).await?)
    }
}

fn downcast<T: Send + Sync + 'static>(instance: Instance) -> ContainerResult<Arc<T>> {
    instance.downcast::<T>().map_err(|_| ContainerError::TypeMismatch {
        service: type_name::<T>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug)]
    struct Counter(usize);
    #[derive(Debug)]
    struct Session(usize);

    fn counting(counter: Arc<AtomicUsize>) -> impl Fn(Resolver) -> BoxFuture<'static, anyhow::Result<Session>> {
        move |_: Resolver| {
            let counter = counter.clone();
            Box::pin(async move { Ok(Session(counter.fetch_add(1, Ordering::SeqCst))) })
                as BoxFuture<'static, anyhow::Result<Session>>
        }
    }

    #[tokio::test]
    async fn lifetimes_control_sharing() {
        let made = Arc::new(AtomicUsize::new(0));
        let container = ContainerBuilder::new()
            .instance(Counter(1))
            .scoped(counting(made.clone()))
            .build();

        let a = container.get::<Counter>().await.unwrap();
        let b = container.enter_scope().get::<Counter>().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let scope = container.enter_scope();
        let s1 = scope.get::<Session>().await.unwrap();
        let s2 = scope.get::<Session>().await.unwrap();
        assert!(Arc::ptr_eq(&s1, &s2));
        let other = container.enter_scope().get::<Session>().await.unwrap();
        assert!(!Arc::ptr_eq(&s1, &other));
        assert_eq!(made.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn scoped_services_need_a_scope() {
        let container = ContainerBuilder::new()
            .scoped(|_| async { Ok(Session(0)) })
            .build();
        let err = container.get::<Session>().await.unwrap_err();
        assert!(matches!(err, ContainerError::ScopeMismatch { .. }));
    }

    #[tokio::test]
    async fn factories_resolve_their_dependencies() {
        let container = ContainerBuilder::new()
            .instance(Counter(41))
            .transient(|r| async move {
                let counter = r.get::<Counter>().await?;
                Ok::<_, anyhow::Error>(Session(counter.0 + 1))
            })
            .build();
        assert_eq!(container.get::<Session>().await.unwrap().0, 42);
    }

    #[tokio::test]
    async fn named_and_missing_services() {
        let container = ContainerBuilder::new()
            .register_named("primary", Lifetime::Singleton, |_| async { Ok(Counter(1)) })
            .build();
        assert_eq!(container.get_named::<Counter>("primary").await.unwrap().0, 1);
        let err = container.get::<Counter>().await.unwrap_err();
        assert!(matches!(err, ContainerError::NotRegistered { qualifier: None, .. }));
    }

    #[tokio::test]
    async fn factory_errors_name_the_service() {
        let container = ContainerBuilder::new()
            .singleton(|_| async { Err::<Counter, _>(anyhow::anyhow!("boom")) })
            .build();
        let err = container.get::<Counter>().await.unwrap_err();
        assert_eq!(err.service(), Some(type_name::<Counter>()));
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn finalizers_run_once_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (l1, l2) = (log.clone(), log.clone());
        let container = ContainerBuilder::new()
            .singleton(|_| async { Ok(Counter(1)) })
            .on_close::<Counter, _, _>(move |c| {
                let log = l1.clone();
                async move { lock(&log).push(format!("counter-{}", c.0)) }
            })
            .singleton(|_| async { Ok(Session(2)) })
            .on_close::<Session, _, _>(move |s| {
                let log = l2.clone();
                async move { lock(&log).push(format!("session-{}", s.0)) }
            })
            .build();

        container.get::<Counter>().await.unwrap();
        container.get::<Session>().await.unwrap();
        container.close().await;
        container.close().await;

        assert_eq!(*lock(&log), vec!["session-2".to_string(), "counter-1".to_string()]);
        assert!(matches!(container.get::<Counter>().await, Err(ContainerError::Closed)));
    }

    #[tokio::test]
    async fn scope_close_only_finalizes_its_own_instances() {
        let closed = Arc::new(AtomicUsize::new(0));
        let c = closed.clone();
        let container = ContainerBuilder::new()
            .scoped(|_| async { Ok(Session(0)) })
            .on_close::<Session, _, _>(move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            })
            .build();

        let scope = container.enter_scope();
        scope.get::<Session>().await.unwrap();
        scope.close().await;
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(scope.get::<Session>().await.is_err());
        assert!(!container.is_closed());
    }

    #[tokio::test]
    async fn finalized_transients_need_a_scope() {
        let closed = Arc::new(AtomicUsize::new(0));
        let c = closed.clone();
        let container = ContainerBuilder::new()
            .transient(|_| async { Ok(Session(0)) })
            .on_close::<Session, _, _>(move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            })
            .build();

        let err = container.get::<Session>().await.unwrap_err();
        assert!(matches!(err, ContainerError::ScopeMismatch { .. }));

        let scope = container.enter_scope();
        scope.get::<Session>().await.unwrap();
        scope.get::<Session>().await.unwrap();
        scope.close().await;
        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn singleton_finished_after_close_is_finalized_immediately() {
        let started = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());
        let closed = Arc::new(AtomicUsize::new(0));
        let (s, r, c) = (started.clone(), release.clone(), closed.clone());
        let container = ContainerBuilder::new()
            .singleton(move |_| {
                let (started, release) = (s.clone(), r.clone());
                async move {
                    started.notify_one();
                    release.notified().await;
                    Ok::<_, anyhow::Error>(Counter(7))
                }
            })
            .on_close::<Counter, _, _>(move |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            })
            .build();

        let pending = tokio::spawn({
            let container = container.clone();
            async move { container.get::<Counter>().await }
        });
        started.notified().await;
        container.close().await;
        assert_eq!(closed.load(Ordering::SeqCst), 0);

        release.notify_one();
        let result = pending.await.unwrap();
        assert!(matches!(result, Err(ContainerError::Closed)));
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }
}
