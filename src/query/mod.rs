//! Thin adapters between views and the [`QueryClient`]: a read-path handle
//! that fetches on mount, and a mutation runner with success/error hooks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures::future::BoxFuture;
use log::{debug, error, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::cache::{QueryClient, QueryKey, QueryListener, Subscription};
use crate::error::ApiError;

pub type FetchFuture<T> = BoxFuture<'static, Result<T, ApiError>>;
pub type FetchFn<T> = Arc<dyn Fn() -> FetchFuture<T> + Send + Sync>;
pub type MutateFn<V, R> = Arc<dyn Fn(V) -> FetchFuture<R> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefetchOnMount {
    /// Fetch only when the cache has nothing for the key.
    IfEmpty,
    /// Fetch on every mount, keeping the cached value visible meanwhile.
    Always,
}

pub struct QueryOptions<T> {
    key: QueryKey,
    fetch: FetchFn<T>,
    enabled: bool,
    refetch_on_mount: RefetchOnMount,
    auto_refetch: bool,
}

impl<T> QueryOptions<T> {
    pub fn new(key: QueryKey, fetch: impl Fn() -> FetchFuture<T> + Send + Sync + 'static) -> Self {
        Self {
            key,
            fetch: Arc::new(fetch),
            enabled: true,
            refetch_on_mount: RefetchOnMount::IfEmpty,
            auto_refetch: true,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn refetch_on_mount(mut self, mode: RefetchOnMount) -> Self {
        self.refetch_on_mount = mode;
        self
    }

    /// When false, invalidation only marks the handle stale and the owner
    /// decides when to call [`UseQuery::refetch_if_stale`].
    pub fn auto_refetch(mut self, auto: bool) -> Self {
        self.auto_refetch = auto;
        self
    }
}

struct QueryState<T> {
    data: Option<T>,
    error: Option<ApiError>,
    stale: bool,
    fetching: bool,
}

struct QueryInner<T> {
    client: QueryClient,
    key: QueryKey,
    fetch: FetchFn<T>,
    enabled: bool,
    state: Mutex<QueryState<T>>,
}

impl<T> QueryInner<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn state(&self) -> MutexGuard<'_, QueryState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // Success writes through the cache. Failure leaves the cached value alone
    // and marks the handle stale so the next refetch_if_stale retries.
    async fn fetch(&self) -> Result<(), ApiError> {
        self.state().fetching = true;
        let result = (self.fetch)().await;

        match result {
            Ok(value) => {
                {
                    let mut state = self.state();
                    state.fetching = false;
                    state.stale = false;
                    state.error = None;
                    state.data = Some(value.clone());
                }
                if let Err(e) = self.client.set_query_data(&self.key, &value) {
                    error!("Could not cache {}: {}", self.key, e);
                }
                Ok(())
            }
            Err(e) => {
                warn!("Fetching {} failed: {}", self.key, e);
                let mut state = self.state();
                state.fetching = false;
                state.stale = true;
                state.error = Some(e.clone());
                Err(e)
            }
        }
    }
}

struct HandleListener<T> {
    inner: Weak<QueryInner<T>>,
    auto_refetch: bool,
}

impl<T> QueryListener for HandleListener<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn refetch(&self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        inner.state().stale = true;
        if !self.auto_refetch || !inner.enabled {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    let _ = inner.fetch().await;
                });
            }
            Err(_) => warn!("No runtime to refetch {}; left stale", inner.key),
        }
    }

    fn set_data(&self, data: &Value) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        match serde_json::from_value::<T>(data.clone()) {
            Ok(value) => inner.state().data = Some(value),
            Err(e) => debug!("Ignoring value of unexpected shape for {}: {}", inner.key, e),
        }
    }
}

/// A mounted read of one key. Dropping it unsubscribes.
pub struct UseQuery<T> {
    inner: Arc<QueryInner<T>>,
    subscription: Subscription,
}

impl<T> UseQuery<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Subscribes, then fetches if the key is empty or the options ask for it.
    pub async fn mount(client: &QueryClient, options: QueryOptions<T>) -> Self {
        let cached = client.get_query_data::<T>(&options.key);
        let should_fetch = options.enabled
            && (cached.is_none() || options.refetch_on_mount == RefetchOnMount::Always);

        let inner = Arc::new(QueryInner {
            client: client.clone(),
            key: options.key,
            fetch: options.fetch,
            enabled: options.enabled,
            state: Mutex::new(QueryState {
                data: cached,
                error: None,
                stale: false,
                fetching: false,
            }),
        });
        let listener = HandleListener {
            inner: Arc::downgrade(&inner),
            auto_refetch: options.auto_refetch,
        };
        // subscribe before fetching so writes made meanwhile are not missed
        let subscription = client.subscribe(&inner.key, Arc::new(listener));

        if should_fetch {
            let _ = inner.fetch().await;
        }

        Self { inner, subscription }
    }

    pub fn key(&self) -> &QueryKey {
        &self.inner.key
    }

    pub fn data(&self) -> Option<T> {
        self.inner.state().data.clone()
    }

    pub fn error(&self) -> Option<ApiError> {
        self.inner.state().error.clone()
    }

    pub fn is_stale(&self) -> bool {
        self.inner.state().stale
    }

    pub fn is_fetching(&self) -> bool {
        self.inner.state().fetching
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled
    }

    pub async fn refetch(&self) -> Result<(), ApiError> {
        if !self.inner.enabled {
            return Ok(());
        }
        self.inner.fetch().await
    }

    /// Fetches only after an invalidation or a failed fetch.
    pub async fn refetch_if_stale(&self) -> Result<bool, ApiError> {
        if !self.is_stale() {
            return Ok(false);
        }
        self.refetch().await.map(|_| true)
    }

    pub fn unmount(mut self) {
        self.subscription.unsubscribe();
    }
}

type MutateHook<V> = Box<dyn Fn(&V) + Send + Sync>;
type SuccessHook<R> = Box<dyn Fn(&R) + Send + Sync>;
type ErrorHook = Box<dyn Fn(&ApiError) + Send + Sync>;

/// Runs a server mutation, then its success hooks (usually cache
/// invalidations) or its error hooks. Never retries.
pub struct Mutation<V, R> {
    mutate_fn: MutateFn<V, R>,
    map_error: Option<Box<dyn Fn(ApiError) -> ApiError + Send + Sync>>,
    on_mutate: Vec<MutateHook<V>>,
    on_success: Vec<SuccessHook<R>>,
    on_error: Vec<ErrorHook>,
    loading: AtomicBool,
}

impl<V, R> Mutation<V, R> {
    pub fn new(mutate_fn: impl Fn(V) -> FetchFuture<R> + Send + Sync + 'static) -> Self {
        Self {
            mutate_fn: Arc::new(mutate_fn),
            map_error: None,
            on_mutate: Vec::new(),
            on_success: Vec::new(),
            on_error: Vec::new(),
            loading: AtomicBool::new(false),
        }
    }

    /// Runs before the request is sent; used for optimistic cache patches.
    pub fn on_mutate(mut self, hook: impl Fn(&V) + Send + Sync + 'static) -> Self {
        self.on_mutate.push(Box::new(hook));
        self
    }

    pub fn on_success(mut self, hook: impl Fn(&R) + Send + Sync + 'static) -> Self {
        self.on_success.push(Box::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&ApiError) + Send + Sync + 'static) -> Self {
        self.on_error.push(Box::new(hook));
        self
    }

    pub fn map_error(mut self, f: impl Fn(ApiError) -> ApiError + Send + Sync + 'static) -> Self {
        self.map_error = Some(Box::new(f));
        self
    }

    pub fn invalidates(self, client: &QueryClient, prefix: QueryKey) -> Self {
        let client = client.clone();
        self.on_success(move |_| client.invalidate_queries(&prefix))
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub async fn mutate(&self, vars: V) -> Result<R, ApiError> {
        for hook in &self.on_mutate {
            hook(&vars);
        }
        self.loading.store(true, Ordering::SeqCst);
        let result = (self.mutate_fn)(vars).await;
        self.loading.store(false, Ordering::SeqCst);

        // no retry: the caller decides what a failure means
        match result {
            Ok(data) => {
                for hook in &self.on_success {
                    hook(&data);
                }
                Ok(data)
            }
            Err(e) => {
                let e = match &self.map_error {
                    Some(f) => f(e),
                    None => e,
                };
                for hook in &self.on_error {
                    hook(&e);
                }
                Err(e)
            }
        }
    }
}
