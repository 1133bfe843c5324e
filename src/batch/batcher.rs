//! Batcher Module
//!
//! The public entry point of the engine. A `Batcher` is the explicit
//! execution context that owns the resolver registry, the flush scheduler
//! and the engine counters. Clones share all of it.
//!
//! # Request Flow
//! 1. `gen` / `enqueue` adds the key to the resolver's group in the registry
//! 2. The scheduler arms a deferred round (once per window)
//! 3. The caller suspends on its handle
//! 4. The round flushes every pending group: one resolver call per group
//! 5. Handles settle and suspended callers resume, possibly enqueuing again

use super::handle::Handle;
use super::resolver::{from_async, from_sync, BatchKey, BatchValue, ResolveFn};
use crate::{
    config::BatchConfig,
    registry::Registry,
    scheduler::Scheduler,
    types::StatsCounters,
    BatchError, BatchStats, ContextId, Resolved, ResolverId,
};
use futures::future::try_join_all;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::runtime::{Handle as RuntimeHandle, RuntimeFlavor};

struct BatcherInner {
    config: BatchConfig,
    registry: Arc<Registry>,
    scheduler: Scheduler,
    stats: Arc<StatsCounters>,
}

/// Batch-coalescing engine
///
/// All requests issued without an intervening suspension land in the same
/// window and reach each resolver as a single invocation.
#[derive(Clone)]
pub struct Batcher {
    inner: Arc<BatcherInner>,
}

impl Batcher {
    /// Creates a new batcher with no registered resolvers
    ///
    /// # Arguments
    /// * `config` - Deduplication and flush-delay settings
    pub fn new(config: BatchConfig) -> Self {
        let registry = Arc::new(Registry::new());
        let stats = Arc::new(StatsCounters::default());
        let scheduler = Scheduler::new(registry.clone(), stats.clone(), config.flush_delay());

        Self {
            inner: Arc::new(BatcherInner {
                config,
                registry,
                scheduler,
                stats,
            }),
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.inner.config
    }

    /// Register an already normalized resolve function under `id`
    pub fn register<K, V>(
        &self,
        id: impl Into<ResolverId>,
        resolve: ResolveFn<K, V>,
    ) -> Result<Loader<K, V>, BatchError>
    where
        K: BatchKey,
        V: BatchValue,
    {
        let id = id.into();
        self.inner.registry.register(id.clone(), resolve)?;
        Ok(Loader {
            batcher: self.clone(),
            id,
            _types: PhantomData,
        })
    }

    /// Register a resolver that suspends before producing its results
    ///
    /// The resolver may answer with a `Vec<V>` parallel to its input keys
    /// or with a `HashMap<K, V>`.
    pub fn register_async<K, V, F, Fut, R>(
        &self,
        id: impl Into<ResolverId>,
        resolve: F,
    ) -> Result<Loader<K, V>, BatchError>
    where
        K: BatchKey,
        V: BatchValue,
        F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<Resolved<K, V>> + Send,
    {
        self.register(id, from_async(resolve))
    }

    /// Register a resolver that returns its results directly
    pub fn register_sync<K, V, F, R>(
        &self,
        id: impl Into<ResolverId>,
        resolve: F,
    ) -> Result<Loader<K, V>, BatchError>
    where
        K: BatchKey,
        V: BatchValue,
        F: Fn(Vec<K>) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Into<Resolved<K, V>>,
    {
        self.register(id, from_sync(resolve))
    }

    /// Enqueue one key against resolver `id`
    ///
    /// Misuse (no runtime, a multi-thread runtime, unknown resolver, wrong
    /// types) fails here, at the call site, instead of at flush time. Only a
    /// current-thread runtime guarantees that the round task cannot run
    /// while the caller is still enqueuing.
    ///
    /// # Returns
    /// The handle that settles when the resolver's group flushes
    pub fn enqueue<K, V>(&self, id: &ResolverId, key: K) -> Result<Handle<V>, BatchError>
    where
        K: BatchKey,
        V: BatchValue,
    {
        let runtime = RuntimeHandle::try_current().map_err(|_| BatchError::NoRuntime)?;
        let flavor = runtime.runtime_flavor();
        if flavor != RuntimeFlavor::CurrentThread {
            return Err(BatchError::UnsupportedRuntime {
                flavor: format!("{:?}", flavor),
            });
        }

        let context = ContextId::current();
        let (handle, merged) = self.inner.registry.enqueue::<K, V>(
            context,
            id,
            key,
            self.inner.config.dedupe_keys,
        )?;

        StatsCounters::bump(&self.inner.stats.requests, 1);
        if merged {
            StatsCounters::bump(&self.inner.stats.deduplicated, 1);
        }
        self.inner.scheduler.arm(context, &runtime);
        Ok(handle)
    }

    /// Request the value for `key` from resolver `id`
    pub async fn gen<K, V>(&self, id: &ResolverId, key: K) -> Result<V, BatchError>
    where
        K: BatchKey,
        V: BatchValue,
    {
        self.enqueue::<K, V>(id, key)?.await
    }

    /// Request the values for several keys from resolver `id`
    ///
    /// Every key is enqueued before suspending, so all of them share one
    /// window. Values come back in the order of `keys`; the first failure wins.
    pub async fn genv<K, V>(
        &self,
        id: &ResolverId,
        keys: impl IntoIterator<Item = K>,
    ) -> Result<Vec<V>, BatchError>
    where
        K: BatchKey,
        V: BatchValue,
    {
        let handles = keys
            .into_iter()
            .map(|key| self.enqueue::<K, V>(id, key))
            .collect::<Result<Vec<_>, _>>()?;
        try_join_all(handles).await
    }

    pub fn is_registered(&self, id: &ResolverId) -> bool {
        self.inner.registry.is_registered(id)
    }

    /// Groups still waiting for a flush round.
    pub fn pending_groups(&self) -> usize {
        self.inner.registry.pending_groups()
    }

    pub fn stats(&self) -> BatchStats {
        self.inner.stats.snapshot()
    }
}

/// Typed access to one registered resolver
///
/// Returned by registration; stands in for per-resolver class methods.
pub struct Loader<K, V> {
    batcher: Batcher,
    id: ResolverId,
    _types: PhantomData<fn(K) -> V>,
}

impl<K, V> Clone for Loader<K, V> {
    fn clone(&self) -> Self {
        Self {
            batcher: self.batcher.clone(),
            id: self.id.clone(),
            _types: PhantomData,
        }
    }
}

impl<K, V> Loader<K, V>
where
    K: BatchKey,
    V: BatchValue,
{
    pub fn id(&self) -> &ResolverId {
        &self.id
    }

    pub fn batcher(&self) -> &Batcher {
        &self.batcher
    }

    pub fn enqueue(&self, key: K) -> Result<Handle<V>, BatchError> {
        self.batcher.enqueue(&self.id, key)
    }

    pub async fn gen(&self, key: K) -> Result<V, BatchError> {
        self.batcher.gen(&self.id, key).await
    }

    pub async fn genv(&self, keys: impl IntoIterator<Item = K>) -> Result<Vec<V>, BatchError> {
        self.batcher.genv(&self.id, keys).await
    }
}
