//! Resolver Invocation Adapter
//!
//! Resolvers are plain function values registered against a [`ResolverId`].
//! A resolver may answer synchronously or suspend on its own work; both
//! shapes are normalized into one future-returning function so the flush
//! path awaits them uniformly.

use crate::{BatchError, Resolved, ResolverId};
use futures::future::{self, BoxFuture, FutureExt};
use std::collections::HashSet;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

/// Requirements on a key: hashable for deduplication, debuggable for flush logs.
pub trait BatchKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T> BatchKey for T where T: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

/// Requirements on a value: cloneable so a shared handle can hand it to every waiter.
pub trait BatchValue: Clone + Send + Sync + 'static {}

impl<T> BatchValue for T where T: Clone + Send + Sync + 'static {}

/// Normalized resolver: ordered keys in, awaitable result set out
pub type ResolveFn<K, V> =
    Arc<dyn Fn(Vec<K>) -> BoxFuture<'static, anyhow::Result<Resolved<K, V>>> + Send + Sync>;

/// Adapt a resolver that suspends before producing its results
pub fn from_async<K, V, F, Fut, R>(resolve: F) -> ResolveFn<K, V>
where
    K: BatchKey,
    V: BatchValue,
    F: Fn(Vec<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    R: Into<Resolved<K, V>> + Send,
{
    Arc::new(move |keys: Vec<K>| {
        resolve(keys)
            .map(|result| result.map(Into::<Resolved<K, V>>::into))
            .boxed()
    })
}

/// Adapt a resolver that returns its results directly
pub fn from_sync<K, V, F, R>(resolve: F) -> ResolveFn<K, V>
where
    K: BatchKey,
    V: BatchValue,
    F: Fn(Vec<K>) -> anyhow::Result<R> + Send + Sync + 'static,
    R: Into<Resolved<K, V>>,
{
    Arc::new(move |keys: Vec<K>| {
        future::ready(resolve(keys).map(Into::<Resolved<K, V>>::into)).boxed()
    })
}

/// Align a resolver's result set back to the submitted keys
///
/// Coverage must match exactly: a positional answer needs one value per
/// submitted key, a keyed answer needs exactly the submitted key set. Any
/// mismatch fails the whole group.
///
/// # Returns
/// One value per submitted key, in submission order
pub fn align<K, V>(
    resolver: &ResolverId,
    keys: &[K],
    resolved: Resolved<K, V>,
) -> Result<Vec<V>, BatchError>
where
    K: Eq + Hash,
    V: Clone,
{
    match resolved {
        Resolved::Aligned(values) => {
            if values.len() != keys.len() {
                return Err(BatchError::CoverageMismatch {
                    resolver: resolver.clone(),
                    submitted: keys.len(),
                    missing: keys.len().saturating_sub(values.len()),
                    extra: values.len().saturating_sub(keys.len()),
                });
            }
            Ok(values)
        }
        Resolved::Keyed(values) => {
            let submitted: HashSet<&K> = keys.iter().collect();
            let missing = submitted.iter().filter(|key| !values.contains_key(**key)).count();
            let extra = values.keys().filter(|key| !submitted.contains(key)).count();
            if missing > 0 || extra > 0 {
                return Err(BatchError::CoverageMismatch {
                    resolver: resolver.clone(),
                    submitted: keys.len(),
                    missing,
                    extra,
                });
            }

            // Keys may repeat when deduplication is off, so values are cloned out
            keys.iter()
                .map(|key| {
                    values.get(key).cloned().ok_or_else(|| BatchError::CoverageMismatch {
                        resolver: resolver.clone(),
                        submitted: keys.len(),
                        missing: 1,
                        extra: 0,
                    })
                })
                .collect()
        }
    }
}
