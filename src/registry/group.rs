//! Batch Group Module
//!
//! A batch group is the pending, not-yet-flushed request set for one
//! resolver. It lives for exactly one accumulation window: created on the
//! first enqueue, consumed whole by the flush that settles it.

use crate::{
    batch::{align, BatchKey, BatchValue, Completer, Handle, ResolveFn},
    types::StatsCounters,
    BatchError, ResolverId,
};
use futures::future::{BoxFuture, FutureExt};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of flushing one group, reported back to the scheduler
#[derive(Debug, Clone)]
pub struct FlushReport {
    pub resolver: ResolverId,
    pub key_count: usize,
    pub error: Option<BatchError>,
}

/// Type-erased view of a [`BatchGroup`]
///
/// The registry holds groups for resolvers with unrelated key and value
/// types side by side; the scheduler only needs to know how to flush them.
pub trait PendingGroup: Send {
    fn resolver_id(&self) -> &ResolverId;

    /// Number of entries (distinct handles) waiting in this group.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Consume the group into the future that invokes its resolver once and settles every handle.
    fn into_flush(self: Box<Self>, stats: Arc<StatsCounters>) -> BoxFuture<'static, FlushReport>;
}

/// One caller's outstanding request
struct PendingEntry<K, V> {
    key: K,
    completer: Completer<V>,
    handle: Handle<V>,
}

/// Pending requests for one resolver, in arrival order
pub struct BatchGroup<K, V> {
    resolver_id: ResolverId,
    resolve: ResolveFn<K, V>,
    entries: Vec<PendingEntry<K, V>>,
    /// Key -> position in `entries`, maintained only while deduplicating
    index: HashMap<K, usize>,
}

impl<K, V> BatchGroup<K, V>
where
    K: BatchKey,
    V: BatchValue,
{
    pub fn new(resolver_id: ResolverId, resolve: ResolveFn<K, V>) -> Self {
        Self {
            resolver_id,
            resolve,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Add a request for `key`
    ///
    /// With `dedupe`, a key that is already pending returns the existing
    /// handle and no new entry is created.
    ///
    /// # Returns
    /// The handle for this request and whether it was merged onto an existing one
    pub fn push(&mut self, key: K, dedupe: bool) -> (Handle<V>, bool) {
        if dedupe {
            if let Some(&position) = self.index.get(&key) {
                return (self.entries[position].handle.clone(), true);
            }
            self.index.insert(key.clone(), self.entries.len());
        }

        let (completer, handle) = Handle::pending(self.resolver_id.clone());
        self.entries.push(PendingEntry {
            key,
            completer,
            handle: handle.clone(),
        });
        (handle, false)
    }

    /// Keys in submission order.
    #[cfg(test)]
    pub(crate) fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|entry| &entry.key)
    }
}

impl<K, V> PendingGroup for BatchGroup<K, V>
where
    K: BatchKey,
    V: BatchValue,
{
    fn resolver_id(&self) -> &ResolverId {
        &self.resolver_id
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_flush(self: Box<Self>, stats: Arc<StatsCounters>) -> BoxFuture<'static, FlushReport> {
        let BatchGroup {
            resolver_id,
            resolve,
            entries,
            ..
        } = *self;

        let mut keys = Vec::with_capacity(entries.len());
        let mut completers = Vec::with_capacity(entries.len());
        for entry in entries {
            keys.push(entry.key);
            completers.push(entry.completer);
        }

        async move {
            info!(
                resolver = %resolver_id,
                count = keys.len(),
                "flush {}({}) {:?}",
                resolver_id,
                keys.len(),
                keys
            );
            StatsCounters::bump(&stats.invocations, 1);
            StatsCounters::bump(&stats.keys_submitted, keys.len() as u64);

            let outcome = match resolve(keys.clone()).await {
                Ok(resolved) => align(&resolver_id, &keys, resolved),
                Err(err) => Err(BatchError::resolver(resolver_id.clone(), err)),
            };

            match outcome {
                Ok(values) => {
                    for (completer, value) in completers.into_iter().zip(values) {
                        completer.settle(Ok(value));
                    }
                    FlushReport {
                        resolver: resolver_id,
                        key_count: keys.len(),
                        error: None,
                    }
                }
                Err(err) => {
                    // No partial settlement: every handle in the group fails together
                    warn!(resolver = %resolver_id, "Batch failed for {} keys: {}", keys.len(), err);
                    StatsCounters::bump(&stats.failed_groups, 1);
                    for completer in completers {
                        completer.settle(Err(err.clone()));
                    }
                    FlushReport {
                        resolver: resolver_id,
                        key_count: keys.len(),
                        error: Some(err),
                    }
                }
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::from_sync;

    fn doubling_group() -> BatchGroup<i64, i64> {
        let resolve = from_sync(|keys: Vec<i64>| anyhow::Ok(keys.iter().map(|k| k * 2).collect::<Vec<i64>>()));
        BatchGroup::new(ResolverId::from("double"), resolve)
    }

    #[test]
    fn test_push_preserves_arrival_order() {
        let mut group = doubling_group();
        let _a = group.push(3, true);
        let _b = group.push(1, true);
        let _c = group.push(2, true);

        assert_eq!(group.keys().copied().collect::<Vec<_>>(), vec![3, 1, 2]);
    }

    #[test]
    fn test_push_dedupes_onto_same_handle() {
        let mut group = doubling_group();
        let (first, first_merged) = group.push(5, true);
        let (second, second_merged) = group.push(5, true);

        assert!(!first_merged);
        assert!(second_merged);
        assert!(first.ptr_eq(&second));
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn test_push_without_dedupe_keeps_duplicates() {
        let mut group = doubling_group();
        let (first, _) = group.push(5, false);
        let (second, merged) = group.push(5, false);

        assert!(!merged);
        assert!(!first.ptr_eq(&second));
        assert_eq!(group.keys().copied().collect::<Vec<_>>(), vec![5, 5]);
    }

    #[tokio::test]
    async fn test_flush_settles_every_handle() {
        let mut group = doubling_group();
        let (a, _) = group.push(1, true);
        let (b, _) = group.push(2, true);
        let stats = Arc::new(StatsCounters::default());

        let report = Box::new(group).into_flush(stats.clone()).await;

        assert_eq!(report.key_count, 2);
        assert!(report.error.is_none());
        assert_eq!(a.await.unwrap(), 2);
        assert_eq!(b.await.unwrap(), 4);
        assert_eq!(stats.snapshot().invocations, 1);
    }
}
