//! Resolver Registry Module
//!
//! Maps each resolver id to its registered resolve function, and each
//! execution context to its current window of batch groups. Groups are
//! created lazily on the first enqueue of a window and handed over
//! wholesale to the scheduler at flush time.

use super::group::{BatchGroup, PendingGroup};
use crate::{
    batch::{BatchKey, BatchValue, Handle, ResolveFn},
    BatchError, ContextId, ResolverId,
};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A registered resolver, erased over its key and value types
trait Registration: Send + Sync {
    /// Fresh, empty group bound to this resolver.
    fn new_group(&self) -> Box<dyn PendingGroup>;

    fn as_any(&self) -> &dyn Any;
}

struct TypedRegistration<K, V> {
    id: ResolverId,
    resolve: ResolveFn<K, V>,
}

impl<K, V> Registration for TypedRegistration<K, V>
where
    K: BatchKey,
    V: BatchValue,
{
    fn new_group(&self) -> Box<dyn PendingGroup> {
        Box::new(BatchGroup::new(self.id.clone(), self.resolve.clone()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Default)]
struct RegistryState {
    resolvers: HashMap<ResolverId, Arc<dyn Registration>>,
    /// Per context, the groups with at least one pending entry in its current window
    windows: HashMap<ContextId, HashMap<ResolverId, Box<dyn PendingGroup>>>,
}

/// Resolver registry
///
/// Replaces per-type class state with one explicit object keyed by
/// resolver id. The lock is only held for bookkeeping, never across an await.
#[derive(Default)]
pub struct Registry {
    state: Mutex<RegistryState>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resolve function under `id`
    ///
    /// # Returns
    /// `AlreadyRegistered` if the id is taken
    pub fn register<K, V>(&self, id: ResolverId, resolve: ResolveFn<K, V>) -> Result<(), BatchError>
    where
        K: BatchKey,
        V: BatchValue,
    {
        let mut state = self.state.lock();
        if state.resolvers.contains_key(&id) {
            return Err(BatchError::AlreadyRegistered { resolver: id });
        }

        debug!("Registered resolver {}", id);
        let registration = TypedRegistration {
            id: id.clone(),
            resolve,
        };
        state.resolvers.insert(id, Arc::new(registration));
        Ok(())
    }

    pub fn is_registered(&self, id: &ResolverId) -> bool {
        self.state.lock().resolvers.contains_key(id)
    }

    /// Add a request for `key` to resolver `id` in the current window of `context`
    ///
    /// Fails immediately for an unknown resolver or for key/value types that
    /// differ from the registration; nothing is enqueued in that case.
    ///
    /// # Returns
    /// The request handle and whether it was merged onto an already pending one
    pub fn enqueue<K, V>(
        &self,
        context: ContextId,
        id: &ResolverId,
        key: K,
        dedupe: bool,
    ) -> Result<(Handle<V>, bool), BatchError>
    where
        K: BatchKey,
        V: BatchValue,
    {
        let mut guard = self.state.lock();
        let RegistryState { resolvers, windows } = &mut *guard;

        let registration = resolvers
            .get(id)
            .ok_or_else(|| BatchError::UnknownResolver {
                resolver: id.clone(),
            })?;
        if registration
            .as_any()
            .downcast_ref::<TypedRegistration<K, V>>()
            .is_none()
        {
            return Err(BatchError::TypeMismatch {
                resolver: id.clone(),
            });
        }

        let group = windows
            .entry(context)
            .or_default()
            .entry(id.clone())
            .or_insert_with(|| registration.new_group());
        let group = group
            .as_any_mut()
            .downcast_mut::<BatchGroup<K, V>>()
            .ok_or_else(|| BatchError::TypeMismatch {
                resolver: id.clone(),
            })?;

        Ok(group.push(key, dedupe))
    }

    /// Take ownership of every non-empty group in the window of `context`
    ///
    /// The context is left with no groups, so any later enqueue from it starts
    /// a new window. Other contexts are untouched.
    pub fn take_pending(&self, context: ContextId) -> Vec<Box<dyn PendingGroup>> {
        let groups = self.state.lock().windows.remove(&context).unwrap_or_default();
        groups
            .into_values()
            .filter(|group| !group.is_empty())
            .collect()
    }

    /// Number of groups waiting for a flush, across all contexts.
    pub fn pending_groups(&self) -> usize {
        self.state.lock().windows.values().map(HashMap::len).sum()
    }
}
