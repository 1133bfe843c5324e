use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

/// Identity of a resolver: the unit of grouping.
///
/// Two requests land in the same batch only if they name the same
/// `ResolverId` within one accumulation window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResolverId(String);

impl ResolverId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResolverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResolverId {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

impl From<String> for ResolverId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl From<&ResolverId> for ResolverId {
    fn from(id: &ResolverId) -> Self {
        id.clone()
    }
}

/// Execution context a window belongs to
///
/// A current-thread runtime runs all of its tasks on the thread that drives
/// it, so the thread identifies the event loop. Windows and armed rounds are
/// kept per context: requests from one loop never wait on another loop's flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(ThreadId);

impl ContextId {
    /// Context of the calling thread.
    pub fn current() -> Self {
        Self(thread::current().id())
    }
}

/// Result set produced by one resolver invocation
///
/// A resolver may answer either positionally (one value per submitted key,
/// in submission order) or with an explicit key -> value map. Both shapes
/// are checked for exact key coverage before any handle is settled.
#[derive(Debug, Clone)]
pub enum Resolved<K, V> {
    /// Values parallel to the submitted keys
    Aligned(Vec<V>),
    /// Values looked up by key; must contain exactly the submitted key set
    Keyed(HashMap<K, V>),
}

impl<K, V> From<Vec<V>> for Resolved<K, V> {
    fn from(values: Vec<V>) -> Self {
        Resolved::Aligned(values)
    }
}

impl<K, V> From<HashMap<K, V>> for Resolved<K, V> {
    fn from(values: HashMap<K, V>) -> Self {
        Resolved::Keyed(values)
    }
}

/// Snapshot of the engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Flush rounds that found at least one pending group
    pub rounds: u64,
    /// Resolver invocations (one per group per round)
    pub invocations: u64,
    /// Calls to `enqueue`, including merged duplicates
    pub requests: u64,
    /// Requests that attached to an already pending handle
    pub deduplicated: u64,
    /// Keys handed to resolvers across all invocations
    pub keys_submitted: u64,
    /// Groups that failed as a whole
    pub failed_groups: u64,
}

/// Live counters behind [`BatchStats`], shared by the batcher and its flush tasks.
#[derive(Debug, Default)]
pub struct StatsCounters {
    pub rounds: AtomicU64,
    pub invocations: AtomicU64,
    pub requests: AtomicU64,
    pub deduplicated: AtomicU64,
    pub keys_submitted: AtomicU64,
    pub failed_groups: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BatchStats {
        BatchStats {
            rounds: self.rounds.load(Ordering::Relaxed),
            invocations: self.invocations.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            keys_submitted: self.keys_submitted.load(Ordering::Relaxed),
            failed_groups: self.failed_groups.load(Ordering::Relaxed),
        }
    }
}
