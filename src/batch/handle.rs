//! Request Handle Module
//!
//! A handle is the awaitable a caller receives for one pending request.
//! It is settled exactly once, when the owning group flushes. Callers
//! merged onto the same key hold clones of one handle and observe the
//! identical outcome.

use crate::{BatchError, ResolverId};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Outcome delivered to every caller waiting on a handle
type Outcome<V> = Result<V, BatchError>;

/// Awaitable result of one (possibly shared) pending request
///
/// Dropping a handle only drops this caller's interest: the group still
/// flushes and any other holder of the same handle is still settled.
#[must_use = "handles do nothing unless awaited"]
pub struct Handle<V> {
    inner: Shared<BoxFuture<'static, Outcome<V>>>,
}

impl<V> Clone for Handle<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> Handle<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create an unsettled handle and the completer that settles it.
    pub(crate) fn pending(resolver: ResolverId) -> (Completer<V>, Self) {
        let (tx, rx) = oneshot::channel();
        let inner = rx
            // Sender dropped without a value: the flush was torn down
            .map(move |received| received.unwrap_or(Err(BatchError::Abandoned { resolver })))
            .boxed()
            .shared();
        (Completer { tx }, Self { inner })
    }

    /// True if both handles represent the same pending request.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.inner.ptr_eq(&other.inner)
    }

    /// The outcome, if the handle has already been settled and observed.
    #[cfg(test)]
    pub(crate) fn peek(&self) -> Option<&Outcome<V>> {
        self.inner.peek()
    }
}

impl<V> Future for Handle<V>
where
    V: Clone,
{
    type Output = Result<V, BatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

/// Write side of a [`Handle`], owned by the batch group
pub(crate) struct Completer<V> {
    tx: oneshot::Sender<Outcome<V>>,
}

impl<V> Completer<V> {
    /// Settle the handle. Consumes the completer so a handle is settled at most once.
    pub(crate) fn settle(self, outcome: Outcome<V>) {
        // Every caller may have dropped interest; nothing to deliver then
        let _ = self.tx.send(outcome);
    }
}
