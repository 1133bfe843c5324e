//! Error Module
//!
//! Every failure a caller can observe from the batching engine.
//! Misuse errors surface synchronously from `enqueue`; flush errors are
//! delivered through the handle to every caller waiting on the group.

use crate::ResolverId;
use std::sync::Arc;
use thiserror::Error;

/// Errors produced by the batching engine
///
/// `Clone` because one failure is fanned out to every handle of a group,
/// and merged callers all observe the identical outcome.
#[derive(Debug, Clone, Error)]
pub enum BatchError {
    #[error("no resolver registered under `{resolver}`")]
    UnknownResolver { resolver: ResolverId },

    #[error("resolver `{resolver}` is registered with different key/value types")]
    TypeMismatch { resolver: ResolverId },

    #[error("a resolver is already registered under `{resolver}`")]
    AlreadyRegistered { resolver: ResolverId },

    #[error("enqueue requires a running tokio runtime to schedule the flush")]
    NoRuntime,

    #[error("enqueue requires a current-thread tokio runtime, found {flavor}")]
    UnsupportedRuntime { flavor: String },

    #[error(
        "resolver `{resolver}` returned an incomplete result set: {submitted} keys submitted, {missing} missing, {extra} unexpected"
    )]
    CoverageMismatch {
        resolver: ResolverId,
        submitted: usize,
        missing: usize,
        extra: usize,
    },

    #[error("resolver `{resolver}` failed: {source}")]
    Resolver {
        resolver: ResolverId,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("flush for resolver `{resolver}` was dropped before settling the request")]
    Abandoned { resolver: ResolverId },
}

impl BatchError {
    /// Wrap a resolver fault so it can be shared by every handle in the group.
    pub fn resolver(resolver: ResolverId, err: anyhow::Error) -> Self {
        let source: Box<dyn std::error::Error + Send + Sync + 'static> = err.into();
        BatchError::Resolver {
            resolver,
            source: Arc::from(source),
        }
    }

    /// The resolver this error is attributed to, when there is one.
    pub fn resolver_id(&self) -> Option<&ResolverId> {
        match self {
            BatchError::NoRuntime | BatchError::UnsupportedRuntime { .. } => None,
            BatchError::UnknownResolver { resolver }
            | BatchError::TypeMismatch { resolver }
            | BatchError::AlreadyRegistered { resolver }
            | BatchError::CoverageMismatch { resolver, .. }
            | BatchError::Resolver { resolver, .. }
            | BatchError::Abandoned { resolver } => Some(resolver),
        }
    }
}
