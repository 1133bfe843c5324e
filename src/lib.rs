//! This crate implements a deferred batch-coalescing engine.
//! Independent callers request values by key from named resolvers; every request issued
//! within the same scheduling tick is grouped and satisfied by a single resolver call per group.

pub mod types; // Resolver ids, resolver result sets and engine counters.
pub mod error; // Errors surfaced at enqueue time or through request handles.
pub mod config; // Defines and loads engine configuration.
pub mod registry; // Resolver registrations and their pending batch groups.
pub mod scheduler; // Arms and runs the deferred flush rounds.
pub mod batch; // Caller-facing batcher, request handles and the resolver adapter.
pub mod demo; // Doubling/squaring resolvers and the call graphs driven by the binary.

// Re-export commonly used types and configurations for easier access.
pub use types::*;
pub use error::BatchError;
pub use config::Config;
pub use batch::{Batcher, Handle, Loader};
