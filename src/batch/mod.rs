//! Batch Coalescing Module
//!
//! This module holds the caller-facing half of the engine:
//! - Batcher / Loader: register resolvers and issue `gen` / `genv` requests
//! - Handle: the awaitable settled once per request when its group flushes
//! - Resolver adapter: normalizes sync and async resolvers and checks key coverage

mod batcher;
mod handle;
mod resolver;


pub use batcher::{Batcher, Loader};
pub use handle::Handle;
pub(crate) use handle::Completer;
pub use resolver::{align, from_async, from_sync, BatchKey, BatchValue, ResolveFn};
