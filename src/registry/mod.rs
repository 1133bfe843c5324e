//! Resolver Registry Module
//!
//! This module tracks which resolvers exist and what is pending for each:
//! - Registry: resolver id -> registered resolve function and current batch group
//! - BatchGroup: the ordered, deduplicated requests of one accumulation window

mod group;
mod registry;

pub use group::{BatchGroup, FlushReport, PendingGroup};
pub use registry::Registry;
