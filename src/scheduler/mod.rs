//! Flush Scheduling Module
//!
//! This module decides *when* pending batch groups are flushed:
//! - One deferred round per accumulation window, armed by the first enqueue
//! - All pending groups flush in the same round, each in its own task
//! - Requests made while a round is executing start the next window

mod scheduler;

#[cfg(test)]
mod tests;

pub use scheduler::Scheduler;
