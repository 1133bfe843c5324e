//! Flush Scheduler Module
//!
//! Arms one deferred flush per accumulation window and runs it once control
//! returns to the runtime.
//!
//! # Round Lifecycle
//! 1. The first enqueue of a window calls `arm`, which spawns a round task
//! 2. The round task yields (or sleeps for the configured delay) so every
//!    request issued before the suspension point joins the window
//! 3. `flush` disarms, then takes every pending group of its context
//! 4. Each group flush is spawned as its own task, so a slow resolver never
//!    holds back the settlement of another
//!
//! Requests issued while a round is in flight arm the next round; they are
//! never folded into the one already executing. Windows and rounds are kept
//! per execution context, so independent event loops never share a round.

use crate::{
    registry::{FlushReport, Registry},
    types::StatsCounters,
    ContextId,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle as RuntimeHandle;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct SchedulerState {
    /// Contexts with a round task that has not started flushing yet, and that round's number
    armed: HashMap<ContextId, u64>,
    /// Sequence number of the most recently armed round, across contexts
    round: u64,
}

/// Deferred flush scheduler
///
/// Cheap to clone; clones share the same armed rounds and registry.
#[derive(Clone)]
pub struct Scheduler {
    registry: Arc<Registry>,
    state: Arc<Mutex<SchedulerState>>,
    stats: Arc<StatsCounters>,
    /// `None` flushes as soon as the current work drains
    flush_delay: Option<Duration>,
}

impl Scheduler {
    pub(crate) fn new(
        registry: Arc<Registry>,
        stats: Arc<StatsCounters>,
        flush_delay: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            state: Arc::new(Mutex::new(SchedulerState::default())),
            stats,
            flush_delay,
        }
    }

    /// Schedule a flush of `context`'s window on `runtime` unless one is already pending
    ///
    /// # Returns
    /// `true` if this call armed a new round, `false` if one was already armed
    pub fn arm(&self, context: ContextId, runtime: &RuntimeHandle) -> bool {
        let round = {
            let mut state = self.state.lock();
            if state.armed.contains_key(&context) {
                return false;
            }
            state.round += 1;
            let round = state.round;
            state.armed.insert(context, round);
            round
        };

        debug!(round, "Flush armed");
        // Owned by the task from the start, so it is dropped even if the task never gets polled
        let guard = ArmGuard {
            registry: self.registry.clone(),
            state: self.state.clone(),
            context,
            round,
            flushed: false,
        };
        let scheduler = self.clone();
        runtime.spawn(async move { scheduler.run_round(guard).await });
        true
    }

    /// Whether `context` has a round armed that has not started flushing.
    pub fn is_armed(&self, context: ContextId) -> bool {
        self.state.lock().armed.contains_key(&context)
    }

    async fn run_round(self, guard: ArmGuard) {
        let (context, round) = (guard.context, guard.round);

        match self.flush_delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }

        let mut flushes = self.flush(context, round);
        guard.flushed();

        let mut settled = 0usize;
        while let Some(joined) = flushes.join_next().await {
            match joined {
                Ok(report) => {
                    settled += 1;
                    if let Some(err) = report.error {
                        debug!(round, resolver = %report.resolver, "Group failed: {}", err);
                    }
                }
                // Completers of a panicked group are dropped, so its callers observe `Abandoned`
                Err(err) => error!(round, "Group flush task failed: {:?}", err),
            }
        }
        if settled > 0 {
            debug!(round, groups = settled, "Round settled");
        }
    }

    /// Flush every pending group of `context`
    ///
    /// Disarms before taking the groups: an enqueue that races with the
    /// take either lands in this round or arms the next one, never neither.
    ///
    /// # Returns
    /// The spawned group flushes, one task per resolver
    fn flush(&self, context: ContextId, round: u64) -> JoinSet<FlushReport> {
        self.state.lock().armed.remove(&context);
        let groups = self.registry.take_pending(context);

        let mut flushes = JoinSet::new();
        if groups.is_empty() {
            return flushes;
        }

        StatsCounters::bump(&self.stats.rounds, 1);
        info!(round, groups = groups.len(), "Flushing round");
        for group in groups {
            flushes.spawn(group.into_flush(self.stats.clone()));
        }
        flushes
    }
}

/// Abandons a window whose round task is dropped before it flushes
///
/// Happens when the runtime shuts down with the round still queued. The
/// window's groups are discarded, which drops their completers: every
/// handle already given out settles with `Abandoned`, and the context can
/// arm again.
struct ArmGuard {
    registry: Arc<Registry>,
    state: Arc<Mutex<SchedulerState>>,
    context: ContextId,
    round: u64,
    flushed: bool,
}

impl ArmGuard {
    fn flushed(mut self) {
        self.flushed = true;
    }
}

impl Drop for ArmGuard {
    fn drop(&mut self) {
        if self.flushed {
            return;
        }
        {
            let mut state = self.state.lock();
            if state.armed.get(&self.context) != Some(&self.round) {
                return;
            }
            state.armed.remove(&self.context);
        }

        let abandoned = self.registry.take_pending(self.context);
        if !abandoned.is_empty() {
            warn!(
                round = self.round,
                groups = abandoned.len(),
                "Round dropped before flushing, abandoning pending requests"
            );
        }
    }
}
