//! Tests for flush scheduling
//!
//! Verifies window boundaries: one round per window, all groups per round,
//! no leakage into a round already in flight, re-arming across rounds, and
//! isolation between runtimes.

#[cfg(test)]
mod tests {
    use crate::{
        batch::from_sync,
        config::BatchConfig,
        registry::Registry,
        scheduler::Scheduler,
        types::StatsCounters,
        BatchError, Batcher, ContextId, Loader, ResolverId,
    };
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::runtime::{Builder, Runtime};
    use tokio::sync::{oneshot, Notify};

    type Calls = Arc<Mutex<Vec<Vec<i64>>>>;

    /// Helper function to register an identity resolver that records every invocation
    fn recording_identity(batcher: &Batcher, name: &str) -> (Loader<i64, i64>, Calls) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = calls.clone();
        let loader = batcher
            .register_sync(name, move |keys: Vec<i64>| {
                recorded.lock().push(keys.clone());
                anyhow::Ok(keys)
            })
            .unwrap();
        (loader, calls)
    }

    /// Helper function to register a resolver whose first invocation blocks until released
    ///
    /// `started` is notified as soon as any invocation begins.
    fn gated_identity(
        batcher: &Batcher,
        name: &str,
        started: Arc<Notify>,
        release: oneshot::Receiver<()>,
    ) -> (Loader<i64, i64>, Calls) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = calls.clone();
        let gate = Arc::new(Mutex::new(Some(release)));
        let loader = batcher
            .register_async(name, move |keys: Vec<i64>| {
                recorded.lock().push(keys.clone());
                started.notify_one();
                let release = gate.lock().take();
                async move {
                    if let Some(release) = release {
                        let _ = release.await;
                    }
                    anyhow::Ok(keys)
                }
            })
            .unwrap();
        (loader, calls)
    }

    #[tokio::test]
    async fn test_arm_is_idempotent_within_window() {
        let registry = Arc::new(Registry::new());
        let id = ResolverId::from("identity");
        registry
            .register::<i64, i64>(id.clone(), from_sync(|keys: Vec<i64>| anyhow::Ok(keys)))
            .unwrap();
        let scheduler = Scheduler::new(registry.clone(), Arc::new(StatsCounters::default()), None);
        let runtime = tokio::runtime::Handle::current();
        let context = ContextId::current();

        let (first, _) = registry.enqueue::<i64, i64>(context, &id, 1, true).unwrap();
        assert!(scheduler.arm(context, &runtime));
        let (second, _) = registry.enqueue::<i64, i64>(context, &id, 2, true).unwrap();
        assert!(!scheduler.arm(context, &runtime));
        assert!(scheduler.is_armed(context));

        assert_eq!(first.await.unwrap(), 1);
        assert_eq!(second.await.unwrap(), 2);
        assert!(!scheduler.is_armed(context));

        // A settled window lets the next enqueue arm a fresh round
        let (third, _) = registry.enqueue::<i64, i64>(context, &id, 3, true).unwrap();
        assert!(scheduler.arm(context, &runtime));
        assert_eq!(third.await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_all_groups_flush_in_one_round() {
        let batcher = Batcher::new(BatchConfig::default());
        let (left, left_calls) = recording_identity(&batcher, "left");
        let (right, right_calls) = recording_identity(&batcher, "right");

        let (a, b, c) = tokio::join!(left.gen(1), right.gen(2), left.gen(3));
        assert_eq!((a.unwrap(), b.unwrap(), c.unwrap()), (1, 2, 3));

        assert_eq!(*left_calls.lock(), vec![vec![1, 3]]);
        assert_eq!(*right_calls.lock(), vec![vec![2]]);
        let stats = batcher.stats();
        assert_eq!(stats.rounds, 1);
        assert_eq!(stats.invocations, 2);
    }

    #[tokio::test]
    async fn test_request_during_flush_waits_for_next_round() {
        let batcher = Batcher::new(BatchConfig::default());
        let started = Arc::new(Notify::new());
        let (release_tx, release_rx) = oneshot::channel();
        let (gated, calls) = gated_identity(&batcher, "gated", started.clone(), release_rx);

        let first = tokio::spawn({
            let gated = gated.clone();
            async move { gated.gen(1).await }
        });

        // Round one has taken its group and is inside the resolver
        started.notified().await;
        let second = tokio::spawn({
            let gated = gated.clone();
            async move { gated.gen(2).await }
        });
        release_tx.send(()).unwrap();

        assert_eq!(first.await.unwrap().unwrap(), 1);
        assert_eq!(second.await.unwrap().unwrap(), 2);
        assert_eq!(*calls.lock(), vec![vec![1], vec![2]]);
        assert_eq!(batcher.stats().rounds, 2);
    }

    #[tokio::test]
    async fn test_slow_resolver_does_not_hold_back_other_groups() {
        let batcher = Batcher::new(BatchConfig::default());
        let started = Arc::new(Notify::new());
        let (release_tx, release_rx) = oneshot::channel();
        let (slow, _) = gated_identity(&batcher, "slow", started, release_rx);
        let (fast, _) = recording_identity(&batcher, "fast");

        let slow_task = tokio::spawn({
            let slow = slow.clone();
            async move { slow.gen(10).await }
        });

        assert_eq!(fast.gen(1).await.unwrap(), 1);
        assert!(!slow_task.is_finished());

        release_tx.send(()).unwrap();
        assert_eq!(slow_task.await.unwrap().unwrap(), 10);
        assert_eq!(batcher.stats().rounds, 1);
    }

    #[tokio::test]
    async fn test_chained_requests_rearm_each_round() {
        let batcher = Batcher::new(BatchConfig::default());
        let (identity, calls) = recording_identity(&batcher, "identity");

        let mut value = 1;
        for _ in 0..3 {
            value = identity.gen(value + 1).await.unwrap();
        }

        assert_eq!(value, 4);
        assert_eq!(*calls.lock(), vec![vec![2], vec![3], vec![4]]);
        assert_eq!(batcher.stats().rounds, 3);
        assert_eq!(batcher.pending_groups(), 0);
    }

    #[tokio::test]
    async fn test_request_after_suspension_starts_new_window() {
        let batcher = Batcher::new(BatchConfig::default());
        let (identity, calls) = recording_identity(&batcher, "identity");

        let (a, b) = tokio::join!(identity.gen(1), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            identity.gen(2).await
        });

        assert_eq!((a.unwrap(), b.unwrap()), (1, 2));
        assert_eq!(*calls.lock(), vec![vec![1], vec![2]]);
    }

    #[tokio::test]
    async fn test_flush_delay_widens_window() {
        let batcher = Batcher::new(BatchConfig {
            flush_delay_ms: 200,
            ..BatchConfig::default()
        });
        let (identity, calls) = recording_identity(&batcher, "identity");

        let (a, b) = tokio::join!(identity.gen(1), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            identity.gen(2).await
        });

        assert_eq!((a.unwrap(), b.unwrap()), (1, 2));
        assert_eq!(*calls.lock(), vec![vec![1, 2]]);
    }

    /// Helper function to build a fresh current-thread runtime
    fn current_thread_runtime() -> Runtime {
        Builder::new_current_thread().enable_all().build().unwrap()
    }

    #[test]
    fn test_runtime_shutdown_abandons_unflushed_window() {
        let batcher = Batcher::new(BatchConfig::default());
        let (identity, calls) = recording_identity(&batcher, "identity");

        // Enqueue without ever letting the runtime run its round task
        let first_runtime = current_thread_runtime();
        let pending = {
            let _enter = first_runtime.enter();
            identity.enqueue(1).unwrap()
        };
        assert_eq!(batcher.pending_groups(), 1);
        drop(first_runtime);
        assert_eq!(batcher.pending_groups(), 0);

        let second_runtime = current_thread_runtime();
        let first = second_runtime.block_on(async { tokio::time::timeout(Duration::from_secs(2), pending).await });
        assert!(matches!(first, Ok(Err(BatchError::Abandoned { .. }))));

        // The context arms again and the abandoned key never reaches the resolver
        assert_eq!(second_runtime.block_on(identity.gen(2)).unwrap(), 2);
        assert_eq!(*calls.lock(), vec![vec![2]]);
    }

    #[test]
    fn test_windows_of_separate_runtimes_flush_independently() {
        let batcher = Batcher::new(BatchConfig::default());
        let (identity, calls) = recording_identity(&batcher, "identity");

        // Runtime A holds a window open that it never gets to flush
        let idle_runtime = current_thread_runtime();
        let stranded = {
            let _enter = idle_runtime.enter();
            identity.enqueue(1).unwrap()
        };

        // Runtime B on its own thread must neither absorb nor wait on A's window
        let other = identity.clone();
        let served = std::thread::spawn(move || {
            current_thread_runtime()
                .block_on(async { tokio::time::timeout(Duration::from_secs(2), other.gen(2)).await })
        })
        .join()
        .unwrap();
        assert!(matches!(served, Ok(Ok(2))));
        assert_eq!(*calls.lock(), vec![vec![2]]);
        assert_eq!(batcher.pending_groups(), 1);

        drop(idle_runtime);
        let stranded = current_thread_runtime()
            .block_on(async { tokio::time::timeout(Duration::from_secs(2), stranded).await });
        assert!(matches!(stranded, Ok(Err(BatchError::Abandoned { .. }))));
        assert_eq!(*calls.lock(), vec![vec![2]]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_multi_thread_runtime_is_rejected() {
        let batcher = Batcher::new(BatchConfig::default());
        let (identity, calls) = recording_identity(&batcher, "identity");

        let result = identity.enqueue(1);
        assert!(matches!(result, Err(BatchError::UnsupportedRuntime { .. })));
        assert!(matches!(
            identity.gen(2).await,
            Err(BatchError::UnsupportedRuntime { .. })
        ));
        assert_eq!(batcher.pending_groups(), 0);
        assert!(calls.lock().is_empty());
        assert_eq!(batcher.stats().requests, 0);
    }
}
