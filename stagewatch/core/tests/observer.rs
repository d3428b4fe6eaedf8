mod common;

#[cfg(test)]
mod observer {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::common::{event, full_run, CountingCallbacks};
    use stagewatch_core::prelude::*;

    const TIMEOUT: Duration = Duration::from_secs(60);

    fn context(
        store: &InMemoryEventStore,
        callbacks: Arc<CountingCallbacks>,
        config: ObserverConfig,
    ) -> ObserverContext {
        ObserverContext::builder()
            .source(Arc::new(store.clone()))
            .subscriber(Arc::new(store.clone()))
            .callbacks(callbacks)
            .config(config)
            .build()
    }

    fn fast_polling() -> ObserverConfig {
        ObserverConfig::try_new(100, 16, false).unwrap()
    }

    async fn wait_subscribed(store: &InMemoryEventStore, run_id: &str) {
        while store.subscriber_count(run_id).await == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    async fn wait_terminal(handle: &ObserverHandle) -> RunSnapshot {
        tokio::time::timeout(TIMEOUT, handle.wait_terminal())
            .await
            .expect("run did not reach a terminal status")
            .expect("observer stopped before the run finished")
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_pushes_complete_once() {
        let store = InMemoryEventStore::new();
        let callbacks = CountingCallbacks::new();
        let ctx = context(&store, callbacks.clone(), fast_polling());

        let handle = observe(Some("run-1".to_string()), &ctx);
        for event in full_run("run-1") {
            store.publish(event.clone()).await;
            store.push_only(event).await;
        }

        let snapshot = wait_terminal(&handle).await;
        assert_eq!(snapshot.status, PipelineStatus::Completed);
        assert_eq!(snapshot.progress, 100);
        assert_eq!(snapshot.label, "Analysis complete");

        // keep re-delivering after completion
        for event in full_run("run-1") {
            store.push_only(event).await;
        }
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(callbacks.completed(), 1);
        assert!(callbacks.errors().is_empty());
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn missed_pushes_are_recovered_by_polling() {
        let store = InMemoryEventStore::new();
        let callbacks = CountingCallbacks::new();
        let ctx = context(&store, callbacks.clone(), fast_polling());

        let handle = observe(Some("run-1".to_string()), &ctx);
        tokio::time::sleep(Duration::from_millis(250)).await;
        for event in full_run("run-1") {
            store.record(event).await;
        }

        let snapshot = wait_terminal(&handle).await;
        assert_eq!(snapshot.status, PipelineStatus::Completed);
        assert_eq!(callbacks.completed(), 1);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn push_ahead_of_fetch_is_kept() {
        let store = InMemoryEventStore::new();
        let callbacks = CountingCallbacks::new();
        let ctx = context(&store, callbacks.clone(), fast_polling());

        let handle = observe(Some("run-1".to_string()), &ctx);
        wait_subscribed(&store, "run-1").await;
        store
            .publish(event("run-1", "parsing_jd", EventStatus::Completed))
            .await;

        let mut failed = event("run-1", "parsing_cv", EventStatus::Failed);
        failed.error = Some("CV could not be parsed".to_string());
        store.push_only(failed).await;

        let snapshot = wait_terminal(&handle).await;
        assert_eq!(snapshot.status, PipelineStatus::Failed);
        assert_eq!(snapshot.progress, 5);
        assert_eq!(snapshot.label, "Reading your CV");

        // several polls that never contain the failed event
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(handle.snapshot().status, PipelineStatus::Failed);
        assert_eq!(callbacks.errors(), vec!["CV could not be parsed".to_string()]);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn active_subscription_triggers_a_refetch() {
        let store = InMemoryEventStore::new();
        let callbacks = CountingCallbacks::new();
        let config = ObserverConfig::try_new(3_600_000, 16, false).unwrap();
        let ctx = context(&store, callbacks.clone(), config);

        for event in full_run("run-1") {
            store.record(event).await;
        }
        // the first fetch is lost, the next poll is an hour away
        store.fail_next_fetches(1).await;

        let handle = observe(Some("run-1".to_string()), &ctx);
        let snapshot = tokio::time::timeout(Duration::from_secs(60), handle.wait_terminal())
            .await
            .expect("run was not recovered before the next poll")
            .expect("observer stopped before the run finished");

        assert_eq!(snapshot.status, PipelineStatus::Completed);
        assert_eq!(store.fetch_count().await, 2);
        assert_eq!(callbacks.completed(), 1);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn late_fetch_after_stop_is_discarded() {
        let store = InMemoryEventStore::new();
        let callbacks = CountingCallbacks::new();
        let ctx = context(&store, callbacks.clone(), fast_polling());

        for event in full_run("run-1") {
            store.record(event).await;
        }
        store.set_fetch_delay(Some(Duration::from_secs(1))).await;

        let handle = observe(Some("run-1".to_string()), &ctx);
        let snapshots = handle.subscribe();

        // let the initial and the re-fetch on subscription start, then tear
        // down while both are in flight
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.fetch_count().await, 2);
        handle.stop().await;

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(snapshots.borrow().status, PipelineStatus::Processing);
        assert_eq!(callbacks.completed(), 0);
        assert_eq!(store.subscriber_count("run-1").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_are_retried() {
        let store = InMemoryEventStore::new();
        let callbacks = CountingCallbacks::new();
        let ctx = context(&store, callbacks.clone(), fast_polling());

        store.fail_next_fetches(3).await;
        store.fail_next_subscribes(2).await;
        for event in full_run("run-1") {
            store.record(event).await;
        }

        let handle = observe(Some("run-1".to_string()), &ctx);
        let snapshot = wait_terminal(&handle).await;

        assert_eq!(snapshot.status, PipelineStatus::Completed);
        assert!(store.fetch_count().await >= 4);
        assert!(callbacks.errors().is_empty());
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn ended_subscription_is_reopened() {
        let store = InMemoryEventStore::new();
        let callbacks = CountingCallbacks::new();
        let ctx = context(&store, callbacks.clone(), fast_polling());

        let handle = observe(Some("run-1".to_string()), &ctx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.subscriber_count("run-1").await, 1);

        store.close_subscriptions("run-1").await;
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(store.subscriber_count("run-1").await, 1);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn polling_stops_once_terminal() {
        let store = InMemoryEventStore::new();
        for event in full_run("run-1") {
            store.record(event).await;
        }

        let ctx = context(&store, CountingCallbacks::new(), fast_polling());
        let handle = observe(Some("run-1".to_string()), &ctx);
        wait_terminal(&handle).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let fetches = store.fetch_count().await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.fetch_count().await, fetches);
        handle.stop().await;

        let config = ObserverConfig::try_new(100, 16, true).unwrap();
        let ctx = context(&store, CountingCallbacks::new(), config);
        let handle = observe(Some("run-1".to_string()), &ctx);
        wait_terminal(&handle).await;

        let fetches = store.fetch_count().await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(store.fetch_count().await > fetches);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn without_run_id_reports_connecting() {
        let store = InMemoryEventStore::new();
        let ctx = context(&store, CountingCallbacks::new(), fast_polling());

        let handle = observe(None, &ctx);
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.status, PipelineStatus::Connecting);
        assert_eq!(snapshot.progress, 0);
        assert_eq!(snapshot.label, "Starting analysis...");
        assert!(handle.wait_terminal().await.is_none());
        assert_eq!(store.fetch_count().await, 0);

        let handle = observe(Some(String::new()), &ctx);
        assert_eq!(handle.run_id(), None);
        assert_eq!(handle.snapshot().status, PipelineStatus::Connecting);
        assert!(handle.wait_terminal().await.is_none());
        assert_eq!(store.fetch_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn switching_runs_resets_the_once_guard() {
        let store = InMemoryEventStore::new();
        let callbacks = CountingCallbacks::new();
        let mut monitor = ProgressMonitor::new(context(&store, callbacks.clone(), fast_polling()));
        assert_eq!(monitor.snapshot().status, PipelineStatus::Connecting);

        for event in full_run("run-1") {
            store.record(event).await;
        }
        monitor.set_run(Some("run-1".to_string())).await;
        wait_terminal(monitor.observer()).await;
        assert_eq!(callbacks.completed(), 1);

        // selecting the same run again keeps the current observer
        monitor.set_run(Some("run-1".to_string())).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(callbacks.completed(), 1);

        monitor.set_run(Some("run-2".to_string())).await;
        assert_eq!(monitor.run_id(), Some("run-2"));
        assert_eq!(monitor.snapshot().status, PipelineStatus::Processing);
        assert_eq!(store.subscriber_count("run-1").await, 0);

        for event in full_run("run-2") {
            store.publish(event).await;
        }
        wait_terminal(monitor.observer()).await;
        assert_eq!(callbacks.completed(), 2);

        monitor.set_run(None).await;
        assert_eq!(monitor.snapshot().status, PipelineStatus::Connecting);
    }
}
