mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{BarrierStore, Harness, Mark, Recorder, TALLY};
use scylla_cqrs::event_sourcing::{EventSourcingError, EventType};
use scylla_cqrs::messaging::EventHandler;
use scylla_cqrs::utils::RetryConfig;

fn quick_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(10),
        multiplier: 2.0,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_racing_dispatches_one_wins_one_conflicts() {
    let h = Harness::new();
    h.command_bus()
        .dispatch(&Mark { id: "t-1".to_string(), count: 1 })
        .await
        .unwrap();

    let racing = Arc::new(h.command_bus_over(Arc::new(BarrierStore::new(h.store.clone(), 2))));

    let a = tokio::spawn({
        let bus = racing.clone();
        async move { bus.dispatch(&Mark { id: "t-1".to_string(), count: 1 }).await }
    });
    let b = tokio::spawn({
        let bus = racing.clone();
        async move { bus.dispatch(&Mark { id: "t-1".to_string(), count: 1 }).await }
    });

    let results = vec![a.await.unwrap(), b.await.unwrap()];
    let won = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(EventSourcingError::VersionConflict { version: 2, .. })))
        .count();

    assert_eq!(won, 1);
    assert_eq!(conflicts, 1);
    assert_eq!(h.versions(TALLY, "t-1"), vec![1, 2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_conflict_retry_lets_both_racers_commit() {
    let h = Harness::new();
    let racing = Arc::new(
        h.command_bus_over(Arc::new(BarrierStore::new(h.store.clone(), 2)))
            .with_conflict_retry(quick_retry(5)),
    );

    let a = tokio::spawn({
        let bus = racing.clone();
        async move { bus.dispatch(&Mark { id: "t-2".to_string(), count: 2 }).await }
    });
    let b = tokio::spawn({
        let bus = racing.clone();
        async move { bus.dispatch(&Mark { id: "t-2".to_string(), count: 3 }).await }
    });

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert_eq!(h.versions(TALLY, "t-2"), vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_failing_handler_does_not_block_others() {
    let h = Harness::new();
    let flaky = Arc::new(Recorder::new("flaky", &["MarkedEvent"]).failing_on(&[1, 2]));
    let steady = Arc::new(Recorder::new("steady", &["MarkedEvent"]));
    let handlers: Vec<Arc<dyn EventHandler>> = vec![flaky.clone(), steady.clone()];
    let consumers = h.bus.start_consumers(handlers);

    h.command_bus()
        .dispatch(&Mark { id: "t-3".to_string(), count: 4 })
        .await
        .unwrap();

    assert!(h.bus.wait_until_caught_up("flaky", Duration::from_secs(2)).await);
    assert!(h.bus.wait_until_caught_up("steady", Duration::from_secs(2)).await);
    consumers.shutdown().await;

    let versions = |r: &Recorder| r.seen().into_iter().map(|(_, v)| v).collect::<Vec<_>>();
    assert_eq!(versions(&flaky), vec![1, 2, 3, 4]);
    assert_eq!(versions(&steady), vec![1, 2, 3, 4]);
    assert!(flaky.seen().iter().all(|(t, _)| *t == EventType::from("MarkedEvent")));
}
