//! Lease contention integration tests.
//!
//! Several scheduler instances, or several lock services, share one
//! document store the way separate processes would share a cluster store.

use chrono::{TimeZone, Utc};
use leasehold::testing::{ManualClock, TokioClock};
use leasehold::{DocumentStore, InMemoryDocumentStore, JobId, JobVersion, LockService, ResourceAttributes};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{LeasedRunner, every, node};

#[tokio::test(start_paused = true)]
async fn test_two_nodes_run_each_fire_once() {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let clock = Arc::new(TokioClock::new());
    let node_a = node(store.clone(), clock.clone());
    let node_b = node(store, clock.clone());
    let runner_a = LeasedRunner::new(Duration::from_millis(200));
    let runner_b = LeasedRunner::new(Duration::from_millis(200));
    let job = every(&clock, 1).with_lock_duration_seconds(60);

    assert!(node_a.schedule("jobs", "job", job.clone(), runner_a.clone(), JobVersion::default(), 0.0));
    assert!(node_b.schedule("jobs", "job", job, runner_b.clone(), JobVersion::default(), 0.0));

    tokio::time::sleep(Duration::from_millis(3500)).await;

    assert_eq!(runner_a.runs() + runner_b.runs(), 3);
    assert_eq!(runner_a.skipped() + runner_b.skipped(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_lease_blocks_until_expiry() {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let clock = Arc::new(TokioClock::new());
    let crashed = node(store.clone(), clock.clone());
    let survivor = node(store, clock.clone());
    let abandoning = LeasedRunner::abandoning();
    let leased = LeasedRunner::new(Duration::ZERO);
    let id = JobId::new("job");

    crashed.schedule(
        "jobs",
        id.clone(),
        every(&clock, 1).with_lock_duration_seconds(3),
        abandoning.clone(),
        JobVersion::default(),
        0.0,
    );
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(abandoning.runs(), 1);
    assert!(crashed.deschedule("jobs", &id));

    survivor.schedule(
        "jobs",
        id,
        every(&clock, 1).with_lock_duration_seconds(3),
        leased.clone(),
        JobVersion::default(),
        0.0,
    );
    tokio::time::sleep(Duration::from_millis(4500)).await;

    // The first fire after the handover lands inside the abandoned lease;
    // the last ones land after it has expired.
    assert!(leased.skipped() >= 1, "expected a skipped fire");
    assert!(leased.runs() >= 1, "expected the lease to be taken over");
    assert_eq!(abandoning.runs(), 1);
}

#[tokio::test]
async fn test_lease_handover_between_services() {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(1000, 0).unwrap()));
    let first = LockService::new(store.clone()).with_clock(clock.clone());
    let second = LockService::new(store).with_clock(clock.clone());

    let held = first.acquire("jobs", "rollup", 30).await.unwrap().unwrap();

    clock.advance_secs(29);
    assert!(second.acquire("jobs", "rollup", 30).await.unwrap().is_none());

    clock.advance_secs(1);
    let taken = second.acquire("jobs", "rollup", 30).await.unwrap().unwrap();
    assert_eq!(taken.acquired_at().timestamp(), 1030);

    // The previous holder's view is stale now.
    assert!(!first.release(Some(&held)).await.unwrap());
    assert!(first.renew(&held).await.unwrap().is_none());

    assert!(second.release(Some(&taken)).await.unwrap());
    let stored = first.find(taken.lock_id()).await.unwrap().unwrap();
    assert!(stored.is_released());
}

#[tokio::test]
async fn test_resource_lease_is_shared_across_attribute_order() {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let first = LockService::new(store.clone());
    let second = LockService::new(store);

    let mut forward = ResourceAttributes::new();
    forward.insert("index".into(), "logs-2024".into());
    forward.insert("shard".into(), "3".into());
    let mut backward = ResourceAttributes::new();
    backward.insert("shard".into(), "3".into());
    backward.insert("index".into(), "logs-2024".into());

    let held = first
        .acquire_on_resource("jobs", 60, "shard", &forward)
        .await
        .unwrap()
        .unwrap();
    assert!(
        second
            .acquire_on_resource("jobs", 60, "shard", &backward)
            .await
            .unwrap()
            .is_none()
    );

    assert!(first.release(Some(&held)).await.unwrap());
    assert!(
        second
            .acquire_on_resource("jobs", 60, "shard", &backward)
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_services_have_one_winner() {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = LockService::new(store.clone());
        handles.push(tokio::spawn(async move {
            service.acquire("jobs", "contended", 60).await.unwrap()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}
