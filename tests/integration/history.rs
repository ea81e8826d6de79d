//! Execution history integration tests.

use async_trait::async_trait;
use leasehold::history::DEFAULT_HISTORY_COLLECTION;
use leasehold::testing::{FailingRunner, RecordingRunner, TokioClock};
use leasehold::{
    DocumentStore, Event, EventBus, HistoryRecorder, InMemoryDocumentStore, JobDefinition,
    JobExecutionContext, JobRunner, JobScheduler, JobVersion, RunnerError, STATUS_FAILURE,
    STATUS_SUCCESS,
};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{LeasedRunner, RecordingHandler, every, node};

/// Runner that returns without reporting a status.
struct SilentRunner;

#[async_trait]
impl JobRunner for SilentRunner {
    async fn run_job(
        &self,
        _job: &JobDefinition,
        _ctx: &JobExecutionContext,
    ) -> Result<(), RunnerError> {
        Ok(())
    }
}

struct Harness {
    store: Arc<InMemoryDocumentStore>,
    recorder: HistoryRecorder,
    handler: Arc<RecordingHandler>,
    scheduler: JobScheduler,
    clock: Arc<TokioClock>,
}

async fn harness() -> Harness {
    let store = Arc::new(InMemoryDocumentStore::new());
    let shared: Arc<dyn DocumentStore> = store.clone();
    let clock = Arc::new(TokioClock::new());
    let recorder = HistoryRecorder::new(shared.clone());
    let handler = RecordingHandler::new();
    let bus = Arc::new(EventBus::new());
    bus.register(handler.clone()).await;
    let scheduler = node(shared, clock.clone())
        .with_history(recorder.clone())
        .with_event_bus(bus);
    Harness {
        store,
        recorder,
        handler,
        scheduler,
        clock,
    }
}

/// Actual fire times seen by the event bus, in order.
async fn fire_times(handler: &RecordingHandler) -> Vec<chrono::DateTime<chrono::Utc>> {
    handler
        .events()
        .await
        .into_iter()
        .filter_map(|e| match e {
            Event::JobFired { actual_time, .. } => Some(actual_time),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_successful_runs_are_recorded() {
    let h = harness().await;
    let runner = Arc::new(RecordingRunner::new());

    h.scheduler.schedule("jobs", "report", every(&h.clock, 1), runner.clone(), JobVersion::default(), 0.0);
    tokio::time::sleep(Duration::from_millis(2500)).await;

    assert_eq!(runner.fire_count(), 2);
    assert_eq!(h.store.document_count(DEFAULT_HISTORY_COLLECTION), 2);

    for started in fire_times(&h.handler).await {
        let record = h
            .recorder
            .find_history("jobs", "report", started)
            .await
            .unwrap()
            .expect("history record for fire");
        assert_eq!(record.completion_status, STATUS_SUCCESS);
        assert_eq!(record.job_index_name, "jobs");
        assert!(record.end_time.is_some_and(|end| end >= started));
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_runs_are_recorded_with_failure_status() {
    let h = harness().await;
    let runner = Arc::new(FailingRunner::new());

    h.scheduler.schedule("jobs", "broken", every(&h.clock, 1), runner.clone(), JobVersion::default(), 0.0);
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let started = fire_times(&h.handler).await;
    assert_eq!(started.len(), 1);
    let record = h
        .recorder
        .find_history("jobs", "broken", started[0])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.completion_status, STATUS_FAILURE);
}

#[tokio::test(start_paused = true)]
async fn test_runs_without_status_are_not_recorded() {
    let h = harness().await;

    h.scheduler.schedule("jobs", "quiet", every(&h.clock, 1), Arc::new(SilentRunner), JobVersion::default(), 0.0);
    tokio::time::sleep(Duration::from_millis(3500)).await;

    assert_eq!(fire_times(&h.handler).await.len(), 3);
    assert_eq!(h.store.document_count(DEFAULT_HISTORY_COLLECTION), 0);
}

#[tokio::test(start_paused = true)]
async fn test_skipped_runs_are_not_recorded() {
    let h = harness().await;
    // Another process holds the job lease for the whole test.
    h.scheduler
        .lock_service()
        .acquire("jobs", "contended", 600)
        .await
        .unwrap()
        .unwrap();

    let job = every(&h.clock, 1).with_lock_duration_seconds(60);
    let runner = LeasedRunner::new(Duration::from_millis(100));
    h.scheduler.schedule("jobs", "contended", job, runner.clone(), JobVersion::default(), 0.0);
    tokio::time::sleep(Duration::from_millis(2500)).await;

    assert_eq!(runner.runs(), 0);
    assert_eq!(runner.skipped(), 2);
    assert_eq!(h.store.document_count(DEFAULT_HISTORY_COLLECTION), 0);
}
