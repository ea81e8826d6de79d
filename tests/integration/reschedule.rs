//! Reschedule chain integration tests.
//!
//! The next timer is armed before the runner is invoked, so slow or failing
//! runners never hold the schedule back.

use async_trait::async_trait;
use leasehold::testing::{FailingRunner, RecordingRunner, TokioClock};
use leasehold::{
    DocumentStore, Event, EventBus, InMemoryDocumentStore, JobDefinition, JobExecutionContext,
    JobId, JobRunner, JobVersion, RunnerError,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::common::{RecordingHandler, every, node};

/// Runner that never finishes within the test window.
struct SlowRunner {
    started: AtomicUsize,
}

#[async_trait]
impl JobRunner for SlowRunner {
    async fn run_job(
        &self,
        _job: &JobDefinition,
        _ctx: &JobExecutionContext,
    ) -> Result<(), RunnerError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }
}

fn store() -> Arc<dyn DocumentStore> {
    Arc::new(InMemoryDocumentStore::new())
}

#[tokio::test(start_paused = true)]
async fn test_slow_runner_does_not_delay_next_fire() {
    let clock = Arc::new(TokioClock::new());
    let scheduler = node(store(), clock.clone());
    let runner = Arc::new(SlowRunner {
        started: AtomicUsize::new(0),
    });

    scheduler.schedule("jobs", "slow", every(&clock, 1), runner.clone(), JobVersion::default(), 0.0);
    tokio::time::sleep(Duration::from_millis(3500)).await;

    assert_eq!(runner.started.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_events_are_emitted() {
    let clock = Arc::new(TokioClock::new());
    let handler = RecordingHandler::new();
    let bus = Arc::new(EventBus::new());
    bus.register(handler.clone()).await;
    let scheduler = node(store(), clock.clone()).with_event_bus(bus);
    let runner = Arc::new(RecordingRunner::new());
    let id = JobId::new("tick");

    scheduler.schedule("jobs", id.clone(), every(&clock, 1), runner.clone(), JobVersion::default(), 0.0);
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert!(scheduler.deschedule("jobs", &id));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let events = handler.events().await;
    assert!(matches!(events.first(), Some(Event::JobScheduled { .. })));
    assert!(matches!(events.last(), Some(Event::JobDescheduled { .. })));
    assert_eq!(
        handler.count(|e| matches!(e, Event::JobFired { .. })).await,
        2
    );
    assert!(events.iter().all(|e| e.job_id() == &id));
}

#[tokio::test(start_paused = true)]
async fn test_failing_runner_reports_every_failure() {
    let clock = Arc::new(TokioClock::new());
    let handler = RecordingHandler::new();
    let bus = Arc::new(EventBus::new());
    bus.register(handler.clone()).await;
    let scheduler = node(store(), clock.clone()).with_event_bus(bus);
    let runner = Arc::new(FailingRunner::new());

    scheduler.schedule("jobs", "broken", every(&clock, 1), runner.clone(), JobVersion::default(), 0.0);
    tokio::time::sleep(Duration::from_millis(3500)).await;

    assert_eq!(runner.attempts(), 3);
    assert_eq!(
        handler
            .count(|e| matches!(e, Event::RunnerFailed { .. }))
            .await,
        3
    );
    assert!(scheduler.is_scheduled("jobs", &JobId::new("broken")));
}

#[tokio::test(start_paused = true)]
async fn test_jittered_fires_stay_within_bound() {
    let clock = Arc::new(TokioClock::new());
    let handler = RecordingHandler::new();
    let bus = Arc::new(EventBus::new());
    bus.register(handler.clone()).await;
    let scheduler = node(store(), clock.clone()).with_event_bus(bus);
    let runner = Arc::new(RecordingRunner::new());

    // Requested jitter is clamped to the 0.5 limit: at most 5s late.
    let job = every(&clock, 10).with_jitter(0.9);
    scheduler.schedule("jobs", "jittered", job, runner.clone(), JobVersion::default(), 0.5);
    tokio::time::sleep(Duration::from_secs(36)).await;

    let lags: Vec<i64> = handler
        .events()
        .await
        .iter()
        .filter_map(|e| e.fire_lag())
        .map(|lag| lag.num_milliseconds())
        .collect();

    assert!(lags.len() >= 3, "expected at least 3 fires, got {}", lags.len());
    for lag in lags {
        // Timers resolve to the millisecond, so allow the bound itself.
        assert!((0..=5000).contains(&lag), "lag {}ms out of range", lag);
    }
}

#[tokio::test(start_paused = true)]
async fn test_rescheduling_an_updated_job() {
    let clock = Arc::new(TokioClock::new());
    let scheduler = node(store(), clock.clone());
    let runner = Arc::new(RecordingRunner::new());
    let id = JobId::new("tick");

    scheduler.schedule("jobs", id.clone(), every(&clock, 1), runner.clone(), JobVersion::new(1, 0, 1), 0.0);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(runner.fire_count(), 1);

    // An updated definition replaces the old entry only after a deschedule.
    assert!(scheduler.deschedule("jobs", &id));
    assert!(scheduler.schedule("jobs", id.clone(), every(&clock, 5), runner.clone(), JobVersion::new(2, 1, 1), 0.0));
    tokio::time::sleep(Duration::from_millis(3000)).await;
    assert_eq!(runner.fire_count(), 1);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(runner.fire_count(), 2);
}
