//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use leasehold::testing::TokioClock;
use leasehold::{
    DocumentStore, Event, EventHandler, IntervalUnit, JobDefinition, JobExecutionContext,
    JobRunner, JobScheduler, LockService, RunnerError, STATUS_SUCCESS, Schedule,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// A scheduler "node" over a shared store, reading time from `clock`.
pub fn node(store: Arc<dyn DocumentStore>, clock: Arc<TokioClock>) -> JobScheduler {
    let service = LockService::new(store).with_clock(clock.clone());
    JobScheduler::new(service).unwrap().with_clock(clock)
}

/// An enabled job firing every `seconds`, aligned to the clock's now.
pub fn every(clock: &TokioClock, seconds: u64) -> JobDefinition {
    use leasehold::Clock;
    let now = clock.now();
    JobDefinition::new(
        "job",
        Schedule::interval(now, seconds, IntervalUnit::Seconds).unwrap(),
        now,
    )
}

/// Runner that takes the job lease, holds it for `hold`, then releases it.
///
/// Counts runs that did the work and fires that found the lease taken.
pub struct LeasedRunner {
    hold: Duration,
    release: bool,
    runs: AtomicUsize,
    skipped: AtomicUsize,
}

impl LeasedRunner {
    pub fn new(hold: Duration) -> Arc<Self> {
        Arc::new(Self {
            hold,
            release: true,
            runs: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
        })
    }

    /// A runner that never releases, as if its process died mid-run.
    pub fn abandoning() -> Arc<Self> {
        Arc::new(Self {
            hold: Duration::ZERO,
            release: false,
            runs: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
        })
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobRunner for LeasedRunner {
    async fn run_job(
        &self,
        job: &JobDefinition,
        ctx: &JobExecutionContext,
    ) -> Result<(), RunnerError> {
        let Some(lease) = ctx.lock_service().acquire_for_job(job, ctx).await? else {
            self.skipped.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        };
        self.runs.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        ctx.set_job_status(STATUS_SUCCESS);
        if self.release {
            ctx.lock_service().release(Some(&lease)).await?;
        }
        Ok(())
    }
}

/// Recording event handler for verifying events.
pub struct RecordingHandler {
    events: Mutex<Vec<Event>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    pub async fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().await.iter().filter(|e| matches(e)).count()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) {
        self.events.lock().await.push(event.clone());
    }
}
