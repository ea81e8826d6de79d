//! Testing utilities for users of the leasehold library.
//!
//! This module provides helpers for testing lease and scheduling logic:
//!
//! - [`ManualClock`]: A clock that only moves when told to
//! - [`TokioClock`]: A clock that follows tokio's (possibly paused) time
//! - [`RecordingRunner`]: A runner that records every fire
//! - [`FailingRunner`]: A runner that always fails
//! - [`FailingDocumentStore`]: A document store that can be switched to fail

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::core::clock::Clock;
use crate::core::context::{JobExecutionContext, STATUS_FAILURE, STATUS_SUCCESS};
use crate::core::job::JobDefinition;
use crate::core::runner::{JobRunner, RunnerError};
use crate::core::types::JobId;
use crate::storage::{
    DeleteOutcome, DocVersion, Document, DocumentStore, InMemoryDocumentStore, StorageError,
};

/// A clock pinned to a settable instant.
///
/// # Example
///
/// ```
/// use leasehold::testing::ManualClock;
/// use leasehold::Clock;
/// use chrono::{TimeZone, Utc};
///
/// let clock = ManualClock::new(Utc.timestamp_opt(1000, 0).unwrap());
/// clock.advance_secs(61);
/// assert_eq!(clock.now().timestamp(), 1061);
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock reading `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Jump to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    /// Move forward by `delta`.
    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock();
        *now += delta;
    }

    /// Move forward by whole seconds.
    pub fn advance_secs(&self, seconds: i64) {
        self.advance(TimeDelta::seconds(seconds));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// A wall clock driven by tokio's time source.
///
/// Under `#[tokio::test(start_paused = true)]` it advances with the
/// runtime's virtual time, so schedules and timers agree.
#[derive(Debug)]
pub struct TokioClock {
    origin: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl TokioClock {
    /// Create a clock starting at the current wall time.
    pub fn new() -> Self {
        Self {
            origin: Utc::now(),
            started: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.started.elapsed()).unwrap_or(TimeDelta::MAX);
        self.origin
            .checked_add_signed(elapsed)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// A runner that records `(job_id, expected_execution_time)` for every fire
/// and reports success.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    fires: Mutex<Vec<(JobId, DateTime<Utc>)>>,
}

impl RecordingRunner {
    /// Create a new recording runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fires so far.
    pub fn fire_count(&self) -> usize {
        self.fires.lock().len()
    }

    /// All fires so far, in order.
    pub fn fires(&self) -> Vec<(JobId, DateTime<Utc>)> {
        self.fires.lock().clone()
    }
}

#[async_trait]
impl JobRunner for RecordingRunner {
    async fn run_job(
        &self,
        _job: &JobDefinition,
        ctx: &JobExecutionContext,
    ) -> Result<(), RunnerError> {
        self.fires
            .lock()
            .push((ctx.job_id().clone(), ctx.expected_execution_time()));
        ctx.set_job_status(STATUS_SUCCESS);
        Ok(())
    }
}

/// A runner that fails every time it is invoked.
#[derive(Debug, Default)]
pub struct FailingRunner {
    attempts: AtomicUsize,
}

impl FailingRunner {
    /// Create a new failing runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of invocations so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobRunner for FailingRunner {
    async fn run_job(
        &self,
        _job: &JobDefinition,
        ctx: &JobExecutionContext,
    ) -> Result<(), RunnerError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        ctx.set_job_status(STATUS_FAILURE);
        Err(RunnerError::ExecutionFailed(format!(
            "simulated failure on attempt {}",
            attempt
        )))
    }
}

/// A document store that fails with [`StorageError::Unavailable`] while
/// failing, and otherwise behaves like an [`InMemoryDocumentStore`].
///
/// Starts out failing.
#[derive(Default)]
pub struct FailingDocumentStore {
    inner: InMemoryDocumentStore,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FailingDocumentStore {
    /// Create a store that fails every call.
    pub fn new() -> Self {
        Self {
            inner: InMemoryDocumentStore::new(),
            failing: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    /// Switch failure on or off.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of calls made against the store.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("simulated outage".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FailingDocumentStore {
    async fn collection_exists(&self, name: &str) -> Result<bool, StorageError> {
        self.check()?;
        self.inner.collection_exists(name).await
    }

    async fn create_collection(&self, name: &str, schema: &Value) -> Result<bool, StorageError> {
        self.check()?;
        self.inner.create_collection(name, schema).await
    }

    async fn create_document(
        &self,
        collection: &str,
        id: &str,
        body: Value,
    ) -> Result<DocVersion, StorageError> {
        self.check()?;
        self.inner.create_document(collection, id, body).await
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StorageError> {
        self.check()?;
        self.inner.get_document(collection, id).await
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        body: Value,
        expected: DocVersion,
    ) -> Result<DocVersion, StorageError> {
        self.check()?;
        self.inner
            .update_document(collection, id, body, expected)
            .await
    }

    async fn delete_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<DeleteOutcome, StorageError> {
        self.check()?;
        self.inner.delete_document(collection, id).await
    }
}
