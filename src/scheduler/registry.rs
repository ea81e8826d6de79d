//! In-memory bookkeeping of scheduled jobs.
//!
//! The registry is a map of collections to per-collection buckets. Each
//! bucket holds the active jobs, the disabled jobs, and the lock that
//! serializes `schedule`/`deschedule` decisions for that collection.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::timer::TimerHandle;
use crate::core::job::JobDefinition;
use crate::core::types::JobId;

#[derive(Debug, Default, Clone, Copy)]
struct FireTimes {
    last_expected: Option<DateTime<Utc>>,
    last_actual: Option<DateTime<Utc>>,
    next_expected: Option<DateTime<Utc>>,
}

/// Scheduling state of one job.
#[derive(Debug)]
pub struct JobSchedulingInfo {
    collection: String,
    job_id: JobId,
    job: JobDefinition,
    descheduled: AtomicBool,
    times: Mutex<FireTimes>,
    timer: Mutex<Option<TimerHandle>>,
}

/// Point-in-time copy of a job's scheduling state.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulingSnapshot {
    pub collection: String,
    pub job_id: JobId,
    pub descheduled: bool,
    /// Whether a timer is waiting to fire.
    pub pending: bool,
    pub last_expected_fire_time: Option<DateTime<Utc>>,
    pub last_actual_fire_time: Option<DateTime<Utc>>,
    pub next_expected_fire_time: Option<DateTime<Utc>>,
}

impl JobSchedulingInfo {
    pub fn new(collection: impl Into<String>, job_id: impl Into<JobId>, job: JobDefinition) -> Self {
        Self {
            collection: collection.into(),
            job_id: job_id.into(),
            job,
            descheduled: AtomicBool::new(false),
            times: Mutex::new(FireTimes::default()),
            timer: Mutex::new(None),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Definition the job was scheduled with.
    pub fn job(&self) -> &JobDefinition {
        &self.job
    }

    pub fn is_descheduled(&self) -> bool {
        self.descheduled.load(Ordering::SeqCst)
    }

    /// Mark the entry terminal. In-flight timer callbacks become no-ops.
    pub(crate) fn mark_descheduled(&self) {
        self.descheduled.store(true, Ordering::SeqCst);
    }

    pub fn next_expected_fire_time(&self) -> Option<DateTime<Utc>> {
        self.times.lock().next_expected
    }

    pub fn last_expected_fire_time(&self) -> Option<DateTime<Utc>> {
        self.times.lock().last_expected
    }

    pub fn last_actual_fire_time(&self) -> Option<DateTime<Utc>> {
        self.times.lock().last_actual
    }

    pub(crate) fn set_next_expected_fire_time(&self, time: DateTime<Utc>) {
        self.times.lock().next_expected = Some(time);
    }

    /// Record a fire at `now`; returns the fire time that was expected.
    pub(crate) fn record_fire(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut times = self.times.lock();
        times.last_expected = times.next_expected;
        times.last_actual = Some(now);
        times.last_expected
    }

    /// Whether a timer is waiting or firing for this entry.
    ///
    /// A timer that fired without re-arming, or was cancelled, no longer
    /// counts.
    pub fn is_armed(&self) -> bool {
        self.timer.lock().as_ref().is_some_and(TimerHandle::is_live)
    }

    /// Arm a timer, replacing the previous handle.
    ///
    /// The slot stays locked while `arm` runs so a timer that fires
    /// immediately cannot have its successor overwritten.
    pub(crate) fn arm_timer(&self, arm: impl FnOnce() -> TimerHandle) {
        let mut slot = self.timer.lock();
        *slot = Some(arm());
    }

    /// Cancel the pending timer. Returns `false` if it is firing right now.
    pub(crate) fn cancel_timer(&self) -> bool {
        match self.timer.lock().as_ref() {
            Some(timer) => timer.cancel(),
            None => true,
        }
    }

    pub fn snapshot(&self) -> SchedulingSnapshot {
        let times = *self.times.lock();
        SchedulingSnapshot {
            collection: self.collection.clone(),
            job_id: self.job_id.clone(),
            descheduled: self.is_descheduled(),
            pending: self
                .timer
                .lock()
                .as_ref()
                .is_some_and(TimerHandle::is_pending),
            last_expected_fire_time: times.last_expected,
            last_actual_fire_time: times.last_actual,
            next_expected_fire_time: times.next_expected,
        }
    }
}

/// Jobs of one collection.
#[derive(Debug, Default)]
pub struct CollectionJobs {
    guard: Mutex<()>,
    active: DashMap<JobId, Arc<JobSchedulingInfo>>,
    disabled: DashMap<JobId, Arc<JobSchedulingInfo>>,
}

impl CollectionJobs {
    /// Serialize scheduling decisions for this collection.
    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        self.guard.lock()
    }

    pub fn get_job(&self, job_id: &JobId) -> Option<Arc<JobSchedulingInfo>> {
        self.active.get(job_id).map(|entry| entry.value().clone())
    }

    /// Add an active job. Enabling a job evicts it from the disabled view.
    pub fn add_job(&self, job_id: JobId, info: Arc<JobSchedulingInfo>) {
        self.disabled.remove(&job_id);
        self.active.insert(job_id, info);
    }

    pub fn remove_job(&self, job_id: &JobId) -> Option<Arc<JobSchedulingInfo>> {
        self.active.remove(job_id).map(|(_, info)| info)
    }

    pub fn get_disabled_job(&self, job_id: &JobId) -> Option<Arc<JobSchedulingInfo>> {
        self.disabled.get(job_id).map(|entry| entry.value().clone())
    }

    pub fn add_disabled_job(&self, job_id: JobId, info: Arc<JobSchedulingInfo>) {
        self.disabled.insert(job_id, info);
    }

    pub fn remove_disabled_job(&self, job_id: &JobId) -> Option<Arc<JobSchedulingInfo>> {
        self.disabled.remove(job_id).map(|(_, info)| info)
    }

    /// Ids of the active jobs, sorted.
    pub fn job_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.active.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Ids of the disabled jobs, sorted.
    pub fn disabled_job_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.disabled.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

/// Registry of scheduled jobs, by collection.
#[derive(Debug, Default)]
pub struct JobRegistry {
    collections: RwLock<HashMap<String, Arc<CollectionJobs>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bucket for `collection`, created on first use.
    pub fn jobs_by_collection(&self, collection: &str) -> Arc<CollectionJobs> {
        if let Some(jobs) = self.collections.read().get(collection) {
            return jobs.clone();
        }
        let mut collections = self.collections.write();
        collections
            .entry(collection.to_string())
            .or_default()
            .clone()
    }

    /// Bucket for `collection`, if one was ever created.
    pub fn find_collection(&self, collection: &str) -> Option<Arc<CollectionJobs>> {
        self.collections.read().get(collection).cloned()
    }

    pub fn get_job(&self, collection: &str, job_id: &JobId) -> Option<Arc<JobSchedulingInfo>> {
        self.find_collection(collection)?.get_job(job_id)
    }

    pub fn add_job(&self, collection: &str, job_id: JobId, info: Arc<JobSchedulingInfo>) {
        self.jobs_by_collection(collection).add_job(job_id, info);
    }

    pub fn remove_job(&self, collection: &str, job_id: &JobId) -> Option<Arc<JobSchedulingInfo>> {
        self.find_collection(collection)?.remove_job(job_id)
    }

    pub fn get_disabled_job(
        &self,
        collection: &str,
        job_id: &JobId,
    ) -> Option<Arc<JobSchedulingInfo>> {
        self.find_collection(collection)?.get_disabled_job(job_id)
    }

    pub fn add_disabled_job(&self, collection: &str, job_id: JobId, info: Arc<JobSchedulingInfo>) {
        self.jobs_by_collection(collection)
            .add_disabled_job(job_id, info);
    }

    pub fn remove_disabled_job(
        &self,
        collection: &str,
        job_id: &JobId,
    ) -> Option<Arc<JobSchedulingInfo>> {
        self.find_collection(collection)?
            .remove_disabled_job(job_id)
    }

    /// Names of every collection seen so far, sorted.
    pub fn collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }
}
