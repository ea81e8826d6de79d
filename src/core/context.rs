//! Execution context handed to a job runner on every fire.
//!
//! The context carries what the runner needs to coordinate with other
//! processes (a [`LockService`] handle) and a settable status that the
//! scheduler reads back for history recording.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};

use super::types::{JobId, JobVersion};
use crate::lock::LockService;

/// Status meaning "do not record this execution".
pub const STATUS_SUPPRESSED: i32 = -1;

/// Status a runner sets after a successful execution.
pub const STATUS_SUCCESS: i32 = 0;

/// Status a runner sets after a failed execution.
pub const STATUS_FAILURE: i32 = 1;

/// Context for one execution of a job.
pub struct JobExecutionContext {
    expected_execution_time: DateTime<Utc>,
    job_version: JobVersion,
    lock_service: LockService,
    collection: String,
    job_id: JobId,
    status: AtomicI32,
}

impl JobExecutionContext {
    /// Create a context. The job status starts out suppressed.
    pub fn new(
        expected_execution_time: DateTime<Utc>,
        job_version: JobVersion,
        lock_service: LockService,
        collection: impl Into<String>,
        job_id: impl Into<JobId>,
    ) -> Self {
        Self {
            expected_execution_time,
            job_version,
            lock_service,
            collection: collection.into(),
            job_id: job_id.into(),
            status: AtomicI32::new(STATUS_SUPPRESSED),
        }
    }

    /// The fire time the schedule asked for, before jitter.
    pub fn expected_execution_time(&self) -> DateTime<Utc> {
        self.expected_execution_time
    }

    /// Version of the job document this execution was scheduled from.
    pub fn job_version(&self) -> JobVersion {
        self.job_version
    }

    /// Lease manager shared by the cluster.
    pub fn lock_service(&self) -> &LockService {
        &self.lock_service
    }

    /// Collection that owns the job.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Job id.
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Outcome the runner reported.
    pub fn job_status(&self) -> i32 {
        self.status.load(Ordering::SeqCst)
    }

    /// Report the outcome of this execution.
    pub fn set_job_status(&self, status: i32) {
        self.status.store(status, Ordering::SeqCst);
    }

    /// Whether the outcome should be left out of history.
    pub fn is_suppressed(&self) -> bool {
        self.job_status() == STATUS_SUPPRESSED
    }
}

impl fmt::Debug for JobExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobExecutionContext")
            .field("collection", &self.collection)
            .field("job_id", &self.job_id)
            .field("expected_execution_time", &self.expected_execution_time)
            .field("job_version", &self.job_version)
            .field("status", &self.job_status())
            .finish_non_exhaustive()
    }
}
