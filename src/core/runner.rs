//! The job runner seam.
//!
//! The scheduler knows when a job fires, never what it does. Implement
//! [`JobRunner`] to supply the work.

use async_trait::async_trait;
use thiserror::Error;

use super::context::JobExecutionContext;
use super::job::JobDefinition;
use crate::lock::LockError;

/// Errors a runner can report back to the scheduler.
///
/// The scheduler logs these and keeps the reschedule chain going.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The job's work failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The job's work did not finish in time.
    #[error("job timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// External command failed with exit code.
    #[error("command exited with code {0}")]
    CommandFailed(i32),

    /// Talking to the lock service failed.
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// IO error while running the job.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Executes a job's work when its schedule fires.
///
/// # Example
///
/// ```ignore
/// use leasehold::{JobDefinition, JobExecutionContext, JobRunner, RunnerError};
/// use async_trait::async_trait;
///
/// struct Sweep;
///
/// #[async_trait]
/// impl JobRunner for Sweep {
///     async fn run_job(
///         &self,
///         job: &JobDefinition,
///         ctx: &JobExecutionContext,
///     ) -> Result<(), RunnerError> {
///         let Some(lock) = ctx.lock_service().acquire_for_job(job, ctx).await? else {
///             return Ok(()); // another node holds the lease
///         };
///         // ... do the work ...
///         ctx.lock_service().release(Some(&lock)).await?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Run one execution of `job`.
    async fn run_job(
        &self,
        job: &JobDefinition,
        ctx: &JobExecutionContext,
    ) -> Result<(), RunnerError>;
}
