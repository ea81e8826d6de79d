//! A runner that only logs.

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::core::context::{JobExecutionContext, STATUS_SUCCESS};
use crate::core::job::JobDefinition;
use crate::core::runner::{JobRunner, RunnerError};

/// Logs every fire at `info` and reports success.
///
/// Useful for dry runs of a jobs directory: the schedule, jitter and lease
/// behaviour are all exercised without doing any work.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRunner;

#[async_trait]
impl JobRunner for LogRunner {
    async fn run_job(
        &self,
        job: &JobDefinition,
        ctx: &JobExecutionContext,
    ) -> Result<(), RunnerError> {
        let lease = match job.lock_duration_seconds() {
            Some(_) => match ctx.lock_service().acquire_for_job(job, ctx).await? {
                Some(lease) => Some(lease),
                None => return Ok(()),
            },
            None => None,
        };

        let lag = Utc::now() - ctx.expected_execution_time();
        info!(
            collection = %ctx.collection(),
            job_id = %ctx.job_id(),
            expected = %ctx.expected_execution_time(),
            lag_ms = lag.num_milliseconds(),
            "job fired"
        );
        ctx.set_job_status(STATUS_SUCCESS);

        ctx.lock_service().release(lease.as_ref()).await?;
        Ok(())
    }
}
