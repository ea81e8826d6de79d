//! External command runner.
//!
//! [`CommandRunner`] runs a shell command or executable each time its job
//! fires. It first takes the job's lease, so across a cluster of processes
//! sharing one document store only one of them runs the command per fire.
//!
//! # Quick Start
//!
//! ```rust
//! use leasehold::CommandRunner;
//! use std::time::Duration;
//!
//! let runner = CommandRunner::builder("./rotate_logs.sh")
//!     .arg("--keep=7")
//!     .env("LOG_DIR", "/var/log/app")
//!     .timeout(Duration::from_secs(300))
//!     .build();
//!
//! assert_eq!(runner.program(), "./rotate_logs.sh");
//! ```
//!
//! # Status reporting
//!
//! The runner reports through the execution context:
//!
//! - lease held elsewhere: status is left suppressed and the command is
//!   not started, so no history is recorded for this fire
//! - exit code 0: status 0
//! - non-zero exit, timeout or spawn failure: status 1 and an error
//!
//! The lease is released after the command finishes, whatever the outcome.
//!
//! **Process Termination**: When a timeout occurs, the subprocess is killed
//! when the underlying command future is dropped.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::core::context::{JobExecutionContext, STATUS_FAILURE, STATUS_SUCCESS};
use crate::core::job::JobDefinition;
use crate::core::runner::{JobRunner, RunnerError};

/// A runner that executes an external command under the job's lease.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    /// Program to execute
    program: String,
    /// Command arguments
    args: Vec<String>,
    /// Extra environment variables
    env: BTreeMap<String, String>,
    /// Working directory
    working_dir: Option<PathBuf>,
    /// Execution timeout
    timeout: Option<Duration>,
}

impl CommandRunner {
    /// Create a new builder for a command runner.
    pub fn builder(program: impl Into<String>) -> CommandRunnerBuilder {
        CommandRunnerBuilder::new(program)
    }

    /// Get the program being executed.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Get the command arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Get the extra environment variables.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Get the working directory.
    pub fn working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    /// Get the timeout duration.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn run_command(&self) -> Result<(), RunnerError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(&self.env);
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let output = match self.timeout {
            Some(duration) => timeout(duration, cmd.output())
                .await
                .map_err(|_| RunnerError::Timeout(duration))?
                .map_err(|e| RunnerError::ExecutionFailed(e.to_string()))?,
            None => cmd
                .output()
                .await
                .map_err(|e| RunnerError::ExecutionFailed(e.to_string()))?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.trim().is_empty() {
            debug!(program = %self.program, stdout = %stdout.trim_end(), "command output");
        }

        if output.status.success() {
            Ok(())
        } else {
            let code = output.status.code().unwrap_or(-1);
            warn!(program = %self.program, code, stderr = %stderr.trim_end(), "command failed");
            Err(RunnerError::CommandFailed(code))
        }
    }
}

#[async_trait]
impl JobRunner for CommandRunner {
    async fn run_job(
        &self,
        job: &JobDefinition,
        ctx: &JobExecutionContext,
    ) -> Result<(), RunnerError> {
        let lock_service = ctx.lock_service();
        let lease = match job.lock_duration_seconds() {
            Some(_) => match lock_service.acquire_for_job(job, ctx).await? {
                Some(lease) => Some(lease),
                None => {
                    debug!(
                        collection = %ctx.collection(),
                        job_id = %ctx.job_id(),
                        "lease held elsewhere, skipping run"
                    );
                    return Ok(());
                }
            },
            None => None,
        };

        info!(
            collection = %ctx.collection(),
            job_id = %ctx.job_id(),
            program = %self.program,
            "running command"
        );
        let result = self.run_command().await;
        ctx.set_job_status(if result.is_ok() {
            STATUS_SUCCESS
        } else {
            STATUS_FAILURE
        });

        if let Err(e) = lock_service.release(lease.as_ref()).await {
            warn!(job_id = %ctx.job_id(), error = %e, "failed to release lease");
        }
        result
    }
}

/// Builder for creating `CommandRunner` instances.
#[derive(Debug, Clone)]
pub struct CommandRunnerBuilder {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl CommandRunnerBuilder {
    /// Create a new builder with the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
            timeout: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a single environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the execution timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Build the `CommandRunner`.
    pub fn build(self) -> CommandRunner {
        CommandRunner {
            program: self.program,
            args: self.args,
            env: self.env,
            working_dir: self.working_dir,
            timeout: self.timeout,
        }
    }
}
