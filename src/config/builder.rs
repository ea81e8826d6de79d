//! Job builder from YAML configuration.
//!
//! Converts [`JobConfig`] into a [`JobDefinition`] plus the runner that
//! backs it, ready to hand to [`crate::JobScheduler::schedule`].

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::error::ConfigError;
use super::types::{JobConfig, RunnerConfig, ScheduleConfig};
use super::yaml::YamlLoader;
use crate::core::job::JobDefinition;
use crate::core::runner::JobRunner;
use crate::core::schedule::Schedule;
use crate::core::types::{JobId, LockId};
use crate::execution::{CommandRunner, LogRunner};
use crate::lock::job_lock_id;

/// A job loaded from configuration.
#[derive(Clone)]
pub struct LoadedJob {
    /// Collection the job belongs to.
    pub collection: String,
    /// Job id within the collection.
    pub job_id: JobId,
    /// Scheduling parameters.
    pub definition: JobDefinition,
    /// What runs on every fire.
    pub runner: Arc<dyn JobRunner>,
    /// Short description of the runner, for listings.
    pub runner_kind: &'static str,
}

impl LoadedJob {
    /// Id of the lease this job's runner contends on.
    pub fn lock_id(&self) -> LockId {
        job_lock_id(&self.collection, self.job_id.as_str())
    }
}

impl std::fmt::Debug for LoadedJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedJob")
            .field("collection", &self.collection)
            .field("job_id", &self.job_id)
            .field("definition", &self.definition)
            .field("runner_kind", &self.runner_kind)
            .finish()
    }
}

/// Builder for creating jobs from YAML configuration.
pub struct JobConfigBuilder;

impl JobConfigBuilder {
    /// Build a job from a JobConfig.
    ///
    /// `now` becomes the job's enabled time and the default start of
    /// interval schedules.
    pub fn build(config: JobConfig, now: DateTime<Utc>) -> Result<LoadedJob, ConfigError> {
        let schedule = Self::build_schedule(&config.schedule, now)?;

        let mut builder = JobDefinition::builder(&config.id)
            .schedule(schedule)
            .enabled(config.enabled)
            .enabled_time(now)
            .last_update_time(now);
        if let Some(seconds) = config.lock_duration_seconds {
            builder = builder.lock_duration_seconds(seconds);
        }
        if let Some(jitter) = config.jitter {
            builder = builder.jitter(jitter);
        }
        let definition = builder
            .build()
            .map_err(|e| ConfigError::invalid_job(&config.id, e.to_string()))?;

        let (runner, runner_kind) = Self::build_runner(&config.runner);

        Ok(LoadedJob {
            collection: config.collection,
            job_id: JobId::new(config.id),
            definition,
            runner,
            runner_kind,
        })
    }

    fn build_schedule(
        config: &ScheduleConfig,
        now: DateTime<Utc>,
    ) -> Result<Schedule, ConfigError> {
        let schedule = match config {
            ScheduleConfig::Simple(expr) => Schedule::parse(expr, "UTC", now)?,
            ScheduleConfig::Cron { cron, timezone } => {
                Schedule::parse(cron, timezone.as_deref().unwrap_or("UTC"), now)?
            }
            ScheduleConfig::Interval {
                interval,
                unit,
                start_time,
                delay,
            } => {
                let schedule = Schedule::interval(start_time.unwrap_or(now), *interval, *unit)?;
                match delay {
                    Some(secs) => schedule.with_delay(Duration::from_secs(*secs)),
                    None => schedule,
                }
            }
        };
        Ok(schedule)
    }

    fn build_runner(config: &RunnerConfig) -> (Arc<dyn JobRunner>, &'static str) {
        match config {
            RunnerConfig::Log => (Arc::new(LogRunner), "log"),
            RunnerConfig::Command {
                command,
                args,
                working_dir,
                timeout_secs,
                env,
            } => {
                let mut builder = CommandRunner::builder(command).args(args);
                for (key, value) in env {
                    builder = builder.env(key, value);
                }
                if let Some(dir) = working_dir {
                    builder = builder.working_dir(dir);
                }
                if let Some(secs) = timeout_secs {
                    builder = builder.timeout(Duration::from_secs(*secs));
                }
                (Arc::new(builder.build()), "command")
            }
        }
    }
}

/// Load all job configurations from a directory.
///
/// Files are read in name order. Two files defining the same job in the
/// same collection are rejected.
pub fn load_jobs_from_directory(dir: impl AsRef<Path>) -> Result<Vec<LoadedJob>, ConfigError> {
    let dir = dir.as_ref();

    if !dir.is_dir() {
        return Err(ConfigError::NotADirectory(dir.to_path_buf()));
    }

    let read_dir_error = |source| ConfigError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_dir_error)? {
        let path = entry.map_err(read_dir_error)?.path();
        // Only process .yaml and .yml files
        if let Some(ext) = path.extension()
            && (ext == "yaml" || ext == "yml")
        {
            paths.push(path);
        }
    }
    paths.sort();

    let now = Utc::now();
    let mut seen = HashSet::new();
    let mut jobs = Vec::with_capacity(paths.len());
    for path in paths {
        let config = YamlLoader::load_job_config(&path)?;
        let job = JobConfigBuilder::build(config, now)?;
        if !seen.insert((job.collection.clone(), job.job_id.clone())) {
            return Err(ConfigError::DuplicateJob {
                collection: job.collection,
                job_id: job.job_id.to_string(),
                path,
            });
        }
        jobs.push(job);
    }

    Ok(jobs)
}
