//! Job definitions.
//!
//! A [`JobDefinition`] is what the scheduler needs to know about a job:
//! when it runs, whether it is enabled, how long its lease lasts and how much
//! jitter it tolerates. Everything job-type specific lives with the runner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::schedule::Schedule;

/// Errors that can occur when building a job definition.
#[derive(Debug, Error)]
pub enum JobError {
    /// Required field missing.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A field holds a value the scheduler cannot use.
    #[error("invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Scheduling parameters of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    name: String,
    schedule: Schedule,
    enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    enabled_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_update_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lock_duration_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    jitter: Option<f64>,
}

impl JobDefinition {
    /// Create an enabled job whose enabled time is `enabled_time`.
    pub fn new(name: impl Into<String>, schedule: Schedule, enabled_time: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            schedule,
            enabled: true,
            enabled_time: Some(enabled_time),
            last_update_time: Some(enabled_time),
            lock_duration_seconds: None,
            jitter: None,
        }
    }

    /// Start building a job definition.
    pub fn builder(name: impl Into<String>) -> JobDefinitionBuilder {
        JobDefinitionBuilder::new(name)
    }

    /// Set the lease duration used when the runner locks this job.
    pub fn with_lock_duration_seconds(mut self, seconds: i64) -> Self {
        self.lock_duration_seconds = Some(seconds);
        self
    }

    /// Set the jitter fraction.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Set enabled status. Disabling clears the enabled time.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        if !enabled {
            self.enabled_time = None;
        }
        self
    }

    /// Override the enabled time.
    pub fn with_enabled_time(mut self, enabled_time: Option<DateTime<Utc>>) -> Self {
        self.enabled_time = enabled_time;
        self
    }

    /// Job name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execution schedule.
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Whether the job should be scheduled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// When the job was enabled. A job without one is never scheduled.
    pub fn enabled_time(&self) -> Option<DateTime<Utc>> {
        self.enabled_time
    }

    /// When the job definition last changed.
    pub fn last_update_time(&self) -> Option<DateTime<Utc>> {
        self.last_update_time
    }

    /// Lease duration for locks taken on behalf of this job.
    pub fn lock_duration_seconds(&self) -> Option<i64> {
        self.lock_duration_seconds
    }

    /// Requested jitter fraction. Clamped by the scheduler's jitter limit.
    pub fn jitter(&self) -> Option<f64> {
        self.jitter
    }
}

/// Builder for [`JobDefinition`].
#[derive(Debug)]
pub struct JobDefinitionBuilder {
    name: String,
    schedule: Option<Schedule>,
    enabled: bool,
    enabled_time: Option<DateTime<Utc>>,
    last_update_time: Option<DateTime<Utc>>,
    lock_duration_seconds: Option<i64>,
    jitter: Option<f64>,
}

impl JobDefinitionBuilder {
    /// Create a new builder.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schedule: None,
            enabled: true,
            enabled_time: None,
            last_update_time: None,
            lock_duration_seconds: None,
            jitter: None,
        }
    }

    /// Set the schedule.
    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    /// Set enabled status.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the enabled time.
    pub fn enabled_time(mut self, time: DateTime<Utc>) -> Self {
        self.enabled_time = Some(time);
        self
    }

    /// Set the last update time.
    pub fn last_update_time(mut self, time: DateTime<Utc>) -> Self {
        self.last_update_time = Some(time);
        self
    }

    /// Set the lease duration.
    pub fn lock_duration_seconds(mut self, seconds: i64) -> Self {
        self.lock_duration_seconds = Some(seconds);
        self
    }

    /// Set the jitter fraction.
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Build the definition.
    pub fn build(self) -> Result<JobDefinition, JobError> {
        if self.name.is_empty() {
            return Err(JobError::MissingField("name"));
        }
        let schedule = self.schedule.ok_or(JobError::MissingField("schedule"))?;

        if let Some(seconds) = self.lock_duration_seconds
            && seconds < 0
        {
            return Err(JobError::InvalidField {
                field: "lock_duration_seconds",
                reason: format!("must not be negative, got {}", seconds),
            });
        }
        if let Some(jitter) = self.jitter
            && !jitter.is_finite()
        {
            return Err(JobError::InvalidField {
                field: "jitter",
                reason: "must be a finite number".to_string(),
            });
        }

        Ok(JobDefinition {
            name: self.name,
            schedule,
            enabled: self.enabled,
            enabled_time: if self.enabled { self.enabled_time } else { None },
            last_update_time: self.last_update_time.or(self.enabled_time),
            lock_duration_seconds: self.lock_duration_seconds,
            jitter: self.jitter,
        })
    }
}
