//! Configuration type definitions.
//!
//! Shapes of the global settings file (`leasehold.yaml`) and of the
//! per-job YAML files in a jobs directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::schedule::IntervalUnit;
use crate::history::DEFAULT_HISTORY_COLLECTION;
use crate::lock::DEFAULT_LOCK_COLLECTION;
use crate::scheduler::DEFAULT_JITTER_LIMIT;

/// Collection a job belongs to when its file does not name one.
pub const DEFAULT_JOB_COLLECTION: &str = "jobs";

/// Global configuration (leasehold.yaml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Cluster-wide cap on the jitter fraction a job may request.
    pub jitter_limit: f64,
    /// Whether to record execution history.
    pub history_enabled: bool,
    /// Name of the collection holding leases.
    pub lock_collection: String,
    /// Name of the collection holding execution history.
    pub history_collection: String,
    /// Storage configuration.
    pub storage: StorageConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            jitter_limit: DEFAULT_JITTER_LIMIT,
            history_enabled: false,
            lock_collection: DEFAULT_LOCK_COLLECTION.to_string(),
            history_collection: DEFAULT_HISTORY_COLLECTION.to_string(),
            storage: StorageConfig::default(),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StorageConfig {
    /// In-memory storage (default, non-persistent, single process).
    #[serde(rename = "memory")]
    #[default]
    Memory,
    /// SQLite storage, shared by every process pointing at the same file.
    #[serde(rename = "sqlite")]
    Sqlite {
        /// Path to the database file.
        path: String,
    },
}

/// Job configuration from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Job identifier, unique within its collection.
    pub id: String,
    /// Collection the job belongs to.
    #[serde(default = "default_collection")]
    pub collection: String,
    /// When the job fires.
    pub schedule: ScheduleConfig,
    /// Whether the job is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Lease duration used by runners that lock the job.
    #[serde(default)]
    pub lock_duration_seconds: Option<i64>,
    /// Fraction of the interval to randomly delay each fire by.
    #[serde(default)]
    pub jitter: Option<f64>,
    /// What to do when the job fires.
    #[serde(default)]
    pub runner: RunnerConfig,
}

fn default_true() -> bool {
    true
}

fn default_collection() -> String {
    DEFAULT_JOB_COLLECTION.to_string()
}

/// Schedule configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScheduleConfig {
    /// Cron expression, shortcut or `@every` interval, evaluated in UTC.
    Simple(String),
    /// Cron expression with timezone.
    Cron {
        /// Cron expression or shortcut.
        cron: String,
        /// IANA timezone for the schedule.
        timezone: Option<String>,
    },
    /// Fixed interval aligned to a start time.
    Interval {
        /// Number of units per period.
        interval: u64,
        /// Unit of the period.
        unit: IntervalUnit,
        /// Start of the interval grid; defaults to load time.
        start_time: Option<DateTime<Utc>>,
        /// Seconds to shift every occurrence by.
        delay: Option<u64>,
    },
}

/// Runner configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunnerConfig {
    /// Log every fire.
    #[default]
    Log,
    /// Run an external command.
    Command {
        /// The command to run.
        command: String,
        /// Command arguments.
        #[serde(default)]
        args: Vec<String>,
        /// Working directory.
        working_dir: Option<String>,
        /// Timeout in seconds.
        timeout_secs: Option<u64>,
        /// Extra environment variables.
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
}
