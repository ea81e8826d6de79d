//! Errors raised while loading settings and job files.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::schedule::ScheduleError;

/// Why a settings file or job directory could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot list job directory '{path}': {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{0}' is not a directory")]
    NotADirectory(PathBuf),

    /// Malformed YAML in an in-memory document.
    #[error("malformed YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("malformed YAML in '{path}': {source}")]
    YamlFile {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid schedule: {0}")]
    Schedule(#[from] ScheduleError),

    /// A job file parsed but describes an unusable job.
    #[error("job '{job_id}': {message}")]
    InvalidJob { job_id: String, message: String },

    /// The global settings are inconsistent.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("job '{job_id}' is defined twice in collection '{collection}' (again in '{path}')")]
    DuplicateJob {
        collection: String,
        job_id: String,
        path: PathBuf,
    },
}

impl ConfigError {
    pub(crate) fn invalid_job(job_id: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidJob {
            job_id: job_id.to_string(),
            message: message.into(),
        }
    }
}
