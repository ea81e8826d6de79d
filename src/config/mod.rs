//! Configuration loading and parsing.
//!
//! This module provides YAML-based configuration for jobs and global settings.

mod builder;
mod error;
mod types;
mod yaml;

pub use builder::{JobConfigBuilder, LoadedJob, load_jobs_from_directory};
pub use error::ConfigError;
pub use types::{
    DEFAULT_JOB_COLLECTION, GlobalConfig, JobConfig, RunnerConfig, ScheduleConfig, StorageConfig,
};
pub use yaml::YamlLoader;
