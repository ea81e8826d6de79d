//! YAML configuration parsing.
//!
//! Parses job definitions and global configuration from YAML files.

use std::path::Path;

use super::error::ConfigError;
use super::types::{GlobalConfig, JobConfig, RunnerConfig, ScheduleConfig, StorageConfig};
use crate::scheduler::validate_jitter_limit;

/// YAML configuration loader.
pub struct YamlLoader;

impl YamlLoader {
    /// Load global configuration from a file.
    pub fn load_global_config(path: impl AsRef<Path>) -> Result<GlobalConfig, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let config: GlobalConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFile {
                path: path.to_path_buf(),
                source,
            })?;
        Self::validate_global_config(&config)?;
        Ok(config)
    }

    /// Parse global configuration from a YAML string.
    pub fn parse_global_config(yaml: &str) -> Result<GlobalConfig, ConfigError> {
        let config: GlobalConfig = serde_yaml::from_str(yaml)?;
        Self::validate_global_config(&config)?;
        Ok(config)
    }

    /// Load a job configuration from a file.
    pub fn load_job_config(path: impl AsRef<Path>) -> Result<JobConfig, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let config: JobConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFile {
                path: path.to_path_buf(),
                source,
            })?;
        Self::validate_job_config(&config)?;
        Ok(config)
    }

    /// Parse a job configuration from a YAML string.
    pub fn parse_job_config(yaml: &str) -> Result<JobConfig, ConfigError> {
        let config: JobConfig = serde_yaml::from_str(yaml)?;
        Self::validate_job_config(&config)?;
        Ok(config)
    }

    fn validate_global_config(config: &GlobalConfig) -> Result<(), ConfigError> {
        validate_jitter_limit(config.jitter_limit)
            .map_err(|e| ConfigError::InvalidSettings(e.to_string()))?;

        if config.lock_collection.is_empty() {
            return Err(ConfigError::MissingField("lock_collection".into()));
        }
        if config.history_collection.is_empty() {
            return Err(ConfigError::MissingField("history_collection".into()));
        }
        if config.lock_collection == config.history_collection {
            return Err(ConfigError::InvalidSettings(format!(
                "lock and history collections must differ, both are '{}'",
                config.lock_collection
            )));
        }
        if let StorageConfig::Sqlite { path } = &config.storage
            && path.is_empty()
        {
            return Err(ConfigError::MissingField("storage.path".into()));
        }
        Ok(())
    }

    /// Validate a job configuration.
    fn validate_job_config(config: &JobConfig) -> Result<(), ConfigError> {
        if config.id.is_empty() {
            return Err(ConfigError::MissingField("id".into()));
        }
        if config.collection.is_empty() {
            return Err(ConfigError::MissingField("collection".into()));
        }

        match &config.schedule {
            ScheduleConfig::Simple(expr) | ScheduleConfig::Cron { cron: expr, .. }
                if expr.trim().is_empty() =>
            {
                return Err(ConfigError::MissingField("schedule".into()));
            }
            ScheduleConfig::Interval { interval: 0, .. } => {
                return Err(ConfigError::invalid_job(&config.id, "interval must be positive"));
            }
            _ => {}
        }

        if let Some(seconds) = config.lock_duration_seconds
            && seconds < 0
        {
            return Err(ConfigError::invalid_job(
                &config.id,
                format!("lock_duration_seconds must not be negative, got {}", seconds),
            ));
        }

        if let Some(jitter) = config.jitter
            && !(jitter.is_finite() && (0.0..=1.0).contains(&jitter))
        {
            return Err(ConfigError::invalid_job(
                &config.id,
                format!("jitter must be between 0 and 1, got {}", jitter),
            ));
        }

        if let RunnerConfig::Command {
            command,
            timeout_secs,
            ..
        } = &config.runner
        {
            if command.is_empty() {
                return Err(ConfigError::MissingField("runner.command".into()));
            }
            if *timeout_secs == Some(0) {
                return Err(ConfigError::invalid_job(&config.id, "timeout_secs cannot be zero"));
            }
        }

        Ok(())
    }
}
