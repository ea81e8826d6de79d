//! Loading job directories and scheduling what they describe.

use leasehold::config::{StorageConfig, YamlLoader};
use leasehold::testing::TokioClock;
use leasehold::{ConfigError, DocumentStore, InMemoryDocumentStore, JobId, JobVersion, load_jobs_from_directory};
use std::path::Path;
use std::sync::Arc;

use crate::common::node;

fn write(dir: &Path, name: &str, yaml: &str) {
    std::fs::write(dir.join(name), yaml).unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_jobs_directory_is_scheduled() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "heartbeat.yaml",
        "id: heartbeat\nschedule: \"@every 30s\"\nlock_duration_seconds: 20\n",
    );
    write(
        dir.path(),
        "report.yml",
        r#"
id: report
collection: reports
schedule:
  cron: "0 9 * * *"
  timezone: Europe/Berlin
"#,
    );
    write(
        dir.path(),
        "paused.yaml",
        "id: paused\nschedule: \"@hourly\"\nenabled: false\n",
    );

    let jobs = load_jobs_from_directory(dir.path()).unwrap();
    assert_eq!(jobs.len(), 3);

    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let scheduler = node(store, Arc::new(TokioClock::new()));
    let scheduled: Vec<bool> = jobs
        .iter()
        .map(|job| {
            scheduler.schedule(
                &job.collection,
                job.job_id.clone(),
                job.definition.clone(),
                job.runner.clone(),
                JobVersion::default(),
                0.6,
            )
        })
        .collect();

    assert_eq!(scheduled.iter().filter(|s| **s).count(), 2);
    assert_eq!(scheduler.scheduled_job_ids("jobs"), vec![JobId::new("heartbeat")]);
    assert_eq!(scheduler.scheduled_job_ids("reports"), vec![JobId::new("report")]);
    assert!(!scheduler.is_scheduled("jobs", &JobId::new("paused")));

    assert!(scheduler.deschedule_all().is_empty());
    assert!(scheduler.scheduled_job_ids("jobs").is_empty());
}

#[test]
fn test_invalid_job_file_fails_the_whole_directory() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "good.yaml", "id: good\nschedule: \"@hourly\"\n");
    write(dir.path(), "bad.yaml", "id: bad\nschedule: \"not a schedule\"\n");

    assert!(matches!(
        load_jobs_from_directory(dir.path()),
        Err(ConfigError::Schedule(_))
    ));
}

#[test]
fn test_empty_directory_loads_no_jobs() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_jobs_from_directory(dir.path()).unwrap().is_empty());
}

#[test]
fn test_global_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("leasehold.yaml");
    std::fs::write(
        &path,
        "jitter_limit: 0.3\nhistory_enabled: true\nlock_collection: cluster-locks\n",
    )
    .unwrap();

    let config = YamlLoader::load_global_config(&path).unwrap();
    assert_eq!(config.jitter_limit, 0.3);
    assert!(config.history_enabled);
    assert_eq!(config.lock_collection, "cluster-locks");
    assert_eq!(config.storage, StorageConfig::Memory);
}

#[test]
fn test_missing_global_config_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.yaml");

    match YamlLoader::load_global_config(&path) {
        Err(ConfigError::Read { path: p, .. }) => assert_eq!(p, path),
        other => panic!("expected FileReadError, got {:?}", other),
    }
}
