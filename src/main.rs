//! leasehold - periodic jobs guarded by leases in a shared document store.
//!
//! Usage:
//!   leasehold run <jobs-dir> [--config FILE]   Schedule the jobs until Ctrl+C
//!   leasehold validate <jobs-dir>              Validate job configurations
//!   leasehold list <jobs-dir>                  List all jobs in the directory
//!   leasehold locks <jobs-dir>                 Show the lease each job contends on

use clap::{Parser, Subcommand};
use leasehold::config::{StorageConfig, YamlLoader};
use leasehold::{
    DocumentStore, Event, EventBus, EventHandler, GlobalConfig, HistoryRecorder,
    InMemoryDocumentStore, JobScheduler, JobVersion, LoadedJob, LockService, Schedule,
    load_jobs_from_directory,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// leasehold - periodic jobs guarded by leases in a shared document store
#[derive(Parser)]
#[command(name = "leasehold")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Schedule the jobs from a directory until interrupted
    Run {
        /// Path to the directory containing job YAML files
        #[arg(value_name = "JOBS_DIR")]
        jobs_dir: PathBuf,

        /// Global settings file (leasehold.yaml)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Validate job configurations without running
    Validate {
        /// Path to the directory containing job YAML files
        #[arg(value_name = "JOBS_DIR")]
        jobs_dir: PathBuf,
    },

    /// List all jobs in the directory
    List {
        /// Path to the directory containing job YAML files
        #[arg(value_name = "JOBS_DIR")]
        jobs_dir: PathBuf,
    },

    /// Print the lease id each job's runner contends on
    Locks {
        /// Path to the directory containing job YAML files
        #[arg(value_name = "JOBS_DIR")]
        jobs_dir: PathBuf,
    },
}

/// Logs scheduler lifecycle events.
struct LoggingHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &Event) {
        match event {
            Event::JobScheduled {
                collection,
                job_id,
                next_fire_time,
                ..
            } => match next_fire_time {
                Some(next) => info!("Job '{}/{}' scheduled, first fire at {}", collection, job_id, next),
                None => info!("Job '{}/{}' scheduled, no upcoming fire", collection, job_id),
            },
            Event::JobFired {
                collection,
                job_id,
                expected_time,
                actual_time,
                ..
            } => {
                let lag = *actual_time - *expected_time;
                info!(
                    "Job '{}/{}' fired ({} ms after expected)",
                    collection,
                    job_id,
                    lag.num_milliseconds()
                );
            }
            Event::JobDescheduled {
                collection, job_id, ..
            } => {
                info!("Job '{}/{}' descheduled", collection, job_id);
            }
            Event::RunnerFailed {
                collection,
                job_id,
                error,
                ..
            } => {
                warn!("Job '{}/{}' failed: {}", collection, job_id, error);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { jobs_dir, config } => {
            run_scheduler(jobs_dir, config).await?;
        }
        Commands::Validate { jobs_dir } => {
            validate_jobs(jobs_dir)?;
        }
        Commands::List { jobs_dir } => {
            list_jobs(jobs_dir)?;
        }
        Commands::Locks { jobs_dir } => {
            list_locks(jobs_dir)?;
        }
    }

    Ok(())
}

async fn open_store(
    config: &StorageConfig,
) -> Result<Arc<dyn DocumentStore>, Box<dyn std::error::Error>> {
    match config {
        StorageConfig::Memory => {
            info!("Using in-memory document store; leases are not shared between processes");
            Ok(Arc::new(InMemoryDocumentStore::new()))
        }
        #[cfg(feature = "sqlite")]
        StorageConfig::Sqlite { path } => {
            info!("Using SQLite document store at {}", path);
            Ok(Arc::new(leasehold::SqliteDocumentStore::new(path).await?))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageConfig::Sqlite { .. } => {
            Err("SQLite storage requires building with the 'sqlite' feature".into())
        }
    }
}

/// Run the scheduler with jobs from a directory.
async fn run_scheduler(
    jobs_dir: PathBuf,
    config_path: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let global = match config_path {
        Some(path) => {
            info!("Loading settings from: {}", path.display());
            YamlLoader::load_global_config(&path)?
        }
        None => GlobalConfig::default(),
    };

    info!("Loading jobs from: {}", jobs_dir.display());
    let jobs = load_jobs_from_directory(&jobs_dir)?;

    if jobs.is_empty() {
        warn!("No job files found in {}", jobs_dir.display());
        return Ok(());
    }

    let store = open_store(&global.storage).await?;
    let lock_service =
        LockService::new(store.clone()).with_collection(global.lock_collection.clone());

    let event_bus = Arc::new(EventBus::new());
    event_bus.register(Arc::new(LoggingHandler)).await;

    let mut scheduler = JobScheduler::new(lock_service)?.with_event_bus(event_bus);
    if global.history_enabled {
        scheduler = scheduler.with_history(
            HistoryRecorder::new(store).with_collection(global.history_collection.clone()),
        );
    }

    let mut scheduled = 0;
    for job in jobs {
        if scheduler.schedule(
            &job.collection,
            job.job_id.clone(),
            job.definition.clone(),
            job.runner.clone(),
            JobVersion::default(),
            global.jitter_limit,
        ) {
            scheduled += 1;
        } else {
            info!("  - {}/{} not scheduled", job.collection, job.job_id);
        }
    }

    info!("Scheduled {} job(s); press Ctrl+C to stop", scheduled);
    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");
    let mut pending = scheduler.deschedule_all();
    while !pending.is_empty() {
        // Timers caught mid-fire refuse to cancel; give them a moment.
        tokio::time::sleep(Duration::from_millis(50)).await;
        pending.retain(|(collection, job_id)| !scheduler.deschedule(collection, job_id));
    }

    info!("Goodbye!");
    Ok(())
}

/// Validate job configurations without running.
fn validate_jobs(jobs_dir: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    info!("Validating jobs in: {}", jobs_dir.display());

    match load_jobs_from_directory(&jobs_dir) {
        Ok(jobs) => {
            info!("All {} job(s) are valid:", jobs.len());
            for job in &jobs {
                info!("  - {}/{}: OK", job.collection, job.job_id);
            }
            Ok(())
        }
        Err(e) => {
            error!("Validation failed: {}", e);
            Err(e.into())
        }
    }
}

fn describe_schedule(schedule: &Schedule) -> String {
    match schedule {
        Schedule::Interval(s) => format!("every {} {:?} from {}", s.period(), s.unit(), s.start_time()),
        Schedule::Cron(s) => format!("cron '{}' ({})", s.expression(), s.timezone()),
    }
}

fn load_or_report(jobs_dir: &Path) -> Result<Option<Vec<LoadedJob>>, Box<dyn std::error::Error>> {
    let jobs = load_jobs_from_directory(jobs_dir)?;
    if jobs.is_empty() {
        println!("No jobs found in {}", jobs_dir.display());
        return Ok(None);
    }
    Ok(Some(jobs))
}

/// List all jobs in the directory.
fn list_jobs(jobs_dir: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let Some(jobs) = load_or_report(&jobs_dir)? else {
        return Ok(());
    };

    println!("Jobs in {}:", jobs_dir.display());
    println!();

    for job in &jobs {
        let definition = &job.definition;
        println!("ID: {}", job.job_id);
        println!("  Collection: {}", job.collection);
        println!("  Enabled: {}", definition.is_enabled());
        println!("  Schedule: {}", describe_schedule(definition.schedule()));
        if let Some(delay) = definition.schedule().delay() {
            println!("  Delay: {:?}", delay);
        }
        if let Some(next) = definition
            .schedule()
            .next_execution_time(None, chrono::Utc::now())
        {
            println!("  Next fire: {}", next);
        }
        match definition.lock_duration_seconds() {
            Some(secs) => println!("  Lease: {}s", secs),
            None => println!("  Lease: none"),
        }
        if let Some(jitter) = definition.jitter() {
            println!("  Jitter: {}", jitter);
        }
        println!("  Runner: {}", job.runner_kind);
        println!();
    }

    Ok(())
}

/// Print the lock id each job contends on.
fn list_locks(jobs_dir: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let Some(jobs) = load_or_report(&jobs_dir)? else {
        return Ok(());
    };

    for job in &jobs {
        let lease = job
            .definition
            .lock_duration_seconds()
            .map(|secs| format!("{}s", secs))
            .unwrap_or_else(|| "unguarded".to_string());
        println!("{}\t{}", job.lock_id(), lease);
    }

    Ok(())
}
