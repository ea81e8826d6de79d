//! leasehold - periodic job scheduling with lease-based mutual exclusion.
//!
//! Every process in a cluster runs its own [`JobScheduler`] over the same
//! jobs. Timers fire independently in each process; runners coordinate
//! through the [`LockService`], which keeps leases as versioned documents
//! in a shared [`DocumentStore`] and decides every race by optimistic
//! concurrency.

pub mod config;
pub mod core;
pub mod events;
pub mod execution;
pub mod history;
pub mod lock;
pub mod scheduler;
pub mod storage;
pub mod testing;

pub use config::{ConfigError, GlobalConfig, LoadedJob, load_jobs_from_directory};
pub use core::clock::{Clock, SystemClock};
pub use core::context::{
    JobExecutionContext, STATUS_FAILURE, STATUS_SUCCESS, STATUS_SUPPRESSED,
};
pub use core::job::{JobDefinition, JobDefinitionBuilder, JobError};
pub use core::runner::{JobRunner, RunnerError};
pub use core::schedule::{IntervalUnit, Schedule, ScheduleError};
pub use core::types::{JobId, JobVersion, LockId};
pub use events::{Event, EventBus, EventHandler};
pub use execution::{CommandRunner, LogRunner};
pub use history::{ExecutionRecord, HistoryError, HistoryRecorder};
pub use lock::{LockError, LockRecord, LockService, ResourceAttributes};
pub use scheduler::{JobScheduler, SchedulerError, SchedulingSnapshot};
pub use storage::{DocVersion, Document, DocumentStore, InMemoryDocumentStore, StorageError};
#[cfg(feature = "sqlite")]
pub use storage::SqliteDocumentStore;
