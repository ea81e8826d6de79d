//! Timer-driven job scheduling.
//!
//! [`JobScheduler`] arms one timer per job. When a timer fires, the next
//! timer is armed before the runner is invoked, so a slow or failing run
//! never delays the schedule. Whether a run actually does work across a
//! cluster is decided by the runner through the lock service.

mod engine;
mod registry;
mod timer;
mod types;

pub use engine::{JobScheduler, jitter_delay};
pub use registry::{CollectionJobs, JobRegistry, JobSchedulingInfo, SchedulingSnapshot};
pub use types::{DEFAULT_JITTER_LIMIT, SchedulerError, validate_jitter_limit};
