//! Scheduler lifecycle events and event handling.
//!
//! The reschedule chain runs on detached timer tasks, so hosts that want to
//! observe it register an [`EventHandler`] on an [`EventBus`] and hand the
//! bus to the scheduler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::core::types::JobId;

/// Lifecycle events emitted by the scheduler.
#[derive(Debug, Clone)]
pub enum Event {
    /// A job was armed for its first fire.
    JobScheduled {
        collection: String,
        job_id: JobId,
        next_fire_time: Option<DateTime<Utc>>,
        timestamp: Instant,
    },

    /// A job's timer fired and its runner is about to be invoked.
    JobFired {
        collection: String,
        job_id: JobId,
        expected_time: DateTime<Utc>,
        actual_time: DateTime<Utc>,
        timestamp: Instant,
    },

    /// A job was removed from the schedule.
    JobDescheduled {
        collection: String,
        job_id: JobId,
        timestamp: Instant,
    },

    /// A job's runner returned an error. The schedule continues.
    RunnerFailed {
        collection: String,
        job_id: JobId,
        error: String,
        timestamp: Instant,
    },
}

impl Event {
    /// When the event was created.
    pub fn timestamp(&self) -> Instant {
        match self {
            Event::JobScheduled { timestamp, .. }
            | Event::JobFired { timestamp, .. }
            | Event::JobDescheduled { timestamp, .. }
            | Event::RunnerFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Collection of the job the event is about.
    pub fn collection(&self) -> &str {
        match self {
            Event::JobScheduled { collection, .. }
            | Event::JobFired { collection, .. }
            | Event::JobDescheduled { collection, .. }
            | Event::RunnerFailed { collection, .. } => collection,
        }
    }

    /// Job the event is about.
    pub fn job_id(&self) -> &JobId {
        match self {
            Event::JobScheduled { job_id, .. }
            | Event::JobFired { job_id, .. }
            | Event::JobDescheduled { job_id, .. }
            | Event::RunnerFailed { job_id, .. } => job_id,
        }
    }

    pub fn job_scheduled(
        collection: impl Into<String>,
        job_id: JobId,
        next_fire_time: Option<DateTime<Utc>>,
    ) -> Self {
        Event::JobScheduled {
            collection: collection.into(),
            job_id,
            next_fire_time,
            timestamp: Instant::now(),
        }
    }

    pub fn job_fired(
        collection: impl Into<String>,
        job_id: JobId,
        expected_time: DateTime<Utc>,
        actual_time: DateTime<Utc>,
    ) -> Self {
        Event::JobFired {
            collection: collection.into(),
            job_id,
            expected_time,
            actual_time,
            timestamp: Instant::now(),
        }
    }

    pub fn job_descheduled(collection: impl Into<String>, job_id: JobId) -> Self {
        Event::JobDescheduled {
            collection: collection.into(),
            job_id,
            timestamp: Instant::now(),
        }
    }

    pub fn runner_failed(collection: impl Into<String>, job_id: JobId, error: String) -> Self {
        Event::RunnerFailed {
            collection: collection.into(),
            job_id,
            error,
            timestamp: Instant::now(),
        }
    }

    /// How late the fire ran relative to its schedule, for `JobFired`.
    pub fn fire_lag(&self) -> Option<chrono::TimeDelta> {
        match self {
            Event::JobFired {
                expected_time,
                actual_time,
                ..
            } => Some(*actual_time - *expected_time),
            _ => None,
        }
    }
}

/// Handler for receiving lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
