//! Built-in job runners.
//!
//! The scheduler is agnostic to what a job does; these runners back the
//! command-line host. Library users implement [`crate::JobRunner`] directly.

mod command;
mod log;

pub use command::{CommandRunner, CommandRunnerBuilder};
pub use log::LogRunner;
