//! Core types shared by every layer: identifiers, clocks, schedules, job
//! definitions and the runner seam.

pub mod clock;
pub mod context;
pub mod job;
pub mod runner;
pub mod schedule;
pub mod types;
