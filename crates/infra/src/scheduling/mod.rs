//! Polling scheduler and its errors.

pub mod error;
pub mod poll_scheduler;

pub use error::SchedulerError;
pub use poll_scheduler::{PollScheduler, PollSchedulerConfig};
