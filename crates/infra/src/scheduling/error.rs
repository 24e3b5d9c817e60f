//! Scheduler error types.

use thiserror::Error;

/// Errors from the poll scheduler lifecycle.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("scheduler is not running")]
    NotRunning,

    #[error("invalid daily refresh time '{0}', expected HH:MM")]
    InvalidDailyTime(String),

    #[error("cron job error: {0}")]
    Job(String),

    #[error("scheduler task panicked")]
    TaskPanicked,

    #[error("scheduler task did not stop within the join timeout")]
    JoinTimeout,
}

impl From<tokio_cron_scheduler::JobSchedulerError> for SchedulerError {
    fn from(err: tokio_cron_scheduler::JobSchedulerError) -> Self {
        Self::Job(err.to_string())
    }
}
