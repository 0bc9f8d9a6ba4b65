use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScheduleError>;

/// Errors returned when registering a deadline.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("delay must be finite (got {secs}s)")]
    NonFiniteDelay { secs: f64 },

    #[error("deadline is not representable by the monotonic clock")]
    Unrepresentable,

    #[error("failed to start deadline scheduler thread: {0}")]
    Spawn(#[from] io::Error),

    #[error("deadline scheduler has shut down")]
    ShutDown,
}
