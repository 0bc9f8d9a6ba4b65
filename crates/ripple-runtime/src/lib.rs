#![forbid(unsafe_code)]

//! Runtime: the deadline scheduler and time-bounded stream combinators.
//!
//! ```no_run
//! use ripple_core::{Anchor, Source};
//! use ripple_runtime::DeadlineExt;
//! use web_time::Duration;
//!
//! let anchor = Anchor::new();
//! let source = Source::<u32>::new();
//! let bounded = source.within(&anchor, Duration::from_millis(250))?;
//! # let _ = bounded;
//! # Ok::<(), ripple_runtime::ScheduleError>(())
//! ```

pub mod config;
pub mod deadline;
pub mod error;
pub mod scheduler;

pub use config::SchedulerConfig;
pub use deadline::DeadlineExt;
pub use error::{Result, ScheduleError};
pub use scheduler::DeadlineScheduler;
