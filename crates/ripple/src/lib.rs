#![forbid(unsafe_code)]

//! Ripple public facade crate.
//!
//! Re-exports the stream kernel and, with the `runtime` feature (on by
//! default), the deadline scheduler.

pub use ripple_core as core;
#[cfg(feature = "runtime")]
pub use ripple_runtime as runtime;

pub mod prelude {
    pub use ripple_core::{
        Anchor, Clock, Either, Emitter, Event, Item, Joined, Pending, Source, Stream,
        StreamConfig, StreamError, SystemClock,
    };
    #[cfg(feature = "runtime")]
    pub use ripple_runtime::{DeadlineExt, DeadlineScheduler, ScheduleError, SchedulerConfig};
}
