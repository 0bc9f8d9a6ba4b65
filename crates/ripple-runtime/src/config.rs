#![forbid(unsafe_code)]

//! Scheduler configuration.

use std::env;

/// Environment variable overriding [`SchedulerConfig::thread_name`].
pub const THREAD_NAME_ENV: &str = "RIPPLE_SCHEDULER_THREAD";

/// Name given to the timer thread unless configured otherwise.
pub const DEFAULT_THREAD_NAME: &str = "ripple-deadline";

/// Configuration for a [`DeadlineScheduler`](crate::DeadlineScheduler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Name of the background timer thread.
    pub thread_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
        }
    }
}

impl SchedulerConfig {
    /// Set the timer thread name.
    #[must_use]
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Defaults, overridden by `RIPPLE_SCHEDULER_THREAD` when set and
    /// non-empty.
    #[must_use]
    pub fn from_env() -> Self {
        let config = Self::default();
        match env::var(THREAD_NAME_ENV) {
            Ok(name) if !name.trim().is_empty() => config.with_thread_name(name.trim()),
            _ => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thread_name() {
        assert_eq!(SchedulerConfig::default().thread_name, "ripple-deadline");
    }

    #[test]
    fn builder_overrides_name() {
        let config = SchedulerConfig::default().with_thread_name("timers");
        assert_eq!(config.thread_name, "timers");
    }
}
