#![forbid(unsafe_code)]

//! Per-stream tuning.

use std::env;

/// Environment variable overriding [`StreamConfig::purge_threshold`].
pub const PURGE_THRESHOLD_ENV: &str = "RIPPLE_PURGE_THRESHOLD";

/// Default number of dead handler entries that triggers a registry purge.
pub const DEFAULT_PURGE_THRESHOLD: usize = 5;

/// Configuration applied to a source's handler registry.
///
/// Derived streams inherit the configuration of their (left) parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Dead entries discovered during one dispatch pass that trigger a purge.
    /// Clamped to at least 1.
    pub purge_threshold: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            purge_threshold: DEFAULT_PURGE_THRESHOLD,
        }
    }
}

impl StreamConfig {
    /// Set the purge threshold.
    #[must_use]
    pub fn with_purge_threshold(mut self, threshold: usize) -> Self {
        self.purge_threshold = threshold.max(1);
        self
    }

    /// Defaults, overridden by `RIPPLE_PURGE_THRESHOLD` when it parses as a
    /// positive integer.
    #[must_use]
    pub fn from_env() -> Self {
        let config = Self::default();
        match env::var(PURGE_THRESHOLD_ENV)
            .ok()
            .and_then(|raw| raw.trim().parse::<usize>().ok())
        {
            Some(threshold) if threshold > 0 => config.with_purge_threshold(threshold),
            _ => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_threshold_is_five() {
        assert_eq!(StreamConfig::default().purge_threshold, 5);
    }

    #[test]
    fn threshold_clamped_to_one() {
        assert_eq!(
            StreamConfig::default()
                .with_purge_threshold(0)
                .purge_threshold,
            1
        );
    }
}
