//! Archival configuration

use std::path::PathBuf;

use serde::Serialize;

use crate::classification::Classification;
use crate::error::{ArchiveError, ArchiveResult};

/// Default size at which archival is recommended (~500 MB)
pub const DEFAULT_SIZE_THRESHOLD_BYTES: u64 = 500 * 1024 * 1024;

/// Retention policy for a single archival run
///
/// Immutable for the duration of a run; callers reload it between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchivalPolicy {
    /// Number of most recent epochs (seasons) kept hot
    pub hot_epoch_window: i64,

    /// Number of most recent sequence ticks kept hot
    pub hot_sequence_window: i64,

    /// Hot store size at which the inspector recommends archival
    pub size_threshold_bytes: u64,

    /// Run VACUUM on the hot store after rows were removed
    pub compact_after_run: bool,
}

impl Default for ArchivalPolicy {
    fn default() -> Self {
        Self {
            hot_epoch_window: 3,
            hot_sequence_window: 10_000,
            size_threshold_bytes: DEFAULT_SIZE_THRESHOLD_BYTES,
            compact_after_run: true,
        }
    }
}

impl ArchivalPolicy {
    /// Load from environment variables, falling back to defaults per field
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let hot_epoch_window = std::env::var("TIERED_HOT_EPOCH_WINDOW")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.hot_epoch_window);

        let hot_sequence_window = std::env::var("TIERED_HOT_SEQUENCE_WINDOW")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.hot_sequence_window);

        let size_threshold_bytes = std::env::var("TIERED_SIZE_THRESHOLD_BYTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.size_threshold_bytes);

        let compact_after_run = std::env::var("TIERED_COMPACT_AFTER_RUN")
            .ok()
            .map(|s| s == "true" || s == "1")
            .unwrap_or(defaults.compact_after_run);

        Self {
            hot_epoch_window,
            hot_sequence_window,
            size_threshold_bytes,
            compact_after_run,
        }
    }

    /// Reject malformed policies before anything touches a store
    pub fn validate(&self) -> ArchiveResult<()> {
        if self.hot_epoch_window < 0 {
            return Err(ArchiveError::Configuration(format!(
                "hot_epoch_window must be >= 0, got {}",
                self.hot_epoch_window
            )));
        }
        if self.hot_sequence_window < 0 {
            return Err(ArchiveError::Configuration(format!(
                "hot_sequence_window must be >= 0, got {}",
                self.hot_sequence_window
            )));
        }
        if self.size_threshold_bytes == 0 {
            return Err(ArchiveError::Configuration(
                "size_threshold_bytes must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Process-wide configuration supplied by the hosting process
#[derive(Debug, Clone)]
pub struct Config {
    pub policy: ArchivalPolicy,
    pub classification: Classification,
    /// Append each run report as a JSON line here (None = tracing only)
    pub report_log_path: Option<PathBuf>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            policy: ArchivalPolicy::default(),
            classification: Classification::simulation(),
            report_log_path: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load policy and log settings from the environment
    pub fn from_env() -> Self {
        Self {
            policy: ArchivalPolicy::from_env(),
            classification: Classification::simulation(),
            report_log_path: std::env::var("TIERED_REPORT_LOG").ok().map(PathBuf::from),
            log_level: std::env::var("TIERED_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}
