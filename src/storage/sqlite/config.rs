// File: src/storage/sqlite/config.rs

use std::path::{Path, PathBuf};

use serde::Serialize;

/// Suffix appended to the hot file stem to locate the cold file
pub const COLD_SUFFIX: &str = "_cold";

/// Which side of the tiered pair a store handle belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreRole {
    Hot,
    Cold,
}

impl StoreRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreRole::Hot => "hot",
            StoreRole::Cold => "cold",
        }
    }
}

/// SQLite store configuration
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to database file (or ":memory:" for in-memory)
    pub path: PathBuf,

    /// Put files created by this store in WAL mode (existing files keep theirs)
    pub wal_mode: bool,

    /// Busy timeout in milliseconds
    pub busy_timeout_ms: u32,

    /// Enable foreign key enforcement
    pub foreign_keys: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("simulation.db"),
            wal_mode: true,
            busy_timeout_ms: 5000,
            foreign_keys: true,
        }
    }
}

impl SqliteConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Configuration for the cold companion of this (hot) store
    ///
    /// Foreign keys stay off in cold: parent rows of archived detail live in
    /// always-hot tables that are never copied.
    pub fn cold_companion(&self) -> Self {
        Self {
            path: cold_path_for(&self.path),
            foreign_keys: false,
            ..self.clone()
        }
    }
}

/// Derive the cold file path from the hot one: `league.db` -> `league_cold.db`
pub fn cold_path_for(hot: &Path) -> PathBuf {
    let stem = hot
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let file_name = match hot.extension() {
        Some(ext) => format!("{}{}.{}", stem, COLD_SUFFIX, ext.to_string_lossy()),
        None => format!("{}{}", stem, COLD_SUFFIX),
    };
    hot.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cold_path_with_extension() {
        assert_eq!(
            cold_path_for(Path::new("/data/league.db")),
            PathBuf::from("/data/league_cold.db")
        );
    }

    #[test]
    fn test_cold_path_without_extension() {
        assert_eq!(
            cold_path_for(Path::new("saves/career")),
            PathBuf::from("saves/career_cold")
        );
    }

    #[test]
    fn test_cold_companion_disables_foreign_keys() {
        let hot = SqliteConfig::new("league.sqlite3");
        let cold = hot.cold_companion();
        assert_eq!(cold.path, PathBuf::from("league_cold.sqlite3"));
        assert!(hot.foreign_keys);
        assert!(!cold.foreign_keys);
        assert_eq!(cold.busy_timeout_ms, hot.busy_timeout_ms);
    }
}
