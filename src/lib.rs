//! tiered-archive library exports

pub mod archival;
pub mod classification;
pub mod config;
pub mod error;
pub mod inspector;
pub mod operations;
pub mod query;
pub mod restore;
pub mod storage;

// Re-exports
pub use archival::{
    ArchivePlan, CounterSource, Counters, DerivedCounters, FixedCounters, PartialCounters,
    Predicate, RunReport, Selections, TableError, TableReport,
};
pub use classification::{ArchivableTable, Classification, ClassificationEntry, RetentionClass};
pub use config::{ArchivalPolicy, Config};
pub use error::{ArchiveError, ArchiveResult, StorageError};
pub use inspector::{StoreStats, TableCounts};
pub use query::{FederatedQueryPlan, QueryRouter, Rows};
pub use restore::RestoreSelector;
pub use storage::{cold_path_for, SqliteConfig, SqliteStore, StoreRole, TieredStore};
