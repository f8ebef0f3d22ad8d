//! Common test utilities and fixtures
//!
//! Shared infrastructure for the integration tests:
//! - A simulation-shaped hot store in a temp directory
//! - Snapshot helpers for comparing table contents across runs
//! - Assertions over routed query results

#![allow(dead_code)]

pub mod assertions;
pub mod fixtures;

// Re-export commonly used items
pub use assertions::*;
pub use fixtures::*;

pub use rusqlite::types::Value;
pub use tiered_archive::archival::FixedCounters;
pub use tiered_archive::{
    ArchivalPolicy, ArchiveError, Classification, Config, RestoreSelector, TieredStore,
};
