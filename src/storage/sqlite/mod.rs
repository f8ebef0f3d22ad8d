// File: src/storage/sqlite/mod.rs

mod config;
pub mod schema;
mod store;

// Public exports
pub use config::{cold_path_for, SqliteConfig, StoreRole, COLD_SUFFIX};
pub use store::SqliteStore;
