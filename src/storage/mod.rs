//! Storage module
//!
//! Hot and cold SQLite stores, the schema synchronizer that keeps the cold
//! side structurally in step with the hot side, and the tiered facade that
//! owns both handles.

pub mod sqlite;
pub mod sync;
pub mod tiered;
pub(crate) mod transfer;

pub use sqlite::{cold_path_for, SqliteConfig, SqliteStore, StoreRole};
pub use sync::{synchronize, SyncReport};
pub use tiered::TieredStore;
pub use transfer::RowFilter;
