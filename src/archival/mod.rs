//! Archival: policy evaluation, counters, the move engine, and run reports

pub mod counters;
pub mod engine;
pub mod policy;
pub mod report;

pub use counters::{CounterSource, Counters, DerivedCounters, FixedCounters, PartialCounters};
pub use engine::{plan, run, ArchivalEngine};
pub use policy::{evaluate, Predicate, Selection, Selections};
pub use report::{ArchivePlan, PlannedTable, RunReport, TableError, TableReport};
