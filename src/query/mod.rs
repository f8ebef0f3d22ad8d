//! Query routing and hot/cold federation

pub(crate) mod merge;
pub mod plan;
pub mod router;
pub mod rows;
pub(crate) mod sql;

pub use plan::{FederatedQueryPlan, Limit, OrderKey, OrderTerm};
pub use router::{query, QueryRouter};
pub use rows::{value_to_json, Rows};
