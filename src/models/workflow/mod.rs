pub mod copy;
pub mod delta;
pub mod matrix;
pub mod memory;
pub mod params;
pub mod permission;
pub mod queries;
pub mod scope;
pub mod store;
pub mod types;
pub mod update;

pub use delta::{Reconciled, delta_from_submitted, reconcile};
pub use matrix::{build, build_from_store};
pub use memory::MemoryStore;
pub use queries::PgStore;
pub use store::RuleStore;
pub use types::*;
