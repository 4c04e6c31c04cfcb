//! SQLite persistence for Dealflow.
//!
//! Provides the database wrapper, schema migrations, the tenant-scoped CRM
//! record store, and the plan repository with its atomic execution gate.

pub mod db;
pub mod migrations;
pub mod plans;
pub mod records;

pub use db::Database;
pub use plans::{PlanRepository, PlanRow};
pub use records::RecordStore;
