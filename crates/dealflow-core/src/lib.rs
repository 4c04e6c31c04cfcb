//! Shared foundation for the Dealflow CRM action engine.
//!
//! Holds the top-level error type, the unix-seconds timestamp newtype,
//! and the TOML-backed application configuration.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::DealflowConfig;
pub use error::{DealflowError, Result};
pub use types::*;
