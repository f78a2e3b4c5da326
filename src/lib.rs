pub mod cli;
pub mod config;
pub mod contract;
pub mod discovery;
pub mod error;
pub mod executor;
pub mod git;
pub mod load_config;
pub mod orchestrator;
pub mod output;
pub mod progress;
pub mod providers;
pub mod query;
pub mod registry;
pub mod status;

pub use error::{FleetError, Result};
