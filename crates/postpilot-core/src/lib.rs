//! # PostPilot Core
//!
//! Shared foundation for the PostPilot task engine: the error taxonomy,
//! the TOML configuration system, the execution-adapter contract, and the
//! wire types that cross it.
//!
//! Everything here is deliberately small — the engine crates depend on
//! this one, never the other way around.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{CampaignConfig, EngineConfig, SchedulerConfig, StorageConfig};
pub use error::{EngineError, Result};
pub use traits::ExecutionAdapter;
pub use types::{DirectMessage, DmDelivery, ExecutionOutcome};
