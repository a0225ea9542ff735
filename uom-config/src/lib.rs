//! Configuration loading for the orchestrator and its downstream service
//! clients. Every field has a documented default; nothing is required to
//! be set for the system to run in fallback-only mode.

pub mod error;
pub mod loader;
pub mod model;

pub use error::{ConfigLoadError, Result};
pub use loader::ConfigLoader;
pub use model::{
    DownstreamServicesConfig, OrchestratorConfig, PatternCacheConfig, ServerConfig, StorageConfig,
    UomConfig,
};
