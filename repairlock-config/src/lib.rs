//! Configuration library for repairlock.
//!
//! Holds the typed configuration model, the file/environment loader and the
//! guard rails that keep the lease timing meaningful. The `repairlockctl`
//! binary layers its command-line flags on top of what is loaded here.

pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{
    CONFIG_PATH_ENV, ConfigLoad, ConfigLoader,
    error::ConfigLoadError,
    store_url::{StoreUrls, resolve_store_urls},
};
pub use models::{
    Config, ConfigSource, LogLevel, LoggingConfig, NodeConfig, PlannerConfig, StoreConfig,
};
pub use validation::ConfigGuardRailError;
