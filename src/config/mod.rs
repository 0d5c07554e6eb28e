//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Config struct definitions and loading
//! - [`defaults`]: serde default functions and lower bounds
//! - [`validation`]: startup validation collecting every error

mod defaults;
mod types;
mod validation;

pub use types::{
    ChatConfig, Config, ConfigError, DirectoryConfig, DispatchConfig, DispatchModeConfig,
    ServerConfig, StoreBackend, StoreConfig,
};
pub use validation::{ValidationError, validate};
