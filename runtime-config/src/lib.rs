//! Layered configuration surface for the work-package engine.
//!
//! Provides:
//! - Environment-based configuration (dev/staging/production/test)
//! - File + environment-variable layering with hot-reload
//! - `validator`-backed schema checks on the typed [`AppConfig`]
//!
//! Translating a loaded [`AppConfig`] into an `engine::config::EngineConfig`
//! is the caller's job (the HTTP surface and demo UI that would own that
//! wiring are out of scope for this crate, per spec §1).

pub mod config;
pub mod environment;
pub mod loader;
pub mod validation;

#[cfg(test)]
mod tests;

pub use config::{
    AppConfig, AppMetadata, EngineSection, EnvironmentConfig as AppEnvironmentConfig,
    EnvironmentOverrides, EscalationSection, MonitoringConfig, SelectionPolicyConfig,
};
pub use environment::{detection, presets, Environment, EnvironmentConfig, EnvironmentManager};
pub use loader::{
    ConfigLoadResult, ConfigLoader, ConfigLoaderBuilder, ConfigSource, ConfigWatcher, MergeStrategy,
};
pub use validation::{
    validate_config, ConcurrencyValidation, ConfigValidator, LoggingConfigValidation,
    ValidationError, ValidationResult,
};

pub use anyhow::Result;
pub use serde::{Deserialize, Serialize};
