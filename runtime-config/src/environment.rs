//! Environment detection and environment-scoped configuration presets.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
    Test,
}

impl Environment {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            "test" | "testing" => Ok(Environment::Test),
            _ => Err(anyhow!("invalid environment: {}", s)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-environment configuration bag, merged on top of defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub environment: Environment,
    pub config: HashMap<String, serde_json::Value>,
    pub overrides: HashMap<String, serde_json::Value>,
}

/// Tracks the active environment and its layered config values.
#[derive(Debug, Clone)]
pub struct EnvironmentManager {
    current_environment: Environment,
    configs: HashMap<Environment, EnvironmentConfig>,
    default_config: HashMap<String, serde_json::Value>,
}

impl EnvironmentManager {
    pub fn new(environment: Environment) -> Self {
        Self {
            current_environment: environment,
            configs: HashMap::new(),
            default_config: HashMap::new(),
        }
    }

    pub fn set_environment(&mut self, environment: Environment) {
        self.current_environment = environment;
        info!("switched to environment: {}", environment);
    }

    pub fn get_environment(&self) -> Environment {
        self.current_environment
    }

    pub fn load_environment_config(
        &mut self,
        environment: Environment,
        config: HashMap<String, serde_json::Value>,
    ) {
        let env_config = EnvironmentConfig {
            environment,
            config,
            overrides: HashMap::new(),
        };
        self.configs.insert(environment, env_config);
        info!("loaded configuration for environment: {}", environment);
    }

    pub fn set_default_config(&mut self, config: HashMap<String, serde_json::Value>) {
        self.default_config = config;
    }

    pub fn get_current_config(&self) -> HashMap<String, serde_json::Value> {
        self.get_environment_config(self.current_environment)
    }

    pub fn get_environment_config(
        &self,
        environment: Environment,
    ) -> HashMap<String, serde_json::Value> {
        let mut config = self.default_config.clone();
        if let Some(env_config) = self.configs.get(&environment) {
            for (key, value) in &env_config.config {
                config.insert(key.clone(), value.clone());
            }
            for (key, value) in &env_config.overrides {
                config.insert(key.clone(), value.clone());
            }
        }
        config
    }

    pub fn override_config(&mut self, key: String, value: serde_json::Value) {
        self.configs
            .entry(self.current_environment)
            .or_insert_with(|| EnvironmentConfig {
                environment: self.current_environment,
                config: HashMap::new(),
                overrides: HashMap::new(),
            })
            .overrides
            .insert(key, value);
    }

    pub fn get_log_level(&self) -> &'static str {
        match self.current_environment {
            Environment::Development => "debug",
            Environment::Staging => "info",
            Environment::Production => "warn",
            Environment::Test => "error",
        }
    }

    pub fn is_hot_reload_enabled(&self) -> bool {
        matches!(self.current_environment, Environment::Development)
    }
}

/// Environment detection utilities.
pub mod detection {
    use super::*;

    pub fn detect_from_env() -> Result<Environment> {
        let env_str = std::env::var("ENGINE_ENV")
            .or_else(|_| std::env::var("ENVIRONMENT"))
            .unwrap_or_else(|_| "development".to_string());
        Environment::from_str(&env_str)
    }

    pub fn detect_from_hostname() -> Result<Environment> {
        let hostname = hostname::get()?.to_string_lossy().to_lowercase();
        if hostname.contains("prod") {
            Ok(Environment::Production)
        } else if hostname.contains("stag") {
            Ok(Environment::Staging)
        } else if hostname.contains("test") || hostname.contains("ci") {
            Ok(Environment::Test)
        } else {
            Ok(Environment::Development)
        }
    }

    pub fn auto_detect() -> Result<Environment> {
        detect_from_env().or_else(|_| detect_from_hostname())
    }
}

/// Environment-specific configuration presets (concurrency and log
/// level only — the knobs this crate's `AppConfig` actually reads).
pub mod presets {
    use super::*;

    pub fn development_config() -> HashMap<String, serde_json::Value> {
        HashMap::from([
            ("log_level".to_string(), serde_json::json!("debug")),
            ("worker_concurrency".to_string(), serde_json::json!(3)),
            ("qa_concurrency".to_string(), serde_json::json!(1)),
        ])
    }

    pub fn staging_config() -> HashMap<String, serde_json::Value> {
        HashMap::from([
            ("log_level".to_string(), serde_json::json!("info")),
            ("worker_concurrency".to_string(), serde_json::json!(3)),
            ("qa_concurrency".to_string(), serde_json::json!(1)),
        ])
    }

    pub fn production_config() -> HashMap<String, serde_json::Value> {
        HashMap::from([
            ("log_level".to_string(), serde_json::json!("warn")),
            ("worker_concurrency".to_string(), serde_json::json!(6)),
            ("qa_concurrency".to_string(), serde_json::json!(2)),
        ])
    }

    pub fn test_config() -> HashMap<String, serde_json::Value> {
        HashMap::from([
            ("log_level".to_string(), serde_json::json!("error")),
            ("worker_concurrency".to_string(), serde_json::json!(1)),
            ("qa_concurrency".to_string(), serde_json::json!(1)),
        ])
    }
}

/// Global environment manager instance.
static ENVIRONMENT_MANAGER: once_cell::sync::OnceCell<EnvironmentManager> =
    once_cell::sync::OnceCell::new();

pub fn init_environment_manager(environment: Environment) -> Result<()> {
    let mut manager = EnvironmentManager::new(environment);
    match environment {
        Environment::Development => {
            manager.load_environment_config(environment, presets::development_config())
        }
        Environment::Staging => {
            manager.load_environment_config(environment, presets::staging_config())
        }
        Environment::Production => {
            manager.load_environment_config(environment, presets::production_config())
        }
        Environment::Test => manager.load_environment_config(environment, presets::test_config()),
    }
    ENVIRONMENT_MANAGER
        .set(manager)
        .map_err(|_| anyhow!("environment manager already initialized"))?;
    info!("environment manager initialized for: {}", environment);
    Ok(())
}

pub fn get_environment_manager() -> Result<&'static EnvironmentManager> {
    ENVIRONMENT_MANAGER
        .get()
        .ok_or_else(|| anyhow!("environment manager not initialized"))
}

/// Masks all but the first and last few characters of a sensitive
/// string so it can still appear in logs for correlation purposes.
pub fn mask_sensitive_value(value: &str) -> String {
    if value.len() <= 8 {
        return "*".repeat(value.len().max(3));
    }
    format!("{}****{}", &value[..4], &value[value.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_roundtrips_through_str() {
        for env in [
            Environment::Development,
            Environment::Staging,
            Environment::Production,
            Environment::Test,
        ] {
            assert_eq!(Environment::from_str(env.as_str()).unwrap(), env);
        }
    }

    #[test]
    fn mask_sensitive_value_hides_middle() {
        let masked = mask_sensitive_value("this_is_a_very_long_secret_key");
        assert!(masked.contains("****"));
        assert!(masked.starts_with("this"));
    }

    #[test]
    fn mask_sensitive_value_short_input() {
        assert_eq!(mask_sensitive_value("abc"), "***");
    }
}
