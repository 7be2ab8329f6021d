//! Core configuration structures for the work-package engine.
//!
//! Mirrors the teacher lineage's `AppConfig` (app metadata + nested
//! component configs + environment overrides), trimmed to the sections
//! this spec actually has: the scheduler's concurrency/tier knobs, the
//! escalation policy, and ambient monitoring flags. The HTTP surface and
//! persistent secrets/TLS machinery the teacher carried alongside these
//! have no counterpart in this spec and were dropped (see DESIGN.md).

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use contracts::{Difficulty, TaskType, TierProfile};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use super::environment::mask_sensitive_value;

/// Top-level configuration for a run of the engine.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    pub app: AppMetadata,
    pub engine: EngineSection,
    pub escalation: EscalationSection,
    pub monitoring: MonitoringConfig,
    pub environment: EnvironmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppMetadata {
    pub name: String,
    pub version: String,
    pub environment: String,
    pub debug: bool,
    pub log_level: String,
}

/// The scheduler's own knobs (spec §6 configuration surface).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EngineSection {
    #[validate(range(min = 1, max = 64, message = "worker concurrency must be between 1 and 64"))]
    pub worker_concurrency: u32,
    #[validate(range(min = 1, max = 64, message = "qa concurrency must be between 1 and 64"))]
    pub qa_concurrency: u32,
    pub tier_profile: TierProfile,
    pub enforce_cheapest_viable: bool,
    pub selection_policy: SelectionPolicyConfig,
    #[validate(range(min = 1, max = 5, message = "importance threshold must be in 1..=5"))]
    pub llm_second_pass_importance_threshold: u8,
    pub premium_task_types: HashSet<TaskType>,
    pub llm_qa_model_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicyConfig {
    LowestCostQualified,
    BestValue,
}

/// Escalation policy knobs (spec §4.6 / §6).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EscalationSection {
    pub require_eval_for_decision: bool,
    #[validate(range(min = 0, max = 1, message = "at most one promotion per package in this design"))]
    pub max_promotions: u32,
    pub score_resolution: f64,
    pub min_score_by_difficulty: HashMap<Difficulty, f64>,
    pub routing_mode_escalation_aware: bool,
    pub cheap_first_min_confidence: f64,
    pub cheap_first_savings_min_pct: f64,
    pub cheap_first_budget_headroom_factor: f64,
    pub cheap_first_only_when_can_promote: bool,
}

/// Ambient observability toggles; no Redis/Prometheus/StatsD transport
/// here since persistent storage/HTTP surfaces are out of scope (spec
/// §1) — the fields are the ones the engine's own tracing spans read.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MonitoringConfig {
    pub metrics_enabled: bool,
    pub structured_logging: bool,
    pub log_level: String,
}

/// Environment-specific overrides, applied on top of the base config.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EnvironmentConfig {
    pub development: Option<EnvironmentOverrides>,
    pub staging: Option<EnvironmentOverrides>,
    pub production: Option<EnvironmentOverrides>,
    pub test: Option<EnvironmentOverrides>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EnvironmentOverrides {
    pub debug: Option<bool>,
    pub log_level: Option<String>,
    pub worker_concurrency: Option<u32>,
    pub qa_concurrency: Option<u32>,
}

impl AppConfig {
    /// Defaults matching [`engine::config::EngineConfig::default`].
    pub fn new() -> Self {
        Self {
            app: AppMetadata {
                name: "work-package-engine".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                environment: "development".to_string(),
                debug: true,
                log_level: "info".to_string(),
            },
            engine: EngineSection {
                worker_concurrency: 3,
                qa_concurrency: 1,
                tier_profile: TierProfile::Standard,
                enforce_cheapest_viable: false,
                selection_policy: SelectionPolicyConfig::LowestCostQualified,
                llm_second_pass_importance_threshold: 4,
                premium_task_types: HashSet::new(),
                llm_qa_model_id: None,
            },
            escalation: EscalationSection {
                require_eval_for_decision: false,
                max_promotions: 1,
                score_resolution: 0.02,
                min_score_by_difficulty: HashMap::from([
                    (Difficulty::Low, 0.6),
                    (Difficulty::Medium, 0.75),
                    (Difficulty::High, 0.88),
                ]),
                routing_mode_escalation_aware: false,
                cheap_first_min_confidence: 0.6,
                cheap_first_savings_min_pct: 0.2,
                cheap_first_budget_headroom_factor: 1.1,
                cheap_first_only_when_can_promote: true,
            },
            monitoring: MonitoringConfig {
                metrics_enabled: true,
                structured_logging: true,
                log_level: "info".to_string(),
            },
            environment: EnvironmentConfig {
                development: Some(EnvironmentOverrides {
                    debug: Some(true),
                    log_level: Some("debug".to_string()),
                    worker_concurrency: None,
                    qa_concurrency: None,
                }),
                staging: Some(EnvironmentOverrides {
                    debug: Some(false),
                    log_level: Some("info".to_string()),
                    worker_concurrency: None,
                    qa_concurrency: None,
                }),
                production: Some(EnvironmentOverrides {
                    debug: Some(false),
                    log_level: Some("warn".to_string()),
                    worker_concurrency: None,
                    qa_concurrency: None,
                }),
                test: Some(EnvironmentOverrides {
                    debug: Some(true),
                    log_level: Some("error".to_string()),
                    worker_concurrency: Some(1),
                    qa_concurrency: Some(1),
                }),
            },
        }
    }

    pub fn validate_config(&self) -> Result<()> {
        if let Err(validation_errors) = self.validate() {
            for (field, field_errors) in validation_errors.field_errors() {
                for error in field_errors {
                    return Err(anyhow::anyhow!(
                        "Configuration validation failed for field '{}': {}",
                        field,
                        error.message.as_ref().unwrap_or(&"Validation error".into())
                    ));
                }
            }
        }

        if self.engine.qa_concurrency == 0 || self.engine.worker_concurrency == 0 {
            return Err(anyhow::anyhow!(
                "worker and qa concurrency must both be positive"
            ));
        }

        if self.app.environment == "production" && self.app.debug {
            warn!("debug mode enabled in production environment");
        }

        info!("configuration validation passed");
        Ok(())
    }

    /// Apply environment-specific overrides in place.
    pub fn apply_environment_overrides(&mut self) -> Result<()> {
        let overrides = match self.app.environment.as_str() {
            "development" => &self.environment.development,
            "staging" => &self.environment.staging,
            "production" => &self.environment.production,
            "test" => &self.environment.test,
            other => {
                warn!("unknown environment: {}, using defaults", other);
                return Ok(());
            }
        };

        if let Some(overrides) = overrides {
            if let Some(debug) = overrides.debug {
                self.app.debug = debug;
            }
            if let Some(log_level) = &overrides.log_level {
                self.app.log_level = log_level.clone();
                self.monitoring.log_level = log_level.clone();
            }
            if let Some(worker_concurrency) = overrides.worker_concurrency {
                self.engine.worker_concurrency = worker_concurrency;
            }
            if let Some(qa_concurrency) = overrides.qa_concurrency {
                self.engine.qa_concurrency = qa_concurrency;
            }
            info!(environment = %self.app.environment, "applied environment overrides");
        }

        Ok(())
    }

    /// A copy of the config safe to log: no field here is secret today,
    /// but `llm_qa_model_id` is masked in case a deployment encodes a
    /// credential-bearing routing alias there.
    pub fn get_masked_config(&self) -> AppConfig {
        let mut masked = self.clone();
        if let Some(model_id) = &self.engine.llm_qa_model_id {
            masked.engine.llm_qa_model_id = Some(mask_sensitive_value(model_id));
        }
        masked
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Layers an optional TOML file over the built-in defaults, then layers
/// `ENGINE__*` environment variables on top (double underscore as the
/// nesting separator, e.g. `ENGINE__ENGINE__WORKER_CONCURRENCY=6`),
/// mirroring the `config` crate's standard file+env layering recipe.
pub fn load_layered(toml_path: Option<&str>) -> Result<AppConfig> {
    let defaults = serde_json::to_value(AppConfig::new())?;

    let mut builder = config::Config::builder().add_source(config::Config::try_from(&defaults)?);
    if let Some(path) = toml_path {
        builder = builder.add_source(config::File::with_name(path).required(false));
    }
    builder = builder.add_source(
        config::Environment::with_prefix("ENGINE")
            .separator("__")
            .try_parsing(true),
    );

    let layered = builder.build()?;
    let app_config: AppConfig = layered.try_deserialize()?;
    app_config.validate_config()?;
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        let config = AppConfig::new();
        assert!(config.validate_config().is_ok());
    }

    #[test]
    fn load_layered_with_no_file_falls_back_to_defaults() {
        let config = load_layered(None).expect("defaults alone must layer cleanly");
        assert_eq!(config.engine.worker_concurrency, 3);
    }

    #[test]
    fn load_layered_respects_env_override() {
        std::env::set_var("ENGINE__ENGINE__WORKER_CONCURRENCY", "7");
        let config = load_layered(None).expect("env override must layer over defaults");
        assert_eq!(config.engine.worker_concurrency, 7);
        std::env::remove_var("ENGINE__ENGINE__WORKER_CONCURRENCY");
    }

    #[test]
    fn environment_overrides_apply_log_level() {
        let mut config = AppConfig::new();
        config.app.environment = "production".to_string();
        config.apply_environment_overrides().unwrap();
        assert_eq!(config.app.log_level, "warn");
        assert!(!config.app.debug);
    }

    #[test]
    fn test_environment_forces_single_worker() {
        let mut config = AppConfig::new();
        config.app.environment = "test".to_string();
        config.apply_environment_overrides().unwrap();
        assert_eq!(config.engine.worker_concurrency, 1);
        assert_eq!(config.engine.qa_concurrency, 1);
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut config = AppConfig::new();
        config.engine.worker_concurrency = 0;
        assert!(config.validate_config().is_err());
    }

    #[test]
    fn masked_config_hides_llm_qa_model_id() {
        let mut config = AppConfig::new();
        config.engine.llm_qa_model_id = Some("internal-review-model-v7".to_string());
        let masked = config.get_masked_config();
        assert_ne!(
            masked.engine.llm_qa_model_id,
            config.engine.llm_qa_model_id
        );
    }
}
