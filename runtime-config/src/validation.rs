//! Configuration validation and schema enforcement.

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use validator::{Validate, ValidationError as ValidatorError};

/// Configuration validation result.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
}

/// Ad-hoc configuration validator for sources that did not come through
/// a typed `AppConfig` (e.g. raw key-value overrides from the CLI).
#[derive(Debug, Clone)]
pub struct ConfigValidator {
    rules: HashMap<String, ValidationRule>,
    strict_mode: bool,
}

pub struct ValidationRule {
    pub field_name: String,
    pub required: bool,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<String>,
    pub custom_validator: Option<Box<dyn Fn(&str) -> Result<()> + Send + Sync>>,
}

impl std::fmt::Debug for ValidationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationRule")
            .field("field_name", &self.field_name)
            .field("required", &self.required)
            .finish()
    }
}

/// Engine concurrency validation (spec §6: positive integers).
#[derive(Debug, Clone, Validate)]
pub struct ConcurrencyValidation {
    #[validate(range(min = 1, max = 64, message = "worker concurrency must be between 1 and 64"))]
    pub worker_concurrency: u32,
    #[validate(range(min = 1, max = 64, message = "qa concurrency must be between 1 and 64"))]
    pub qa_concurrency: u32,
}

/// Logging configuration validation.
#[derive(Debug, Clone, Validate)]
pub struct LoggingConfigValidation {
    #[validate(custom = "validate_log_level")]
    pub level: String,
}

impl ConfigValidator {
    pub fn new(strict_mode: bool) -> Self {
        Self {
            rules: HashMap::new(),
            strict_mode,
        }
    }

    pub fn add_rule(&mut self, rule: ValidationRule) {
        self.rules.insert(rule.field_name.clone(), rule);
    }

    pub fn validate_field(&self, field_name: &str, value: &str) -> Result<()> {
        if let Some(rule) = self.rules.get(field_name) {
            if rule.required && value.is_empty() {
                return Err(anyhow!("field '{}' is required", field_name));
            }
            if let Some(min_len) = rule.min_length {
                if value.len() < min_len {
                    return Err(anyhow!(
                        "field '{}' must be at least {} characters",
                        field_name,
                        min_len
                    ));
                }
            }
            if let Some(max_len) = rule.max_length {
                if value.len() > max_len {
                    return Err(anyhow!(
                        "field '{}' must be at most {} characters",
                        field_name,
                        max_len
                    ));
                }
            }
            if let Some(pattern) = &rule.pattern {
                let regex = regex::Regex::new(pattern)
                    .map_err(|e| anyhow!("invalid regex pattern for field '{}': {}", field_name, e))?;
                if !regex.is_match(value) {
                    return Err(anyhow!("field '{}' does not match required pattern", field_name));
                }
            }
            if let Some(validator) = &rule.custom_validator {
                validator(value)?;
            }
        }
        Ok(())
    }

    pub fn validate_config<T: Validate>(&self, config: &T) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if let Err(validation_errors) = config.validate() {
            for (field, field_errors) in validation_errors.field_errors() {
                for error in field_errors {
                    errors.push(ValidationError {
                        field: field.to_string(),
                        message: error
                            .message
                            .clone()
                            .unwrap_or_else(|| "validation failed".into()),
                        code: error.code.clone(),
                    });
                }
            }
        }

        if self.strict_mode && !errors.is_empty() {
            warnings.push("strict mode enabled - all validation errors must be resolved".to_string());
        }

        ValidationResult {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

fn validate_log_level(level: &str) -> Result<(), ValidatorError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&level.to_lowercase().as_str()) {
        return Err(ValidatorError::new("invalid_log_level"));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: std::borrow::Cow<'static, str>,
    pub code: std::borrow::Cow<'static, str>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "validation error in field '{}': {}", self.field, self.message.as_ref())
    }
}

impl std::error::Error for ValidationError {}

pub fn validate_config<T: Validate>(config: &T) -> ValidationResult {
    ConfigValidator::new(false).validate_config(config)
}

/// Standalone validation utilities usable outside a typed `AppConfig`.
pub mod utils {
    use super::*;

    pub fn validate_log_level_str(level: &str) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&level.to_lowercase().as_str()) {
            return Err(anyhow!("invalid log level: {}", level));
        }
        Ok(())
    }

    pub fn validate_file_path(path: &str) -> Result<()> {
        if path.is_empty() {
            return Err(anyhow!("file path cannot be empty"));
        }
        if path.contains("..") {
            return Err(anyhow!("file path cannot contain '..' for security reasons"));
        }
        Ok(())
    }
}
