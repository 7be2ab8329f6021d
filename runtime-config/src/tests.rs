//! Configuration tests

#[cfg(test)]
mod tests {
    use crate::{
        detection, presets, ConcurrencyValidation, ConfigLoader, ConfigValidator, Environment,
        EnvironmentManager,
    };
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_loader_basic() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let config_data = r#"{
            "engine": {
                "worker_concurrency": 5,
                "tier_profile": "premium"
            }
        }"#;

        fs::write(&config_path, config_data).unwrap();

        let loader = ConfigLoader::new(config_path.to_str().unwrap());
        let result = loader.load().await.unwrap();

        assert!(result.errors.is_empty());
        assert!(result.config.contains_key("engine"));
    }

    #[tokio::test]
    async fn test_environment_manager() {
        let mut manager = EnvironmentManager::new(Environment::Development);

        let dev_config = presets::development_config();
        manager.load_environment_config(Environment::Development, dev_config);

        let config = manager.get_current_config();
        assert!(config.contains_key("log_level"));
        assert!(config.contains_key("worker_concurrency"));
    }

    #[tokio::test]
    async fn test_config_validation() {
        let validator = ConfigValidator::new(true);

        let concurrency = ConcurrencyValidation {
            worker_concurrency: 3,
            qa_concurrency: 1,
        };

        let result = validator.validate_config(&concurrency);
        assert!(result.is_valid);
    }

    #[tokio::test]
    async fn test_config_validation_rejects_zero_concurrency() {
        let validator = ConfigValidator::new(true);

        let concurrency = ConcurrencyValidation {
            worker_concurrency: 0,
            qa_concurrency: 1,
        };

        let result = validator.validate_config(&concurrency);
        assert!(!result.is_valid);
        assert!(!result.errors.is_empty());
    }

    #[tokio::test]
    async fn test_environment_detection() {
        std::env::set_var("ENGINE_ENV", "production");
        let env = detection::detect_from_env().unwrap();
        assert_eq!(env, Environment::Production);
        std::env::remove_var("ENGINE_ENV");
    }

    #[tokio::test]
    async fn test_config_override() {
        let mut manager = EnvironmentManager::new(Environment::Development);

        let dev_config = presets::development_config();
        manager.load_environment_config(Environment::Development, dev_config);

        manager.override_config(
            "worker_concurrency".to_string(),
            serde_json::Value::Number(8.into()),
        );

        let config = manager.get_current_config();
        assert_eq!(
            config.get("worker_concurrency").unwrap().as_u64().unwrap(),
            8
        );
    }

    #[tokio::test]
    async fn test_hot_reload_picks_up_file_changes() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let initial_config = r#"{"engine": {"worker_concurrency": 3}}"#;
        fs::write(&config_path, initial_config).unwrap();

        let loader = ConfigLoader::new(config_path.to_str().unwrap());
        loader.load().await.unwrap();

        let config1 = loader.get_config().await;
        assert_eq!(
            config1
                .get("engine")
                .unwrap()
                .get("worker_concurrency")
                .unwrap()
                .as_u64()
                .unwrap(),
            3
        );

        let updated_config = r#"{"engine": {"worker_concurrency": 6}}"#;
        fs::write(&config_path, updated_config).unwrap();
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        loader.load().await.unwrap();
        let config2 = loader.get_config().await;
        assert_eq!(
            config2
                .get("engine")
                .unwrap()
                .get("worker_concurrency")
                .unwrap()
                .as_u64()
                .unwrap(),
            6
        );
    }

    #[tokio::test]
    async fn test_invalid_config_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        fs::write(&config_path, r#"{"engine": {"#).unwrap();

        let loader = ConfigLoader::new(config_path.to_str().unwrap());
        let result = loader.load().await.unwrap();
        assert!(!result.errors.is_empty());
    }
}
