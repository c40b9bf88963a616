use std::path::PathBuf;

use tempfile::TempDir;

use validate_markup::{Config, ConfigError, ConfigManager, ValidationPipeline};

#[test]
fn test_default_config() {
    let config = Config::default();

    assert_eq!(config.cache.capacity, 10);
    assert_eq!(config.network.timeout_seconds, 30);
    assert!(config.network.user_agent.starts_with("validate-markup/"));
    assert!(config.stylesheets.schema_dir.is_none());
    assert!(config.validation.max_concurrent_validations.is_none());
    assert!(ConfigManager::validate_config(&config).is_ok());
}

#[tokio::test]
async fn test_load_partial_toml() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("validate-markup.toml");
    std::fs::write(
        &path,
        r#"
[cache]
capacity = 25

[stylesheets]
schema_dir = "/usr/share/xml/xslt"
"#,
    )
    .unwrap();

    let config = ConfigManager::load_from_file(&path).await.unwrap();
    assert_eq!(config.cache.capacity, 25);
    assert_eq!(
        config.stylesheets.schema_dir,
        Some(PathBuf::from("/usr/share/xml/xslt"))
    );
    // Unspecified sections keep their defaults
    assert_eq!(config.network.timeout_seconds, 30);
}

#[tokio::test]
async fn test_load_json() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");
    std::fs::write(
        &path,
        r#"{"network": {"timeout_seconds": 5}, "validation": {"max_concurrent_validations": 2}}"#,
    )
    .unwrap();

    let config = ConfigManager::load_from_file(&path).await.unwrap();
    assert_eq!(config.network.timeout_seconds, 5);
    assert_eq!(ConfigManager::get_thread_count(&config), 2);
}

#[tokio::test]
async fn test_unsupported_extension() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.yaml");
    std::fs::write(&path, "cache: {}").unwrap();

    let err = ConfigManager::load_from_file(&path).await.unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
}

#[tokio::test]
async fn test_find_config_in_directories() {
    let empty = TempDir::new().unwrap();
    let configured = TempDir::new().unwrap();
    std::fs::write(
        configured.path().join(".validate-markup.toml"),
        "[cache]\ncapacity = 3\n",
    )
    .unwrap();

    let found = ConfigManager::find_config_file_in(&[
        empty.path().to_path_buf(),
        configured.path().to_path_buf(),
    ])
    .await
    .unwrap();
    assert_eq!(found.unwrap().cache.capacity, 3);

    let none = ConfigManager::find_config_file_in(&[empty.path().to_path_buf()])
        .await
        .unwrap();
    assert!(none.is_none());
}

#[test]
fn test_invalid_values_rejected() {
    let mut config = Config::default();
    config.cache.capacity = 0;
    assert!(ConfigManager::validate_config(&config).is_err());

    let mut config = Config::default();
    config.network.timeout_seconds = 0;
    assert!(ConfigManager::validate_config(&config).is_err());

    // The pipeline refuses an invalid configuration up front
    assert!(ValidationPipeline::from_config(config).is_err());
}
