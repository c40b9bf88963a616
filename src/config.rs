use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

const CONFIG_NAMES: [&str; 4] = [
    "validate-markup.toml",
    "validate-markup.json",
    ".validate-markup.toml",
    ".validate-markup.json",
];

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub validation: ValidationConfig,
    pub cache: CacheConfig,
    pub network: NetworkConfig,
    pub stylesheets: StylesheetConfig,
}

/// Validation-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ValidationConfig {
    /// Maximum number of documents validated at once by `validate_all`
    pub max_concurrent_validations: Option<usize>,
}

/// Validator cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of compiled validators kept in memory
    pub capacity: usize,
}

/// Network configuration for schema fetching
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Fetch timeout in seconds, applied to both local and remote schemas
    pub timeout_seconds: u64,
    /// User agent sent with HTTP requests
    pub user_agent: String,
}

/// Stylesheet validation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct StylesheetConfig {
    /// Directory containing `xslt10.rng`, `xslt20.rng`, ...
    pub schema_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { capacity: 10 }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            user_agent: format!("validate-markup/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: defaults -> file -> environment
    pub async fn load_config(explicit_path: Option<&Path>) -> Result<Config> {
        let mut config = Config::default();

        if let Some(config_path) = explicit_path {
            let file_config = Self::load_from_file(config_path).await?;
            config = Self::merge_configs(config, file_config);
        } else if let Some(found_config) = Self::find_config_file().await? {
            config = Self::merge_configs(config, found_config);
        }

        config = Self::apply_environment_overrides(config)?;

        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub async fn load_from_file(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                if let Ok(config) = toml::from_str::<Config>(&content) {
                    Ok(config)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find configuration file in the current directory, then the user config directory
    pub async fn find_config_file() -> Result<Option<Config>> {
        Self::find_config_file_in(&[PathBuf::from("."), Self::user_config_dir()]).await
    }

    fn user_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("validate-markup")
    }

    /// Search the given directories, in order, for the first known configuration file
    pub async fn find_config_file_in(dirs: &[PathBuf]) -> Result<Option<Config>> {
        for dir in dirs {
            for name in &CONFIG_NAMES {
                let path = dir.join(name);
                if path.exists() {
                    return Ok(Some(Self::load_from_file(&path).await?));
                }
            }
        }
        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: Config) -> Result<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        if let Some(capacity) = env.get("VALIDATE_MARKUP_CACHE_CAPACITY") {
            config.cache.capacity = capacity.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid VALIDATE_MARKUP_CACHE_CAPACITY value: {}",
                    capacity
                ))
            })?;
        }

        if let Some(timeout) = env.get("VALIDATE_MARKUP_TIMEOUT") {
            config.network.timeout_seconds = timeout.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid VALIDATE_MARKUP_TIMEOUT value: {}",
                    timeout
                ))
            })?;
        }

        if let Some(threads) = env.get("VALIDATE_MARKUP_THREADS") {
            config.validation.max_concurrent_validations = Some(threads.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid VALIDATE_MARKUP_THREADS value: {}",
                    threads
                ))
            })?);
        }

        if let Some(dir) = env.get("VALIDATE_MARKUP_STYLESHEET_SCHEMAS") {
            config.stylesheets.schema_dir = Some(PathBuf::from(dir));
        }

        Ok(config)
    }

    /// Merge two configurations (second takes precedence for non-None values)
    pub fn merge_configs(mut base: Config, override_config: Config) -> Config {
        if override_config.validation.max_concurrent_validations.is_some() {
            base.validation.max_concurrent_validations =
                override_config.validation.max_concurrent_validations;
        }

        base.cache.capacity = override_config.cache.capacity;

        base.network.timeout_seconds = override_config.network.timeout_seconds;
        base.network.user_agent = override_config.network.user_agent;

        if override_config.stylesheets.schema_dir.is_some() {
            base.stylesheets.schema_dir = override_config.stylesheets.schema_dir;
        }

        base
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        if let Some(threads) = config.validation.max_concurrent_validations {
            if threads == 0 {
                return Err(ConfigError::Validation(
                    "Number of concurrent validations must be greater than 0".to_string(),
                ));
            }
            if threads > 1000 {
                return Err(ConfigError::Validation(
                    "Number of concurrent validations cannot exceed 1000".to_string(),
                ));
            }
        }

        if config.cache.capacity == 0 {
            return Err(ConfigError::Validation(
                "Cache capacity must be greater than 0".to_string(),
            ));
        }

        if config.cache.capacity > 1000 {
            return Err(ConfigError::Validation(
                "Cache capacity cannot exceed 1000".to_string(),
            ));
        }

        if config.network.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the effective concurrency for batch validation
    pub fn get_thread_count(config: &Config) -> usize {
        config
            .validation
            .max_concurrent_validations
            .unwrap_or_else(num_cpus::get)
    }

    /// Convert configuration to Duration for fetch timeout
    pub fn get_timeout_duration(config: &Config) -> Duration {
        Duration::from_secs(config.network.timeout_seconds)
    }
}
