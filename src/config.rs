//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Catalog location and date handling
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// IANA time zone name used for default query date ranges
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_root_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join("bucketstore"))
        .unwrap_or_else(|| PathBuf::from("./bucketstore_data"))
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            timezone: default_timezone(),
        }
    }
}

impl CatalogConfig {
    /// Parsed time zone
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse()
            .map_err(|_| ConfigError::InvalidTimezone(self.timezone.clone()))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        config.catalog.timezone()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("bucketstore").join("config.toml")),
            Some(PathBuf::from("/etc/bucketstore/config.toml")),
            Some(PathBuf::from("./bucketstore.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(root_dir) = std::env::var("BUCKETSTORE_ROOT_DIR") {
            self.catalog.root_dir = PathBuf::from(root_dir);
        }
        if let Ok(timezone) = std::env::var("BUCKETSTORE_TIMEZONE") {
            if timezone.parse::<Tz>().is_ok() {
                self.catalog.timezone = timezone;
            } else {
                tracing::warn!("Ignoring unknown time zone in BUCKETSTORE_TIMEZONE: {}", timezone);
            }
        }

        if let Ok(level) = std::env::var("BUCKETSTORE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("BUCKETSTORE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Unknown time zone: {0}")]
    InvalidTimezone(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Bucketstore Configuration
#
# Environment variables override these settings:
# - BUCKETSTORE_ROOT_DIR
# - BUCKETSTORE_TIMEZONE
# - BUCKETSTORE_LOG_LEVEL
# - BUCKETSTORE_LOG_FORMAT

[catalog]
# Root of the category tree (holds the top-level category_name file)
root_dir = "~/.local/share/bucketstore"

# Time zone for default query date ranges (IANA name)
timezone = "UTC"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/bucketstore/bucketstore.log"
"#
    .to_string()
}
