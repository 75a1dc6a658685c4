use fittrack_core::TrackerConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Activity tracker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingSettings {
    /// Seconds between background syncs
    pub sync_interval_secs: u64,
    /// Requested seconds between location fixes
    pub location_interval_secs: u64,
    /// Ignore fixes less accurate than this many meters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fix_accuracy_m: Option<f64>,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            sync_interval_secs: 300,
            location_interval_secs: 10,
            max_fix_accuracy_m: None,
        }
    }
}

impl TrackingSettings {
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            // A zero interval would make tokio's ticker panic
            sync_interval: Duration::from_secs(self.sync_interval_secs.max(1)),
            location_interval: Duration::from_secs(self.location_interval_secs.max(1)),
            max_fix_accuracy_m: self.max_fix_accuracy_m,
        }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Path to the SQLite database
    pub database_path: ConfigValue<PathBuf>,
    /// Owner of every record read or written
    pub user_id: ConfigValue<String>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub tracking: TrackingSettings,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    user_id: Option<String>,
    tracking: Option<TrackingSettings>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut database_path = ConfigValue::new(
            Self::default_data_dir().join("fittrack.db"),
            ConfigSource::Default,
        );
        let mut user_id = ConfigValue::new("default".to_string(), ConfigSource::Default);
        let mut config_file = None;
        let mut tracking = TrackingSettings::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(db_path) = file_config.database_path {
                // Relative paths are relative to the config file
                let resolved_path = if db_path.is_relative() {
                    path.parent().map(|p| p.join(&db_path)).unwrap_or(db_path)
                } else {
                    db_path
                };
                database_path = ConfigValue::new(resolved_path, ConfigSource::File);
            }
            if let Some(user) = file_config.user_id {
                user_id = ConfigValue::new(user, ConfigSource::File);
            }
            if let Some(settings) = file_config.tracking {
                tracking = settings;
            }
        }

        if let Ok(db_path) = std::env::var("FITTRACK_DATABASE_PATH") {
            database_path = ConfigValue::new(PathBuf::from(db_path), ConfigSource::Environment);
        }
        if let Ok(user) = std::env::var("FITTRACK_USER_ID") {
            user_id = ConfigValue::new(user, ConfigSource::Environment);
        }
        if let Ok(secs) = std::env::var("FITTRACK_SYNC_INTERVAL_SECS") {
            tracking.sync_interval_secs = secs.trim().parse().map_err(|_| {
                ConfigError::InvalidValue("FITTRACK_SYNC_INTERVAL_SECS".to_string(), secs.clone())
            })?;
        }

        Ok(Self {
            database_path,
            user_id,
            config_file,
            tracking,
        })
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/fittrack/
    /// - macOS: ~/Library/Application Support/fittrack/
    /// - Windows: %APPDATA%/fittrack/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fittrack")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/fittrack/
    /// - macOS: ~/Library/Application Support/fittrack/
    /// - Windows: %APPDATA%/fittrack/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fittrack")
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(String, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue(name, value) => {
                write!(f, "Invalid value for {}: '{}'", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
