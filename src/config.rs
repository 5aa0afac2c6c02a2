use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CONTAINER: &str = "iCloud.starterkit";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Store container the records live in; tagged onto every log line.
    pub container: String,
    /// How long a single store round-trip may take before it counts as
    /// the store being unavailable.
    pub operation_timeout: Duration,
    /// `tracing` filter directive, e.g. "starter_kit=debug".
    pub log_filter: Option<String>,
    /// Config file used (if any)
    pub config_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            container: DEFAULT_CONTAINER.to_string(),
            operation_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            log_filter: None,
            config_file: None,
        }
    }
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    container: Option<String>,
    operation_timeout_secs: Option<u64>,
    log_filter: Option<String>,
}

impl ClientConfig {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            if let Some(container) = file_config.container {
                config.container = container;
            }
            if let Some(secs) = file_config.operation_timeout_secs {
                config.operation_timeout = Duration::from_secs(secs);
            }
            config.log_filter = file_config.log_filter;
            config.config_file = Some(path);
        }

        if let Ok(container) = std::env::var("STARTERKIT_CONTAINER") {
            config.container = container;
        }
        if let Ok(secs) = std::env::var("STARTERKIT_TIMEOUT_SECS") {
            let secs = secs
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue("STARTERKIT_TIMEOUT_SECS", secs))?;
            config.operation_timeout = Duration::from_secs(secs);
        }
        if let Ok(filter) = std::env::var("STARTERKIT_LOG") {
            config.log_filter = Some(filter);
        }

        Ok(config)
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/starterkit/
    /// - macOS: ~/Library/Application Support/starterkit/
    /// - Windows: %APPDATA%/starterkit/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("starterkit")
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {1}", .0.display())]
    ReadError(PathBuf, std::io::Error),

    #[error("Failed to parse config file '{}': {1}", .0.display())]
    ParseError(PathBuf, serde_yaml::Error),

    #[error("Invalid value for {0}: '{1}'")]
    InvalidValue(&'static str, String),
}
