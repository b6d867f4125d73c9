//! Configuration module for the content enumerator
//!
//! Supports loading configuration from a TOML file.
//! Configuration is stored in a standard location:
//! - Windows: %APPDATA%\wpd_enum\config.toml
//! - Linux/macOS: ~/.config/wpd_enum/config.toml

use crate::core::fetcher::DEFAULT_PAGE_SIZE;
use crate::device::traits::{AccessConfig, ClientInfo, DeviceBinding};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Application name used for config directory
const APP_NAME: &str = "wpd_enum";

/// Default config file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Files checked in the current directory before the standard location
const LOCAL_CONFIG_PATHS: [&str; 2] = ["./wpd_enum.toml", "./config.toml"];

/// Get the standard configuration directory for the application.
///
/// Returns:
/// - Windows: %APPDATA%\wpd_enum
/// - Linux/macOS: ~/.config/wpd_enum
pub fn get_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA")
            .ok()
            .map(|appdata| PathBuf::from(appdata).join(APP_NAME))
    }

    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join(".config").join(APP_NAME))
    }
}

/// Get the standard configuration file path.
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tree walk settings
    pub enumeration: EnumerationConfig,

    /// Device polling and pass settings
    pub discovery: DiscoveryConfig,

    /// Client identity announced when opening a device
    pub client: ClientInfo,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Tree walk settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnumerationConfig {
    /// Object ids requested per page
    pub fetch_count: u32,
}

/// Device polling and pass settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Refreshes attempted while no device is visible
    pub max_retries: u32,

    /// Seconds to wait before each refresh
    pub retry_delay_secs: u64,

    /// Number of discovery-and-enumeration cycles
    pub passes: usize,

    /// Seconds between cycles
    pub pass_interval_secs: u64,

    /// Activate devices through the free-threaded class
    pub use_alternate_binding: bool,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Also write log lines to `log_file`
    pub log_to_file: bool,

    /// Log file path
    pub log_file: PathBuf,
}

impl Default for EnumerationConfig {
    fn default() -> Self {
        Self {
            fetch_count: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay_secs: 5,
            passes: 1,
            pass_interval_secs: 5,
            use_alternate_binding: false,
        }
    }
}

impl DiscoveryConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn pass_interval(&self) -> Duration {
        Duration::from_secs(self.pass_interval_secs)
    }

    pub fn binding(&self) -> DeviceBinding {
        if self.use_alternate_binding {
            DeviceBinding::FreeThreaded
        } else {
            DeviceBinding::Standard
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: false,
            log_file: PathBuf::from("wpd_enum.log"),
        }
    }
}

impl Config {
    /// Read-only access settings for opening devices
    pub fn access(&self) -> AccessConfig {
        AccessConfig::read_only(self.client.clone())
    }

    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))
    }

    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./wpd_enum.toml
    /// 2. ./config.toml
    /// 3. Standard config location
    ///
    /// If no config file is found, returns default configuration.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// First existing config file in search order
    pub fn find_config_file() -> Option<PathBuf> {
        LOCAL_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .chain(get_config_path())
            .find(|path| path.exists())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path.as_ref(), content)
            .map_err(|e| ConfigError::WriteError(path.as_ref().to_path_buf(), e.to_string()))
    }

    /// Generate a default config file with comments
    pub fn generate_default_config() -> String {
        include_str!("../../config.example.toml").to_string()
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Failed to read config file '{}': {1}", .0.display())]
    ReadError(PathBuf, String),

    #[error("Failed to parse config file '{}': {1}", .0.display())]
    ParseError(PathBuf, String),

    #[error("Failed to serialize configuration: {0}")]
    SerializeError(String),

    #[error("Failed to write config file '{}': {1}", .0.display())]
    WriteError(PathBuf, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.enumeration.fetch_count, 10);
        assert_eq!(config.discovery.max_retries, 5);
        assert_eq!(config.discovery.retry_delay(), Duration::from_secs(5));
        assert_eq!(config.discovery.passes, 1);
        assert_eq!(config.discovery.binding(), DeviceBinding::Standard);
        assert_eq!(config.client.name, "WPD client");
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.log_to_file);
    }

    #[test]
    fn test_example_config_parses_to_defaults() {
        let config: Config = toml::from_str(&Config::generate_default_config()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [enumeration]
            fetch_count = 25

            [discovery]
            passes = 3
            use_alternate_binding = true
            "#,
        )
        .unwrap();

        assert_eq!(config.enumeration.fetch_count, 25);
        assert_eq!(config.discovery.passes, 3);
        assert_eq!(config.discovery.max_retries, 5);
        assert_eq!(config.discovery.binding(), DeviceBinding::FreeThreaded);
        assert_eq!(config.client, ClientInfo::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.enumeration.fetch_count = 3;
        config.discovery.retry_delay_secs = 1;
        config.client.name = "Inventory".to_string();
        config.logging.level = "debug".to_string();

        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = Config::load(dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[enumeration\nfetch_count = ").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_, _)));
        assert!(err.to_string().starts_with("Failed to parse config file"));
    }

    #[test]
    fn test_access_uses_client_identity() {
        let mut config = Config::default();
        config.client.name = "Scanner".to_string();

        let access = config.access();
        assert_eq!(access.client.name, "Scanner");
        assert_eq!(access, AccessConfig::read_only(config.client.clone()));
    }
}
