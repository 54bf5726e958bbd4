//! Runtime configuration
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `BIZOBJ_`-prefixed environment variables (`BIZOBJ_MAX_CONCURRENT_RULES`,
//! `BIZOBJ_LOG__LEVEL`, ...).

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration result type
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(err: toml::ser::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// Logging section of the runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Minimum level name (trace, debug, info, warn, error)
    pub level: String,
    /// Print to stderr
    pub print: bool,
    /// Optional log file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            print: false,
            file: None,
        }
    }
}

/// Tunables shared by every business object and list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound on rules evaluated concurrently within one rule run
    pub max_concurrent_rules: usize,
    /// Buffer size of each object's change broadcast channel
    pub event_bus_capacity: usize,
    /// Logging settings
    pub log: LogSettings,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_rules: 8,
            event_bus_capacity: 1024,
            log: LogSettings::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?;
        let runtime: RuntimeConfig = config.try_deserialize()?;
        runtime.validate()?;
        Ok(runtime)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_rules == 0 {
            return Err(ConfigError::Validation(
                "max_concurrent_rules must be greater than 0".to_string(),
            ));
        }
        if self.event_bus_capacity == 0 {
            return Err(ConfigError::Validation(
                "event_bus_capacity must be greater than 0".to_string(),
            ));
        }
        if crate::logging::LogLevel::from_str(&self.log.level).is_none() {
            return Err(ConfigError::Validation(format!(
                "unknown log level '{}'",
                self.log.level
            )));
        }
        Ok(())
    }
}

/// Loads [`RuntimeConfig`] from a file and the environment
pub struct ConfigLoader {
    /// Configuration file path
    config_path: Option<PathBuf>,
    /// Environment prefix
    env_prefix: String,
}

impl ConfigLoader {
    /// Defaults plus `BIZOBJ_*` environment variables
    pub fn new() -> Self {
        Self {
            config_path: None,
            env_prefix: "BIZOBJ".to_string(),
        }
    }

    /// Also read the given TOML file (missing files are skipped)
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: Some(path.into()),
            env_prefix: "BIZOBJ".to_string(),
        }
    }

    /// Use a different environment prefix
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// The file this loader reads, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Build the layered configuration
    pub fn load(&self) -> Result<RuntimeConfig> {
        let mut builder = Config::builder();
        if let Some(path) = &self.config_path {
            builder = builder.add_source(File::from(path.clone()).required(false));
        }
        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let runtime: RuntimeConfig = builder.build()?.try_deserialize()?;
        runtime.validate()?;
        Ok(runtime)
    }

    /// Write the configuration to this loader's file as TOML
    pub fn save(&self, config: &RuntimeConfig) -> Result<()> {
        let path = self.config_path.as_ref().ok_or_else(|| {
            ConfigError::Validation("no configuration path to save to".to_string())
        })?;
        config.validate()?;
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        std::fs::write(path, config.to_toml_string()?)?;
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_concurrent_rules, 8);
        assert_eq!(config.event_bus_capacity, 1024);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RuntimeConfig::from_toml_str("max_concurrent_rules = 2\n").unwrap();
        assert_eq!(config.max_concurrent_rules, 2);
        assert_eq!(config.event_bus_capacity, 1024);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_nested_log_section() {
        let config = RuntimeConfig::from_toml_str("[log]\nlevel = \"debug\"\nprint = true\n").unwrap();
        assert_eq!(config.log.level, "debug");
        assert!(config.log.print);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let result = RuntimeConfig::from_toml_str("max_concurrent_rules = 0\n");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        let result = RuntimeConfig::from_toml_str("[log]\nlevel = \"loud\"\n");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_loader_missing_file_uses_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::with_path(temp_dir.path().join("absent.toml"))
            .with_env_prefix("BIZOBJ_TEST_MISSING");
        assert_eq!(loader.load().unwrap(), RuntimeConfig::default());
    }

    #[test]
    fn test_loader_save_then_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("conf").join("bizobj.toml");
        let loader = ConfigLoader::with_path(&path).with_env_prefix("BIZOBJ_TEST_SAVE");

        let mut config = RuntimeConfig::default();
        config.max_concurrent_rules = 3;
        config.log.level = "warn".to_string();
        loader.save(&config).unwrap();

        assert_eq!(loader.load().unwrap(), config);
    }

    #[test]
    fn test_environment_overrides_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("bizobj.toml");
        std::fs::write(&path, "max_concurrent_rules = 2\n").unwrap();

        std::env::set_var("BIZOBJ_TEST_ENV_MAX_CONCURRENT_RULES", "5");
        let loader = ConfigLoader::with_path(&path).with_env_prefix("BIZOBJ_TEST_ENV");
        let config = loader.load().unwrap();
        std::env::remove_var("BIZOBJ_TEST_ENV_MAX_CONCURRENT_RULES");

        assert_eq!(config.max_concurrent_rules, 5);
    }

    #[test]
    fn test_save_without_path_fails() {
        let loader = ConfigLoader::new();
        assert!(loader.save(&RuntimeConfig::default()).is_err());
    }

    proptest! {
        #[test]
        fn test_positive_limits_validate(rules in 1usize..512, capacity in 1usize..65536) {
            let config = RuntimeConfig {
                max_concurrent_rules: rules,
                event_bus_capacity: capacity,
                log: LogSettings::default(),
            };
            prop_assert!(config.validate().is_ok());
        }
    }
}
