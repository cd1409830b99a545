use anyhow::Result;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::rounding::Rounding;

/// Main configuration structure for the calibration tools
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CalibrationToolsConfig {
    /// Printer host connection
    pub octoprint: OctoPrintConfig,
    /// Where the test parameters are persisted
    pub storage: StorageConfig,
    /// Calibration defaults
    pub calibration: CalibrationConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OctoPrintConfig {
    /// Base URL of the OctoPrint instance
    pub base_url: String,
    /// API key (can be set via OCTOPRINT_API_KEY)
    pub api_key: Option<String>,
    /// Identifier of the calibration plugin
    pub plugin_id: String,
    pub request_timeout_seconds: u64,
}

impl Default for OctoPrintConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            api_key: None, // Will be read from env var
            plugin_id: crate::octoprint::PLUGIN_IDENTIFIER.to_string(),
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file holding the persisted parameters
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: ".calibration-tools/storage.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Decimals kept by every derived value
    pub rounding_decimals: u32,
    /// Initial remained length before the user measures one
    pub default_remained_length: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            rounding_decimals: 0,
            default_remained_length: crate::esteps::types::DEFAULT_REMAINED_LENGTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level, overridden by RUST_LOG
    pub log_level: String,
    /// Emit JSON log lines
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl CalibrationToolsConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (calibration-tools.toml, .calibration-tools-rc)
    /// 3. Environment variables (prefixed with CALIBRATION_TOOLS_, sections split by `__`)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Same as [`load`](Self::load) with the configuration files looked up in `dir`
    pub fn load_from(dir: &Path) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        let toml_file = dir.join("calibration-tools.toml");
        if toml_file.exists() {
            builder = builder.add_source(File::from(toml_file).format(FileFormat::Toml));
        }

        let rc_file = dir.join(".calibration-tools-rc");
        if rc_file.exists() {
            builder = builder.add_source(File::from(rc_file).format(FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("CALIBRATION_TOOLS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: CalibrationToolsConfig = builder.build()?.try_deserialize()?;

        if config.octoprint.api_key.is_none() {
            if let Ok(key) = std::env::var("OCTOPRINT_API_KEY") {
                config.octoprint.api_key = Some(key);
            }
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }

    pub fn rounding(&self) -> Rounding {
        Rounding::new(self.calibration.rounding_decimals)
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<CalibrationToolsConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        let _ = CalibrationToolsConfig::load_env_file();
        CalibrationToolsConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static CalibrationToolsConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = CalibrationToolsConfig::default();
        assert_eq!(config.octoprint.base_url, "http://localhost:5000");
        assert_eq!(config.octoprint.plugin_id, "CalibrationTools");
        assert_eq!(config.octoprint.request_timeout_seconds, 30);
        assert_eq!(config.storage.path, ".calibration-tools/storage.json");
        assert_eq!(config.calibration.rounding_decimals, 0);
        assert_eq!(config.calibration.default_remained_length, 20.0);
        assert_eq!(config.observability.log_level, "info");
        assert_eq!(config.rounding(), Rounding::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("calibration-tools.toml"),
            "[octoprint]\nbase_url = \"http://octopi.local\"\n\n[calibration]\nrounding_decimals = 2\n",
        )
        .unwrap();

        let config = CalibrationToolsConfig::load_from(dir.path()).unwrap();

        assert_eq!(config.octoprint.base_url, "http://octopi.local");
        assert_eq!(config.octoprint.plugin_id, "CalibrationTools");
        assert_eq!(config.calibration.rounding_decimals, 2);
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn test_rc_file_overrides_toml_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("calibration-tools.toml"),
            "[observability]\nlog_level = \"debug\"\njson_logs = true\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join(".calibration-tools-rc"),
            "[observability]\nlog_level = \"warn\"\n",
        )
        .unwrap();

        let config = CalibrationToolsConfig::load_from(dir.path()).unwrap();

        assert_eq!(config.observability.log_level, "warn");
        assert!(config.observability.json_logs);
    }

    #[test]
    fn test_save_to_file_round_trips() {
        let dir = TempDir::new().unwrap();
        let mut config = CalibrationToolsConfig::default();
        config.octoprint.api_key = Some("secret".to_string());
        config.storage.path = "/tmp/calibration.json".to_string();

        config
            .save_to_file(dir.path().join("calibration-tools.toml"))
            .unwrap();
        let loaded = CalibrationToolsConfig::load_from(dir.path()).unwrap();

        assert_eq!(loaded.octoprint.api_key.as_deref(), Some("secret"));
        assert_eq!(loaded.storage.path, "/tmp/calibration.json");
    }
}
