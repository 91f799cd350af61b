//! Application configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{Result, WizardError};

/// Environment variable overriding the build tool executable
pub const PLATFORMIO_ENV_VAR: &str = "OATFW_PLATFORMIO";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Release catalog configuration
    pub catalog: CatalogConfig,
    /// Filesystem locations
    pub paths: PathsConfig,
    /// Build tool configuration
    pub platformio: PlatformioConfig,
    /// Background worker configuration
    pub worker: WorkerConfig,
    /// Anonymous usage reporting
    pub telemetry: TelemetryConfig,
}

/// Where releases come from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Releases API endpoint (JSON list with `name` and `zipball_url`)
    pub releases_url: String,
    /// Archive of the unstable branch, offered as the first release
    pub develop_archive_url: String,
    /// User agent sent with catalog and download requests
    pub user_agent: String,
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Download and extraction root
    pub work_dir: PathBuf,
}

/// Build tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformioConfig {
    /// Executable name or path
    pub executable: String,
    /// Advisory start timeout in seconds
    pub start_timeout_secs: u64,
    /// `settings set <key> <value>` pairs applied before building
    pub settings: Vec<(String, String)>,
}

/// Background worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// How long a new stage waits for the worker to go idle
    pub idle_wait_secs: u64,
}

/// Anonymous usage reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Submit a record after each successful upload
    pub enabled: bool,
    /// Collector endpoint (HTTP POST, JSON); required when reporting is enabled
    pub endpoint: Option<String>,
    /// IP geolocation lookup returning `lat` and `lon`
    pub location_url: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            releases_url:
                "https://api.github.com/repos/OpenAstroTech/OpenAstroTracker-Firmware/releases"
                    .to_string(),
            develop_archive_url: "https://github.com/OpenAstroTech/OpenAstroTracker-Firmware/archive/refs/heads/develop.zip".to_string(),
            user_agent: format!("{}/{}", crate::APP_NAME, crate::VERSION),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            work_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(crate::APP_NAME),
        }
    }
}

impl Default for PlatformioConfig {
    fn default() -> Self {
        Self {
            executable: "platformio".to_string(),
            start_timeout_secs: 10,
            settings: vec![
                ("check_platformio_interval".to_string(), "9999".to_string()),
                ("enable_telemetry".to_string(), "No".to_string()),
            ],
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { idle_wait_secs: 5 }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            location_url: "http://ip-api.com/json".to_string(),
        }
    }
}

impl PlatformioConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }
}

impl WorkerConfig {
    pub fn idle_wait(&self) -> Duration {
        Duration::from_secs(self.idle_wait_secs)
    }
}

impl TelemetryConfig {
    /// Collector endpoint, or a config error when reporting cannot work
    pub fn require_endpoint(&self) -> Result<&str> {
        match self.endpoint.as_deref().map(str::trim) {
            Some(endpoint) if !endpoint.is_empty() => Ok(endpoint),
            _ => Err(WizardError::Config(
                "usage reporting needs telemetry.endpoint to be set".to_string(),
            )),
        }
    }
}

impl AppConfig {
    /// Default config file location (`<config_dir>/oatfw/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(crate::APP_NAME).join("config.toml"))
    }

    /// Parse a TOML config document; missing keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load `path` if given, else the default location if it exists, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(default) => Self::read_file(&default)?,
                None => Self::default(),
            },
        };

        if let Ok(exe) = std::env::var(PLATFORMIO_ENV_VAR) {
            if !exe.trim().is_empty() {
                log::debug!("Using build tool from {}: {}", PLATFORMIO_ENV_VAR, exe);
                config.platformio.executable = exe;
            }
        }
        if config.telemetry.enabled {
            config.telemetry.require_endpoint()?;
        }
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        log::debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| {
            WizardError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
[platformio]
executable = "/opt/pio/bin/pio"

[telemetry]
enabled = true
"#,
        )
        .unwrap();
        assert_eq!(config.platformio.executable, "/opt/pio/bin/pio");
        assert_eq!(config.platformio.start_timeout_secs, 10);
        assert!(config.telemetry.enabled);
        assert_eq!(config.worker.idle_wait(), Duration::from_secs(5));
        assert!(config.catalog.releases_url.ends_with("/releases"));
    }

    #[test]
    fn test_enabled_telemetry_requires_endpoint() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[telemetry]\nenabled = true\n").unwrap();
        assert!(matches!(AppConfig::load(Some(&path)), Err(WizardError::Config(_))));

        std::fs::write(
            &path,
            "[telemetry]\nenabled = true\nendpoint = \"https://collector.local/usage\"\n",
        )
        .unwrap();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(
            config.telemetry.require_endpoint().unwrap(),
            "https://collector.local/usage"
        );
        assert!(AppConfig::default().telemetry.require_endpoint().is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[worker]\nidle_wait_secs = 2\n").unwrap();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.worker.idle_wait_secs, 2);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[worker\n").unwrap();
        assert!(matches!(AppConfig::load(Some(&path)), Err(WizardError::Config(_))));
        assert!(matches!(
            AppConfig::load(Some(&dir.path().join("missing.toml"))),
            Err(WizardError::Config(_))
        ));
    }
}
