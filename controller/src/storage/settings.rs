//! Settings file management

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use tracing::debug;

use crate::errors::ControllerError;
use crate::logs::LogLevel;

/// Controller settings
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log as JSON lines
    #[serde(default)]
    pub log_json: bool,

    /// Also write rolling log files into this directory
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Tools API configuration
    #[serde(default)]
    pub tools: ToolsSettings,

    /// Deployment polling configuration
    #[serde(default)]
    pub polling: PollingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            tools: ToolsSettings::default(),
            polling: PollingSettings::default(),
        }
    }
}

/// Tools API settings
#[derive(Debug, Deserialize)]
pub struct ToolsSettings {
    /// Base URL of the tools API
    #[serde(default = "default_tools_url")]
    pub base_url: String,

    /// Bearer token sent with every request
    #[serde(default)]
    pub token: Option<SecretString>,

    /// Size of the virtual machines to deploy, the API default when absent
    #[serde(default)]
    pub vm_size: Option<String>,

    /// Timeout of a single request in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_tools_url() -> String {
    "http://localhost:8001".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ToolsSettings {
    fn default() -> Self {
        Self {
            base_url: default_tools_url(),
            token: None,
            vm_size: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Polling settings
#[derive(Debug, Clone, Deserialize)]
pub struct PollingSettings {
    /// Delay between two status checks in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Give up after this many seconds, poll forever when absent
    #[serde(default)]
    pub max_duration_secs: Option<u64>,
}

fn default_interval_ms() -> u64 {
    8000
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_duration_secs: None,
        }
    }
}

impl PollingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_secs.map(Duration::from_secs)
    }
}

impl Settings {
    /// Read settings from a JSON file, a missing file yields the defaults
    pub async fn load(path: &Path) -> Result<Self, ControllerError> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings file at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let settings: Settings = serde_json::from_str(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ControllerError> {
        if self.polling.interval_ms == 0 {
            return Err(ControllerError::ConfigError(
                "polling.interval_ms must be positive".to_string(),
            ));
        }
        if self.tools.base_url.trim().is_empty() {
            return Err(ControllerError::ConfigError(
                "tools.base_url must be set".to_string(),
            ));
        }
        Ok(())
    }
}
