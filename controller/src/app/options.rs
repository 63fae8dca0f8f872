//! Application configuration options

use std::time::Duration;

use secrecy::SecretString;

use crate::office::poller;
use crate::storage::settings::Settings;

/// What the controller should do once started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Command {
    /// Report the office, waiting for a running deployment to settle
    #[default]
    Watch,

    /// Like `Watch`, deploying an office first when none exists
    Deploy,

    /// Delete the office
    Delete,
}

/// Main application options
#[derive(Debug)]
pub struct AppOptions {
    /// Project whose office is controlled
    pub project: String,

    pub command: Command,

    /// Tools API client configuration
    pub tools: ToolsOptions,

    /// Deployment poller options
    pub poller: poller::Options,
}

impl AppOptions {
    pub fn from_settings(project: String, command: Command, settings: Settings) -> Self {
        Self {
            project,
            command,
            poller: poller::Options {
                interval: settings.polling.interval(),
                max_duration: settings.polling.max_duration(),
            },
            tools: ToolsOptions {
                base_url: settings.tools.base_url,
                token: settings.tools.token,
                vm_size: settings.tools.vm_size,
                request_timeout: Duration::from_secs(settings.tools.request_timeout_secs),
            },
        }
    }
}

/// Tools API client options
#[derive(Debug)]
pub struct ToolsOptions {
    pub base_url: String,
    pub token: Option<SecretString>,
    pub vm_size: Option<String>,
    pub request_timeout: Duration,
}

impl Default for ToolsOptions {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            token: None,
            vm_size: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}
