//! Collaborators of the virtual office controller

use std::fmt;

use async_trait::async_trait;

use crate::errors::ControllerError;
use crate::models::deployment::DeploymentStatus;

/// Remote API that provisions virtual offices
///
/// Implementations return errors only for transport level failures. "Not
/// available yet" is `Ok(None)`.
#[async_trait]
pub trait DeploymentBackend: Send + Sync {
    /// Get the connection link of the project's office, if it is reachable
    async fn fetch_connection_link(&self, project: &str) -> Result<Option<String>, ControllerError>;

    /// Get the status of the project's latest deployment
    async fn fetch_deployment_status(
        &self,
        project: &str,
    ) -> Result<Option<DeploymentStatus>, ControllerError>;

    /// Start provisioning an office for the project
    async fn deploy_vm(&self, project: &str) -> Result<(), ControllerError>;
}

/// Remote API that destroys virtual offices
#[async_trait]
pub trait VmTeardown: Send + Sync {
    async fn delete_vm(&self, project: &str) -> Result<(), ControllerError>;
}

/// Severity of a user facing message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}

/// Shows notifications to the user
pub trait MessagingService: Send + Sync {
    fn display_message(&self, text: &str, severity: Severity);
}

/// Navigates to a reachable office
pub trait ConnectionOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<(), ControllerError>;
}
