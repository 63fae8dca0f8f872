//! euphrosyne-tools API client

use std::sync::Arc;

use async_trait::async_trait;
use tools_api::models::{ConnectionLinkResponse, DeployQuery, DeploymentStatusResponse};
use tracing::info;

use crate::errors::ControllerError;
use crate::http::client::HttpClient;
use crate::models::deployment::DeploymentStatus;
use crate::office::backend::{DeploymentBackend, VmTeardown};

impl HttpClient {
    /// Get the connection link of a project's virtual office
    pub async fn get_connection_link(&self, project: &str) -> Result<Option<String>, ControllerError> {
        let response: Option<ConnectionLinkResponse> =
            self.get_optional(&["connect", project]).await?;
        Ok(response
            .and_then(|r| r.url)
            .filter(|url| !url.trim().is_empty()))
    }

    /// Get the status of a project's deployment
    pub async fn get_deployment_status(
        &self,
        project: &str,
    ) -> Result<Option<DeploymentStatus>, ControllerError> {
        let response: Option<DeploymentStatusResponse> =
            self.get_optional(&["deployments", project]).await?;
        Ok(response.map(|r| DeploymentStatus::from(r.status.as_str())))
    }

    /// Request the deployment of a project's virtual office
    pub async fn create_deployment(
        &self,
        project: &str,
        vm_size: Option<&str>,
    ) -> Result<(), ControllerError> {
        let query = DeployQuery {
            vm_size: vm_size.map(str::to_string),
        };
        self.post(&["deployments", project], &query).await
    }

    /// Delete a project's virtual office
    pub async fn delete_vm(&self, project: &str) -> Result<(), ControllerError> {
        self.delete(&["vms", project]).await
    }
}

/// [`DeploymentBackend`] backed by the tools API
pub struct ToolsBackend {
    http_client: Arc<HttpClient>,
    vm_size: Option<String>,
}

impl ToolsBackend {
    pub fn new(http_client: Arc<HttpClient>, vm_size: Option<String>) -> Self {
        Self {
            http_client,
            vm_size,
        }
    }
}

#[async_trait]
impl DeploymentBackend for ToolsBackend {
    async fn fetch_connection_link(&self, project: &str) -> Result<Option<String>, ControllerError> {
        self.http_client.get_connection_link(project).await
    }

    async fn fetch_deployment_status(
        &self,
        project: &str,
    ) -> Result<Option<DeploymentStatus>, ControllerError> {
        self.http_client.get_deployment_status(project).await
    }

    async fn deploy_vm(&self, project: &str) -> Result<(), ControllerError> {
        info!(
            "Requesting virtual office for {} (size: {})",
            project,
            self.vm_size.as_deref().unwrap_or("default")
        );
        self.http_client
            .create_deployment(project, self.vm_size.as_deref())
            .await
    }
}

#[async_trait]
impl VmTeardown for ToolsBackend {
    async fn delete_vm(&self, project: &str) -> Result<(), ControllerError> {
        self.http_client.delete_vm(project).await
    }
}
