//! API models

use serde::{Deserialize, Serialize};

/// Connection link response (`GET /connect/{project}`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionLinkResponse {
    #[serde(default)]
    pub url: Option<String>,
}

/// Deployment status response (`GET /deployments/{project}`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentStatusResponse {
    pub status: String,
}

/// Query parameters of a deployment request (`POST /deployments/{project}`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vm_size: Option<String>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: serde_json::Value,
}

impl ErrorResponse {
    /// Human readable form of the error detail
    pub fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
