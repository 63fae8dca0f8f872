//! Deployment models

use std::fmt;

/// Status of a virtual office deployment, as reported by the tools API
///
/// Backends are not consistent about the success token, both `Succeeded`
/// and `Success` are seen in the wild. Everything is normalised to
/// [`DeploymentStatus::Succeeded`] on parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
    /// Any status the controller does not know about. Never terminal.
    Other(String),
}

impl DeploymentStatus {
    /// Whether polling can stop on this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Succeeded | DeploymentStatus::Failed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            DeploymentStatus::NotStarted => "NotStarted",
            DeploymentStatus::Running => "Running",
            DeploymentStatus::Succeeded => "Succeeded",
            DeploymentStatus::Failed => "Failed",
            DeploymentStatus::Other(s) => s,
        }
    }
}

impl From<&str> for DeploymentStatus {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "notstarted" | "not_started" => DeploymentStatus::NotStarted,
            "running" | "accepted" => DeploymentStatus::Running,
            "succeeded" | "success" => DeploymentStatus::Succeeded,
            "failed" | "canceled" | "cancelled" => DeploymentStatus::Failed,
            _ => DeploymentStatus::Other(s.trim().to_string()),
        }
    }
}

impl std::str::FromStr for DeploymentStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(DeploymentStatus::from(s))
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for DeploymentStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for DeploymentStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(DeploymentStatus::from(s.as_str()))
    }
}
