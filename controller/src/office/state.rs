//! State machine for a virtual office control

use serde::Serialize;

use crate::errors::ControllerError;
use crate::models::deployment::DeploymentStatus;

pub const LABEL_CREATE: &str = "Create virtual office";
pub const LABEL_CREATING: &str = "Creating virtual office...";
pub const LABEL_ACCESS: &str = "Access virtual office";

/// Lifecycle state of a virtual office, as seen by one control
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfficeState {
    /// Not initialized yet
    Unknown,

    /// No office exists, one can be created
    Idle,

    /// A deployment request is in flight
    Deploying,

    /// Waiting for the deployment to reach a terminal status
    Polling(Option<DeploymentStatus>),

    /// The office is reachable at this URL
    Ready(String),

    /// The last deployment failed, one can be created again
    Failed,
}

/// Inputs of the state machine
#[derive(Debug, Clone)]
pub enum OfficeEvent {
    /// A connection link was obtained
    ConnectionFound(String),

    /// A deployment status was obtained
    StatusObserved(Option<DeploymentStatus>),

    /// Deployment succeeded but the backend gave no link
    LinkUnavailable,

    /// Initialization could not reach the backend
    InitFailed,

    /// Initialization is attempted again after a failed lookup
    RetryLookup,

    /// The user asked for a new office
    DeployRequested,

    /// The backend accepted the deployment request
    DeployAccepted,

    /// The backend refused the deployment request
    DeployRejected,

    /// The deployment is considered failed
    DeploymentFailed,

    /// The office was deleted
    Deleted,
}

impl OfficeState {
    /// Compute the state following `event`
    pub fn apply(&self, event: &OfficeEvent) -> Result<OfficeState, ControllerError> {
        use OfficeEvent as E;
        use OfficeState as S;

        let next = match (self, event) {
            // Deletion and failure reset are accepted from anywhere
            (_, E::Deleted) => S::Idle,
            (_, E::DeploymentFailed) => S::Failed,

            // From Unknown
            (S::Unknown, E::ConnectionFound(url)) => S::Ready(url.clone()),
            (S::Unknown, E::StatusObserved(Some(DeploymentStatus::Running))) => {
                S::Polling(Some(DeploymentStatus::Running))
            }
            (S::Unknown, E::StatusObserved(Some(DeploymentStatus::Failed))) => S::Failed,
            (S::Unknown, E::StatusObserved(_)) => S::Idle,
            (S::Unknown, E::InitFailed) => S::Idle,

            // From Idle / Failed
            (S::Idle | S::Failed, E::DeployRequested) => S::Deploying,
            (S::Idle, E::RetryLookup) => S::Unknown,

            // From Deploying
            (S::Deploying, E::DeployAccepted) => S::Polling(None),
            (S::Deploying, E::DeployRejected) => S::Idle,

            // From Polling
            (S::Polling(_), E::StatusObserved(Some(DeploymentStatus::Failed))) => S::Failed,
            (S::Polling(_), E::StatusObserved(status)) => S::Polling(status.clone()),
            (S::Polling(Some(DeploymentStatus::Succeeded)), E::ConnectionFound(url)) => {
                S::Ready(url.clone())
            }
            (S::Polling(Some(DeploymentStatus::Succeeded)), E::LinkUnavailable) => S::Idle,

            (state, event) => {
                return Err(ControllerError::InvalidTransition(format!(
                    "{:?} -> {:?}",
                    state, event
                )));
            }
        };

        Ok(next)
    }

    /// Whether the user action may be invoked
    pub fn is_enabled(&self) -> bool {
        matches!(self, OfficeState::Idle | OfficeState::Failed | OfficeState::Ready(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            OfficeState::Unknown | OfficeState::Idle | OfficeState::Failed => LABEL_CREATE,
            OfficeState::Deploying | OfficeState::Polling(_) => LABEL_CREATING,
            OfficeState::Ready(_) => LABEL_ACCESS,
        }
    }

    pub fn connection_url(&self) -> Option<&str> {
        match self {
            OfficeState::Ready(url) => Some(url),
            _ => None,
        }
    }

    /// Last observed deployment status
    pub fn deployment_status(&self) -> Option<DeploymentStatus> {
        match self {
            OfficeState::Polling(status) => status.clone(),
            OfficeState::Ready(_) => Some(DeploymentStatus::Succeeded),
            OfficeState::Failed => Some(DeploymentStatus::Failed),
            _ => None,
        }
    }
}

/// Why a control sits in `Idle`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleReason {
    /// Neither an office nor a deployment was found
    NoOffice,

    /// The initial lookup failed, the office may exist
    LookupFailed,

    /// A deployment succeeded without a usable connection link
    LinkUnavailable,

    /// The backend refused the deployment request
    DeployRejected,

    Deleted,
}

impl IdleReason {
    /// Reason recorded when `event` leads to `Idle`
    pub fn from_event(event: &OfficeEvent) -> Self {
        match event {
            OfficeEvent::InitFailed => IdleReason::LookupFailed,
            OfficeEvent::LinkUnavailable => IdleReason::LinkUnavailable,
            OfficeEvent::DeployRejected => IdleReason::DeployRejected,
            OfficeEvent::Deleted => IdleReason::Deleted,
            _ => IdleReason::NoOffice,
        }
    }
}

/// What a host UI gets to see of the control
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OfficeView {
    pub label: &'static str,
    pub enabled: bool,
    pub connection_url: Option<String>,
    pub deployment_status: Option<DeploymentStatus>,
    pub polling: bool,
}

impl OfficeView {
    pub fn new(state: &OfficeState, polling: bool) -> Self {
        Self {
            label: state.label(),
            enabled: state.is_enabled(),
            connection_url: state.connection_url().map(str::to_string),
            deployment_status: state.deployment_status(),
            polling,
        }
    }
}
