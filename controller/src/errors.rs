//! Error types for the virtual office controller

use thiserror::Error;

/// Main error type for the controller
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Unexpected HTTP status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Virtual office control is busy: {0}")]
    Busy(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ControllerError {
    /// Whether the error came from talking to the tools API
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ControllerError::HttpError(_)
                | ControllerError::HttpStatus { .. }
                | ControllerError::Backend(_)
        )
    }
}
