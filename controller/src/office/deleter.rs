//! Virtual office deletion

use std::sync::Arc;

use tracing::info;

use crate::errors::ControllerError;
use crate::office::backend::VmTeardown;
use crate::office::signal::{DeletionSignal, OfficeDeleted};

/// Deletes virtual offices and lets every attached control know
pub struct OfficeDeleter {
    teardown: Arc<dyn VmTeardown>,
    signal: DeletionSignal,
}

impl OfficeDeleter {
    pub fn new(teardown: Arc<dyn VmTeardown>, signal: DeletionSignal) -> Self {
        Self { teardown, signal }
    }

    /// Delete the project's office
    ///
    /// Nothing is broadcast when the backend refuses the deletion.
    pub async fn delete(&self, project: &str) -> Result<(), ControllerError> {
        if project.trim().is_empty() {
            return Err(ControllerError::ValidationError(
                "project identifier is empty".to_string(),
            ));
        }

        info!("Deleting virtual office of {}", project);
        self.teardown.delete_vm(project).await?;

        let notified = self.signal.notify(OfficeDeleted::for_project(project));
        info!(
            "Virtual office of {} deleted, {} control(s) notified",
            project, notified
        );
        Ok(())
    }
}
