//! Process wide notification that a virtual office was deleted

use tokio::sync::broadcast;
use tracing::debug;

/// Deletion notification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OfficeDeleted {
    /// Project whose office was deleted, `None` means "any"
    pub project: Option<String>,
}

impl OfficeDeleted {
    pub fn for_project(project: impl Into<String>) -> Self {
        Self {
            project: Some(project.into()),
        }
    }

    /// Whether a control bound to `project` must react
    pub fn concerns(&self, project: &str) -> bool {
        self.project.as_deref().map_or(true, |p| p == project)
    }
}

/// Broadcast channel carrying [`OfficeDeleted`] events
///
/// Controllers subscribe explicitly, see `OfficeController::attach`.
#[derive(Debug, Clone)]
pub struct DeletionSignal {
    sender: broadcast::Sender<OfficeDeleted>,
}

impl DeletionSignal {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OfficeDeleted> {
        self.sender.subscribe()
    }

    /// Broadcast a deletion, returns how many subscribers received it
    pub fn notify(&self, event: OfficeDeleted) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("Office deletion broadcast without subscribers");
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for DeletionSignal {
    fn default() -> Self {
        Self::new(16)
    }
}
