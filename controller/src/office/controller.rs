//! Virtual office lifecycle controller
//!
//! Discovers whether a project's virtual office exists, triggers its
//! deployment on user request and polls the tools API until the
//! deployment settles. Every continuation that resumes after a backend
//! call re-validates the controller's generation before touching state,
//! so answers computed for a state that was reset meanwhile are dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::ControllerError;
use crate::models::deployment::DeploymentStatus;
use crate::office::backend::{ConnectionOpener, DeploymentBackend, MessagingService, Severity};
use crate::office::poller::{self, PollTask, Tick};
use crate::office::signal::DeletionSignal;
use crate::office::state::{IdleReason, OfficeEvent, OfficeState, OfficeView};
use crate::utils::instance_id;

pub const FAILURE_MESSAGE: &str =
    "We could not create the virtual office. Please contact an administrator.";
pub const TIMEOUT_MESSAGE: &str =
    "The virtual office is taking too long to start. Please try again later.";

/// Result of one status check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Deployment still in progress
    Pending,

    /// Deployment finished, the connection link was looked up
    Succeeded,

    /// Deployment failed, the control was reset
    Failed,

    /// The control was reset while the check was in flight, answer dropped
    Stale,
}

struct Core {
    state: OfficeState,
    generation: u64,
    next_epoch: u64,
    poll_task: Option<PollTask>,
    deletion_listener: Option<JoinHandle<()>>,
    idle_reason: Option<IdleReason>,
}

impl Core {
    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    fn awaiting_deployment(&self) -> bool {
        matches!(self.state, OfficeState::Polling(_))
    }
}

struct Inner {
    id: String,
    project: String,
    backend: Arc<dyn DeploymentBackend>,
    messaging: Arc<dyn MessagingService>,
    opener: Arc<dyn ConnectionOpener>,
    options: poller::Options,
    core: Mutex<Core>,
    view_tx: watch::Sender<OfficeView>,
}

impl Inner {
    fn core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, core: &Core) {
        self.view_tx
            .send_replace(OfficeView::new(&core.state, core.poll_task.is_some()));
    }

    fn transition(&self, core: &mut Core, event: OfficeEvent) -> Result<(), ControllerError> {
        let next = core.state.apply(&event)?;
        if next != core.state {
            debug!("[{}] {:?} -> {:?}", self.id, core.state, next);
        }
        core.idle_reason = (next == OfficeState::Idle).then(|| IdleReason::from_event(&event));
        core.state = next;
        self.publish(core);
        Ok(())
    }

    /// Invalidate in-flight continuations, cancel polling and apply `event`
    fn reset(&self, core: &mut Core, event: OfficeEvent) {
        core.generation += 1;
        if let Some(task) = core.poll_task.take() {
            task.cancel();
        }
        if let Err(e) = self.transition(core, event) {
            error!("[{}] Reset rejected: {}", self.id, e);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let core = self.core.get_mut().unwrap_or_else(PoisonError::into_inner);
        core.poll_task.take();
        if let Some(listener) = core.deletion_listener.take() {
            listener.abort();
        }
    }
}

/// Controls the virtual office of one project
///
/// Clones share the same state.
#[derive(Clone)]
pub struct OfficeController {
    inner: Arc<Inner>,
}

impl OfficeController {
    pub fn new(
        project: impl Into<String>,
        backend: Arc<dyn DeploymentBackend>,
        messaging: Arc<dyn MessagingService>,
        opener: Arc<dyn ConnectionOpener>,
        options: poller::Options,
    ) -> Result<Self, ControllerError> {
        let project = project.into();
        if project.trim().is_empty() {
            return Err(ControllerError::ValidationError(
                "project identifier is empty".to_string(),
            ));
        }
        if options.interval.is_zero() {
            return Err(ControllerError::ValidationError(
                "polling interval must be positive".to_string(),
            ));
        }

        let state = OfficeState::Unknown;
        let (view_tx, _) = watch::channel(OfficeView::new(&state, false));

        let inner = Inner {
            id: instance_id(),
            project,
            backend,
            messaging,
            opener,
            options,
            core: Mutex::new(Core {
                state,
                generation: 0,
                next_epoch: 0,
                poll_task: None,
                deletion_listener: None,
                idle_reason: None,
            }),
            view_tx,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn project(&self) -> &str {
        &self.inner.project
    }

    /// Current presentation of the control
    pub fn view(&self) -> OfficeView {
        self.inner.view_tx.borrow().clone()
    }

    /// Watch every presentation change
    pub fn subscribe(&self) -> watch::Receiver<OfficeView> {
        self.inner.view_tx.subscribe()
    }

    pub fn state(&self) -> OfficeState {
        self.inner.core().state.clone()
    }

    pub fn is_polling(&self) -> bool {
        self.inner.core().poll_task.is_some()
    }

    /// Why the control is in its "create" state, `None` in any other state
    pub fn idle_reason(&self) -> Option<IdleReason> {
        self.inner.core().idle_reason
    }

    // ============================== INITIALIZATION =============================== //

    /// Find out whether the office exists or is being deployed
    ///
    /// Does nothing once the control left its initial state, unless the
    /// previous lookup failed. On error the control is left in its "create"
    /// state and the error is returned.
    pub async fn initialize(&self) -> Result<(), ControllerError> {
        let generation = {
            let mut core = self.inner.core();
            if core.idle_reason == Some(IdleReason::LookupFailed) {
                info!("[{}] Retrying virtual office lookup", self.inner.id);
                self.inner.transition(&mut core, OfficeEvent::RetryLookup)?;
            } else if core.state != OfficeState::Unknown {
                debug!("[{}] Already initialized", self.inner.id);
                return Ok(());
            }
            core.generation
        };

        info!(
            "[{}] Looking up virtual office of {}",
            self.inner.id, self.inner.project
        );

        if let Err(e) = self.discover(generation).await {
            warn!("[{}] Virtual office lookup failed: {}", self.inner.id, e);
            let mut core = self.inner.core();
            if core.is_current(generation) && core.state == OfficeState::Unknown {
                self.inner.transition(&mut core, OfficeEvent::InitFailed)?;
            }
            return Err(e);
        }
        Ok(())
    }

    async fn discover(&self, generation: u64) -> Result<(), ControllerError> {
        let project = self.inner.project.as_str();

        let link = self
            .inner
            .backend
            .fetch_connection_link(project)
            .await?
            .filter(|url| !url.is_empty());
        if let Some(url) = link {
            let mut core = self.inner.core();
            if core.is_current(generation) {
                info!("[{}] Virtual office is reachable", self.inner.id);
                self.inner
                    .transition(&mut core, OfficeEvent::ConnectionFound(url))?;
            }
            return Ok(());
        }

        let status = self.inner.backend.fetch_deployment_status(project).await?;
        {
            let mut core = self.inner.core();
            if !core.is_current(generation) {
                debug!("[{}] Discarding status {:?} after reset", self.inner.id, status);
                return Ok(());
            }
            self.inner
                .transition(&mut core, OfficeEvent::StatusObserved(status.clone()))?;
        }

        match status {
            Some(DeploymentStatus::Running) => self.wait_from(generation).await,
            Some(DeploymentStatus::Failed) => {
                self.on_failed_deployment();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    // ============================== USER ACTIVATION ============================== //

    /// The single user action: open the office if it is reachable, deploy it otherwise
    ///
    /// Interaction is disabled before the deployment request goes out. A
    /// rejected request re-enables it and the error is returned without any
    /// user notification.
    pub async fn activate(&self) -> Result<(), ControllerError> {
        let generation = {
            let mut core = self.inner.core();
            if let OfficeState::Ready(url) = &core.state {
                let url = url.clone();
                drop(core);
                info!("[{}] Opening virtual office", self.inner.id);
                return self.inner.opener.open(&url);
            }
            if !core.state.is_enabled() {
                return Err(ControllerError::Busy(format!("{:?}", core.state)));
            }
            self.inner
                .transition(&mut core, OfficeEvent::DeployRequested)?;
            core.generation
        };

        info!(
            "[{}] Deploying virtual office of {}",
            self.inner.id, self.inner.project
        );
        let result = self.inner.backend.deploy_vm(&self.inner.project).await;

        {
            let mut core = self.inner.core();
            if !core.is_current(generation) || core.state != OfficeState::Deploying {
                debug!("[{}] Discarding deployment answer after reset", self.inner.id);
                return result;
            }
            match &result {
                Ok(()) => self
                    .inner
                    .transition(&mut core, OfficeEvent::DeployAccepted)?,
                Err(e) => {
                    warn!("[{}] Deployment request rejected: {}", self.inner.id, e);
                    self.inner
                        .transition(&mut core, OfficeEvent::DeployRejected)?;
                }
            }
        }

        result?;
        self.wait_from(generation).await
    }

    // ================================== POLLING ================================== //

    /// Check once right away, then keep checking on the poll interval
    ///
    /// Only valid while a deployment is in progress. Does nothing if a poll
    /// task is already running.
    pub async fn wait_for_completion(&self) -> Result<(), ControllerError> {
        let generation = self.inner.core().generation;
        self.wait_from(generation).await
    }

    async fn wait_from(&self, generation: u64) -> Result<(), ControllerError> {
        {
            let core = self.inner.core();
            if !core.is_current(generation) {
                return Ok(());
            }
            if core.poll_task.is_some() {
                warn!("[{}] Already polling, not starting another poller", self.inner.id);
                return Ok(());
            }
            if !core.awaiting_deployment() {
                return Err(ControllerError::InvalidTransition(format!(
                    "cannot wait for a deployment while {:?}",
                    core.state
                )));
            }
        }

        match self.check_progress().await {
            Ok(PollOutcome::Pending) => {}
            Ok(outcome) => {
                debug!("[{}] Deployment settled on first check: {:?}", self.inner.id, outcome);
                return Ok(());
            }
            Err(e) => {
                warn!("[{}] Deployment status check failed: {}", self.inner.id, e);
            }
        }

        self.start_polling(generation);
        Ok(())
    }

    fn start_polling(&self, generation: u64) {
        let mut core = self.inner.core();
        if !core.is_current(generation) || !core.awaiting_deployment() || core.poll_task.is_some() {
            return;
        }

        core.next_epoch += 1;
        let epoch = core.next_epoch;
        let options = self.inner.options.clone();
        let weak = Arc::downgrade(&self.inner);

        let handle = tokio::spawn(async move {
            poller::run(&options, |elapsed| {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(inner) => OfficeController { inner }.poll_tick(epoch, elapsed).await,
                        None => Tick::Stop,
                    }
                }
            })
            .await;
        });

        debug!(
            "[{}] Polling every {:?}",
            self.inner.id, self.inner.options.interval
        );
        core.poll_task = Some(PollTask::new(epoch, handle));
        self.inner.publish(&core);
    }

    async fn poll_tick(&self, epoch: u64, elapsed: Duration) -> Tick {
        {
            let core = self.inner.core();
            if core.poll_task.as_ref().map(PollTask::epoch) != Some(epoch) {
                debug!("[{}] Poll task {} superseded", self.inner.id, epoch);
                return Tick::Stop;
            }
        }

        if let Some(max_duration) = self.inner.options.max_duration {
            if elapsed >= max_duration {
                self.on_poll_timeout(elapsed);
                return Tick::Stop;
            }
        }

        match self.check_progress().await {
            Ok(PollOutcome::Pending) => Tick::Continue,
            Ok(_) => Tick::Stop,
            Err(e) if e.is_transport() => {
                warn!("[{}] Deployment status check failed: {}", self.inner.id, e);
                Tick::Continue
            }
            Err(e) => {
                error!("[{}] Deployment status check failed: {}", self.inner.id, e);
                Tick::Continue
            }
        }
    }

    /// Fetch the deployment status once and act on it
    ///
    /// `Succeeded` stops polling and looks up the connection link, `Failed`
    /// resets the control. Anything else is only recorded.
    pub async fn check_progress(&self) -> Result<PollOutcome, ControllerError> {
        let generation = self.inner.core().generation;

        let status = self
            .inner
            .backend
            .fetch_deployment_status(&self.inner.project)
            .await?;

        let outcome = {
            let mut core = self.inner.core();
            if !core.is_current(generation) || !core.awaiting_deployment() {
                debug!("[{}] Discarding stale status {:?}", self.inner.id, status);
                return Ok(PollOutcome::Stale);
            }

            match status {
                Some(DeploymentStatus::Failed) => {
                    self.inner.reset(&mut core, OfficeEvent::DeploymentFailed);
                    PollOutcome::Failed
                }
                Some(DeploymentStatus::Succeeded) => {
                    self.inner.transition(
                        &mut core,
                        OfficeEvent::StatusObserved(Some(DeploymentStatus::Succeeded)),
                    )?;
                    // Called from within the poll task, aborting it here would
                    // cancel the link lookup below
                    if let Some(task) = core.poll_task.take() {
                        task.detach();
                    }
                    self.inner.publish(&core);
                    PollOutcome::Succeeded
                }
                status => {
                    debug!("[{}] Deployment status: {:?}", self.inner.id, status);
                    self.inner
                        .transition(&mut core, OfficeEvent::StatusObserved(status))?;
                    PollOutcome::Pending
                }
            }
        };

        match outcome {
            PollOutcome::Succeeded => self.resolve_connection(generation).await,
            PollOutcome::Failed => {
                warn!("[{}] Virtual office deployment failed", self.inner.id);
                self.inner
                    .messaging
                    .display_message(FAILURE_MESSAGE, Severity::Error);
                Ok(outcome)
            }
            _ => Ok(outcome),
        }
    }

    async fn resolve_connection(&self, generation: u64) -> Result<PollOutcome, ControllerError> {
        let link = self
            .inner
            .backend
            .fetch_connection_link(&self.inner.project)
            .await;

        let mut core = self.inner.core();
        if !core.is_current(generation) {
            debug!("[{}] Discarding connection link after reset", self.inner.id);
            return Ok(PollOutcome::Stale);
        }

        match link {
            Ok(Some(url)) if !url.is_empty() => {
                info!("[{}] Virtual office is ready", self.inner.id);
                self.inner
                    .transition(&mut core, OfficeEvent::ConnectionFound(url))?;
                Ok(PollOutcome::Succeeded)
            }
            Ok(_) => {
                warn!(
                    "[{}] Deployment succeeded but no connection link is available",
                    self.inner.id
                );
                self.inner
                    .transition(&mut core, OfficeEvent::LinkUnavailable)?;
                Ok(PollOutcome::Succeeded)
            }
            Err(e) => {
                self.inner
                    .transition(&mut core, OfficeEvent::LinkUnavailable)?;
                Err(e)
            }
        }
    }

    // ================================== RESETS =================================== //

    /// Reset after a failed deployment and tell the user
    ///
    /// Safe to call repeatedly and with or without an active poller.
    pub fn on_failed_deployment(&self) {
        {
            let mut core = self.inner.core();
            self.inner.reset(&mut core, OfficeEvent::DeploymentFailed);
        }
        warn!("[{}] Virtual office deployment failed", self.inner.id);
        self.inner
            .messaging
            .display_message(FAILURE_MESSAGE, Severity::Error);
    }

    fn on_poll_timeout(&self, elapsed: Duration) {
        {
            let mut core = self.inner.core();
            self.inner.reset(&mut core, OfficeEvent::DeploymentFailed);
        }
        warn!(
            "[{}] Gave up waiting for the deployment after {:?}",
            self.inner.id, elapsed
        );
        self.inner
            .messaging
            .display_message(TIMEOUT_MESSAGE, Severity::Warning);
    }

    /// React to the office being deleted, by this control or anybody else
    pub fn handle_deletion(&self) {
        let mut core = self.inner.core();
        info!("[{}] Virtual office deleted, resetting", self.inner.id);
        self.inner.reset(&mut core, OfficeEvent::Deleted);
    }

    /// Subscribe to deletion notifications, replacing any previous subscription
    pub fn attach(&self, signal: &DeletionSignal) {
        let mut receiver = signal.subscribe();
        let weak = Arc::downgrade(&self.inner);
        let project = self.inner.project.clone();
        let id = self.inner.id.clone();

        let listener = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) if !event.concerns(&project) => continue,
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        debug!("[{}] Missed {} deletion notifications", id, missed);
                    }
                    Err(RecvError::Closed) => return,
                }
                match weak.upgrade() {
                    Some(inner) => OfficeController { inner }.handle_deletion(),
                    None => return,
                }
            }
        });

        let mut core = self.inner.core();
        if let Some(previous) = core.deletion_listener.replace(listener) {
            previous.abort();
        }
    }

    /// Stop polling and listening for deletions
    pub fn shutdown(&self) {
        let mut core = self.inner.core();
        core.generation += 1;
        core.poll_task.take();
        if let Some(listener) = core.deletion_listener.take() {
            listener.abort();
        }
        self.inner.publish(&core);
        debug!("[{}] Controller shut down", self.inner.id);
    }
}
