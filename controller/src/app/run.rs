//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};

use crate::app::options::{AppOptions, Command};
use crate::errors::ControllerError;
use crate::http::client::HttpClient;
use crate::http::tools::ToolsBackend;
use crate::models::deployment::DeploymentStatus;
use crate::office::controller::OfficeController;
use crate::office::deleter::OfficeDeleter;
use crate::office::notify::{PrintOpener, TerminalMessenger};
use crate::office::signal::DeletionSignal;
use crate::office::state::{IdleReason, OfficeView};

/// Run the controller for one project
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ControllerError> {
    info!("Starting virtual office controller for {}...", options.project);

    let http_client = Arc::new(HttpClient::new(
        &options.tools.base_url,
        options.tools.token,
        options.tools.request_timeout,
    )?);
    info!("Using tools API at {}", http_client.base_url());
    let backend = Arc::new(ToolsBackend::new(http_client, options.tools.vm_size));
    let signal = DeletionSignal::default();

    if options.command == Command::Delete {
        let deleter = OfficeDeleter::new(backend, signal);
        return deleter.delete(&options.project).await;
    }

    let controller = OfficeController::new(
        options.project,
        backend,
        Arc::new(TerminalMessenger),
        Arc::new(PrintOpener),
        options.poller,
    )?;
    controller.attach(&signal);

    let result = tokio::select! {
        result = drive(&controller, options.command) => result,
        _ = shutdown_signal => {
            info!("Shutdown signal received, shutting down...");
            Ok(())
        }
    };

    controller.shutdown();
    if let Err(e) = &result {
        error!("Virtual office controller stopped: {}", e);
    }
    result
}

async fn drive(controller: &OfficeController, command: Command) -> Result<(), ControllerError> {
    let mut views = controller.subscribe();
    controller.initialize().await?;

    let view = controller.view();
    if command == Command::Deploy && view.enabled && view.connection_url.is_none() {
        controller.activate().await?;
    }

    let view = wait_until_settled(&mut views).await?;
    match (&view.connection_url, &view.deployment_status) {
        (Some(_), _) => controller.activate().await,
        (None, Some(DeploymentStatus::Failed)) => Err(ControllerError::Backend(format!(
            "deployment of the virtual office of {} failed",
            controller.project()
        ))),
        (None, _) => match controller.idle_reason() {
            Some(IdleReason::LinkUnavailable) => Err(ControllerError::Backend(format!(
                "virtual office of {} was deployed but no connection link is available",
                controller.project()
            ))),
            _ => {
                info!(
                    "{} has no virtual office, run with --deploy to create one",
                    controller.project()
                );
                Ok(())
            }
        },
    }
}

/// Wait until the control accepts user interaction again
async fn wait_until_settled(
    views: &mut watch::Receiver<OfficeView>,
) -> Result<OfficeView, ControllerError> {
    let view = views
        .wait_for(|view| view.enabled)
        .await
        .map_err(|e| ControllerError::Internal(e.to_string()))?;
    Ok(view.clone())
}
