//! Controller unit tests

use std::time::Duration;

use tokio_test::{assert_err, assert_ok};

use vocontrol::errors::ControllerError;
use vocontrol::models::deployment::DeploymentStatus;
use vocontrol::office::backend::Severity;
use vocontrol::office::controller::{OfficeController, PollOutcome, FAILURE_MESSAGE, TIMEOUT_MESSAGE};
use vocontrol::office::poller;
use vocontrol::office::signal::{DeletionSignal, OfficeDeleted};
use vocontrol::office::state::{IdleReason, OfficeState, LABEL_ACCESS, LABEL_CREATE, LABEL_CREATING};

use crate::support::{harness, harness_with, next_tick, settle, Call, FakeBackend, PROJECT};

use vocontrol::models::deployment::DeploymentStatus::{NotStarted, Running, Succeeded};

/// Controller initialized without any office
async fn idle(backend: FakeBackend) -> crate::support::Harness {
    let h = harness(backend.link(None).status(Some(NotStarted)));
    assert_ok!(h.controller.initialize().await);
    assert_eq!(h.controller.state(), OfficeState::Idle);
    h
}

// ================================ INITIALIZATION ================================= //

#[tokio::test(start_paused = true)]
async fn test_init_with_existing_connection() {
    let h = harness(FakeBackend::new().link(Some("url")));

    assert_ok!(h.controller.initialize().await);

    let view = h.controller.view();
    assert_eq!(view.connection_url.as_deref(), Some("url"));
    assert!(view.enabled);
    assert_eq!(view.label, LABEL_ACCESS);
    assert_eq!(h.backend.calls(), vec![Call::ConnectionLink(PROJECT.to_string())]);
    assert!(!h.controller.is_polling());
}

#[tokio::test(start_paused = true)]
async fn test_init_with_running_deployment_polls() {
    let h = harness(FakeBackend::new().link(None).statuses(&[Running, Running, Running]));

    assert_ok!(h.controller.initialize().await);

    // initial lookup + immediate check
    assert_eq!(h.backend.status_calls(), 2);
    assert!(h.controller.is_polling());
    let view = h.controller.view();
    assert_eq!(view.label, LABEL_CREATING);
    assert!(!view.enabled);

    next_tick().await;
    assert_eq!(h.backend.status_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_init_with_failed_deployment_resets() {
    let h = harness(FakeBackend::new().link(None).status(Some(DeploymentStatus::Failed)));

    assert_ok!(h.controller.initialize().await);

    assert_eq!(h.controller.state(), OfficeState::Failed);
    let view = h.controller.view();
    assert_eq!(view.label, LABEL_CREATE);
    assert!(view.enabled);
    assert_eq!(
        h.messenger.messages(),
        vec![(FAILURE_MESSAGE.to_string(), Severity::Error)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_init_without_deployment() {
    let h = harness(FakeBackend::new().link(None).status(None));

    assert_ok!(h.controller.initialize().await);

    assert_eq!(h.controller.state(), OfficeState::Idle);
    assert!(h.controller.view().enabled);
    assert!(h.messenger.messages().is_empty());
    assert!(!h.controller.is_polling());
}

#[tokio::test(start_paused = true)]
async fn test_init_failure_leaves_create_state() {
    let h = harness(FakeBackend::new().link(None).status_error("tools API down"));

    assert_err!(h.controller.initialize().await);

    assert_eq!(h.controller.state(), OfficeState::Idle);
    let view = h.controller.view();
    assert_eq!(view.label, LABEL_CREATE);
    assert!(view.enabled);
    assert!(view.connection_url.is_none());
    assert_eq!(h.controller.idle_reason(), Some(IdleReason::LookupFailed));
}

#[tokio::test(start_paused = true)]
async fn test_init_runs_once() {
    let h = harness(FakeBackend::new().link(Some("url")));

    assert_ok!(h.controller.initialize().await);
    assert_ok!(h.controller.initialize().await);

    assert_eq!(h.backend.link_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_init_can_be_retried_after_failure() {
    let h = harness(
        FakeBackend::new()
            .link(None)
            .status_error("tools API down")
            .link(Some("url")),
    );
    assert_err!(h.controller.initialize().await);

    assert_ok!(h.controller.initialize().await);

    assert_eq!(h.backend.link_calls(), 2);
    assert_eq!(h.controller.state(), OfficeState::Ready("url".to_string()));
    assert!(h.controller.idle_reason().is_none());

    // a successful lookup is not repeated
    assert_ok!(h.controller.initialize().await);
    assert_eq!(h.backend.link_calls(), 2);
}

#[test]
fn test_empty_project_is_rejected() {
    let backend = std::sync::Arc::new(FakeBackend::new());
    let result = OfficeController::new(
        "  ",
        backend,
        std::sync::Arc::new(crate::support::RecordingMessenger::default()),
        std::sync::Arc::new(crate::support::RecordingOpener::default()),
        poller::Options::default(),
    );
    assert!(matches!(result, Err(ControllerError::ValidationError(_))));
}

// ================================== ACTIVATION =================================== //

#[tokio::test(start_paused = true)]
async fn test_activate_opens_existing_connection() {
    let h = harness(FakeBackend::new().link(Some("url")));
    assert_ok!(h.controller.initialize().await);
    let calls = h.backend.calls();

    assert_ok!(h.controller.activate().await);

    assert_eq!(h.opener.opened(), vec!["url".to_string()]);
    assert_eq!(h.backend.calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_activate_deploys_and_polls_once_per_interval() {
    let h = idle(FakeBackend::new()).await;
    let before = h.backend.status_calls();

    assert_ok!(h.controller.activate().await);

    assert!(h.backend.calls().contains(&Call::DeployVm(PROJECT.to_string())));
    assert!(h.controller.is_polling());
    // immediate check
    assert_eq!(h.backend.status_calls() - before, 1);

    tokio::time::sleep(Duration::from_millis(7900)).await;
    assert_eq!(h.backend.status_calls() - before, 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.backend.status_calls() - before, 2);
}

#[tokio::test(start_paused = true)]
async fn test_activate_disables_before_deploy_resolves() {
    let h = idle(FakeBackend::new()).await;
    let gate = h.backend.gate_deploys();

    let controller = h.controller.clone();
    let activation = tokio::spawn(async move { controller.activate().await });
    settle().await;

    assert_eq!(h.backend.deploy_calls(), 1);
    let view = h.controller.view();
    assert!(!view.enabled);
    assert_eq!(view.label, LABEL_CREATING);

    // a second activation is refused while the first is pending
    let second = h.controller.activate().await;
    assert!(matches!(second, Err(ControllerError::Busy(_))));
    assert_eq!(h.backend.deploy_calls(), 1);

    gate.notify_one();
    assert_ok!(activation.await.unwrap());
    assert!(h.controller.is_polling());
}

#[tokio::test(start_paused = true)]
async fn test_activate_rejected_deploy_reenables() {
    let h = idle(FakeBackend::new().deploy_error("quota exceeded")).await;

    let result = h.controller.activate().await;

    assert!(matches!(result, Err(ControllerError::Backend(_))));
    let view = h.controller.view();
    assert!(view.enabled);
    assert!(view.connection_url.is_none());
    assert_eq!(view.label, LABEL_CREATE);
    assert!(!h.controller.is_polling());
    assert!(h.messenger.messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_activate_after_failure_deploys_again() {
    let h = harness(FakeBackend::new().link(None).status(Some(DeploymentStatus::Failed)));
    assert_ok!(h.controller.initialize().await);

    assert_ok!(h.controller.activate().await);

    assert_eq!(h.backend.deploy_calls(), 1);
    assert!(h.controller.is_polling());
}

// =================================== POLLING ===================================== //

#[tokio::test(start_paused = true)]
async fn test_poll_success_resolves_connection() {
    let h = idle(FakeBackend::new()).await;
    h.backend.push_status(Running);
    h.backend.push_status(Succeeded);
    h.backend.push_link("url");

    assert_ok!(h.controller.activate().await);
    assert!(h.controller.is_polling());

    next_tick().await;

    assert!(!h.controller.is_polling());
    // init lookup + one after success
    assert_eq!(h.backend.link_calls(), 2);
    let view = h.controller.view();
    assert_eq!(view.connection_url.as_deref(), Some("url"));
    assert!(view.enabled);
    assert_eq!(view.label, LABEL_ACCESS);

    let status_calls = h.backend.status_calls();
    next_tick().await;
    next_tick().await;
    assert_eq!(h.backend.status_calls(), status_calls);
}

#[tokio::test(start_paused = true)]
async fn test_success_on_first_check_never_schedules() {
    let h = idle(FakeBackend::new()).await;
    h.backend.push_status(Succeeded);
    h.backend.push_link("url");

    assert_ok!(h.controller.activate().await);

    assert!(!h.controller.is_polling());
    assert_eq!(h.controller.state(), OfficeState::Ready("url".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_success_token_variant_is_accepted() {
    let h = idle(FakeBackend::new()).await;
    h.backend.push_status("Success".parse().unwrap());
    h.backend.push_link("url");

    assert_ok!(h.controller.activate().await);

    assert_eq!(h.controller.view().connection_url.as_deref(), Some("url"));
}

#[tokio::test(start_paused = true)]
async fn test_success_without_link_goes_back_to_create() {
    let h = idle(FakeBackend::new()).await;
    h.backend.push_status(Succeeded);

    assert_ok!(h.controller.activate().await);

    assert_eq!(h.controller.state(), OfficeState::Idle);
    assert!(h.controller.view().enabled);
    assert!(!h.controller.is_polling());
    assert_eq!(h.controller.idle_reason(), Some(IdleReason::LinkUnavailable));
}

#[tokio::test(start_paused = true)]
async fn test_link_lookup_error_after_success() {
    let h = idle(FakeBackend::new()).await;
    h.backend.push_status(Succeeded);
    h.backend.push_link_error("gateway timeout");

    assert_ok!(h.controller.activate().await);

    assert_eq!(h.controller.state(), OfficeState::Idle);
    assert!(h.controller.view().enabled);
    assert!(!h.controller.is_polling());
    assert_eq!(h.controller.idle_reason(), Some(IdleReason::LinkUnavailable));
}

#[tokio::test(start_paused = true)]
async fn test_poll_failure_resets() {
    let h = idle(FakeBackend::new()).await;
    h.backend.push_status(Running);
    h.backend.push_status(DeploymentStatus::Failed);

    assert_ok!(h.controller.activate().await);
    next_tick().await;

    assert!(!h.controller.is_polling());
    let view = h.controller.view();
    assert_eq!(view.label, LABEL_CREATE);
    assert!(view.enabled);
    assert!(view.connection_url.is_none());
    assert_eq!(
        h.messenger.messages(),
        vec![(FAILURE_MESSAGE.to_string(), Severity::Error)]
    );

    let status_calls = h.backend.status_calls();
    next_tick().await;
    assert_eq!(h.backend.status_calls(), status_calls);
}

#[tokio::test(start_paused = true)]
async fn test_poll_keeps_going_on_transport_errors() {
    let h = idle(FakeBackend::new()).await;
    h.backend.push_status(Running);

    assert_ok!(h.controller.activate().await);
    h.backend.push_status_error("connection reset");
    next_tick().await;
    assert!(h.controller.is_polling());

    h.backend.push_status(Succeeded);
    h.backend.push_link("url");
    next_tick().await;
    assert_eq!(h.controller.state(), OfficeState::Ready("url".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_status_is_not_terminal() {
    let h = idle(FakeBackend::new()).await;
    h.backend.push_status(Running);
    h.backend.push_status(DeploymentStatus::Other("Provisioning".to_string()));

    assert_ok!(h.controller.activate().await);
    next_tick().await;

    assert!(h.controller.is_polling());
    assert_eq!(
        h.controller.view().deployment_status,
        Some(DeploymentStatus::Other("Provisioning".to_string()))
    );
}

#[tokio::test(start_paused = true)]
async fn test_slow_checks_never_overlap() {
    let h = idle(FakeBackend::new()).await;
    h.backend.delay_statuses(Duration::from_secs(20));

    let controller = h.controller.clone();
    let activation = tokio::spawn(async move { controller.activate().await });

    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(h.backend.max_in_flight(), 1);
    assert!(h.controller.is_polling());
    activation.abort();
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_completion_is_a_noop_when_polling() {
    let h = idle(FakeBackend::new()).await;
    assert_ok!(h.controller.activate().await);
    let status_calls = h.backend.status_calls();

    assert_ok!(h.controller.wait_for_completion().await);

    assert_eq!(h.backend.status_calls(), status_calls);
    next_tick().await;
    assert_eq!(h.backend.status_calls(), status_calls + 1);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_completion_requires_deployment() {
    let h = idle(FakeBackend::new()).await;

    let result = h.controller.wait_for_completion().await;

    assert!(matches!(result, Err(ControllerError::InvalidTransition(_))));
    assert!(!h.controller.is_polling());
}

#[tokio::test(start_paused = true)]
async fn test_poll_timeout() {
    let backend = FakeBackend::new().link(None).status(Some(NotStarted));
    let h = harness_with(
        backend,
        poller::Options {
            interval: Duration::from_secs(8),
            max_duration: Some(Duration::from_secs(20)),
        },
    );
    assert_ok!(h.controller.initialize().await);
    assert_ok!(h.controller.activate().await);

    tokio::time::sleep(Duration::from_secs(30)).await;

    assert!(!h.controller.is_polling());
    assert_eq!(h.controller.state(), OfficeState::Failed);
    assert_eq!(
        h.messenger.messages(),
        vec![(TIMEOUT_MESSAGE.to_string(), Severity::Warning)]
    );
}

// ==================================== RESETS ===================================== //

#[tokio::test(start_paused = true)]
async fn test_failure_reset_is_idempotent() {
    let h = idle(FakeBackend::new()).await;
    assert_ok!(h.controller.activate().await);

    h.controller.on_failed_deployment();
    let once = h.controller.view();
    h.controller.on_failed_deployment();
    let twice = h.controller.view();

    assert_eq!(once, twice);
    assert!(twice.enabled);
    assert_eq!(twice.label, LABEL_CREATE);
    assert!(!twice.polling);
    assert_eq!(h.messenger.messages().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_deletion_without_deployment() {
    let h = harness(FakeBackend::new());
    let signal = DeletionSignal::default();
    h.controller.attach(&signal);

    assert_eq!(signal.notify(OfficeDeleted::default()), 1);
    settle().await;

    let view = h.controller.view();
    assert!(view.enabled);
    assert_eq!(view.label, LABEL_CREATE);
    assert!(view.connection_url.is_none());
    assert!(view.deployment_status.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_deletion_of_ready_office() {
    let h = harness(FakeBackend::new().link(Some("url")));
    let signal = DeletionSignal::default();
    h.controller.attach(&signal);
    assert_ok!(h.controller.initialize().await);

    signal.notify(OfficeDeleted::for_project(PROJECT));
    settle().await;

    assert_eq!(h.controller.state(), OfficeState::Idle);
    assert!(h.controller.view().connection_url.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_deletion_cancels_polling() {
    let h = idle(FakeBackend::new()).await;
    let signal = DeletionSignal::default();
    h.controller.attach(&signal);
    assert_ok!(h.controller.activate().await);
    assert!(h.controller.is_polling());

    signal.notify(OfficeDeleted::default());
    settle().await;

    assert!(!h.controller.is_polling());
    let view = h.controller.view();
    assert!(view.enabled);
    assert_eq!(view.label, LABEL_CREATE);

    let status_calls = h.backend.status_calls();
    next_tick().await;
    next_tick().await;
    assert_eq!(h.backend.status_calls(), status_calls);
}

#[tokio::test(start_paused = true)]
async fn test_deletion_of_other_project_is_ignored() {
    let h = harness(FakeBackend::new().link(Some("url")));
    let signal = DeletionSignal::default();
    h.controller.attach(&signal);
    assert_ok!(h.controller.initialize().await);

    signal.notify(OfficeDeleted::for_project("projet-alpha"));
    settle().await;

    assert_eq!(h.controller.state(), OfficeState::Ready("url".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_stale_status_after_deletion_is_discarded() {
    let h = idle(FakeBackend::new()).await;
    assert_ok!(h.controller.activate().await);
    // keep the deployment state without the background poller
    h.controller.shutdown();

    h.backend.delay_statuses(Duration::from_secs(5));
    h.backend.push_status(Succeeded);
    h.backend.push_link("url");

    let controller = h.controller.clone();
    let check = tokio::spawn(async move { controller.check_progress().await });
    tokio::time::sleep(Duration::from_secs(1)).await;
    h.controller.handle_deletion();

    let outcome = check.await.unwrap();
    assert_eq!(outcome.unwrap(), PollOutcome::Stale);
    assert_eq!(h.controller.state(), OfficeState::Idle);
    assert!(h.controller.view().connection_url.is_none());
    assert!(!h.controller.is_polling());
}

#[tokio::test(start_paused = true)]
async fn test_stale_link_after_deletion_is_discarded() {
    let h = idle(FakeBackend::new()).await;
    h.backend.push_status(Succeeded);
    h.backend.push_link("url");
    h.backend.delay_links(Duration::from_secs(5));

    let controller = h.controller.clone();
    let activation = tokio::spawn(async move { controller.activate().await });
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.controller.state(), OfficeState::Polling(Some(Succeeded)));

    h.controller.handle_deletion();
    assert_ok!(activation.await.unwrap());

    assert_eq!(h.backend.link_calls(), 2);
    assert_eq!(h.controller.state(), OfficeState::Idle);
    assert!(h.controller.view().connection_url.is_none());
    assert!(!h.controller.is_polling());
}

#[tokio::test(start_paused = true)]
async fn test_reattach_replaces_subscription() {
    let h = harness(FakeBackend::new().link(Some("url")));
    let signal = DeletionSignal::default();
    h.controller.attach(&signal);
    h.controller.attach(&signal);
    settle().await;

    assert_eq!(signal.subscriber_count(), 1);

    assert_ok!(h.controller.initialize().await);
    let mut views = h.controller.subscribe();
    views.borrow_and_update();

    assert_eq!(signal.notify(OfficeDeleted::for_project(PROJECT)), 1);
    settle().await;

    assert_eq!(h.controller.state(), OfficeState::Idle);
    assert_eq!(h.controller.idle_reason(), Some(IdleReason::Deleted));
    assert!(views.has_changed().unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_lagged_listener_still_resets() {
    let h = harness(FakeBackend::new().link(Some("url")));
    let signal = DeletionSignal::new(1);
    h.controller.attach(&signal);
    assert_ok!(h.controller.initialize().await);

    // overflow the channel before the listener gets to run
    for _ in 0..3 {
        signal.notify(OfficeDeleted::for_project(PROJECT));
    }
    settle().await;

    assert_eq!(h.controller.state(), OfficeState::Idle);
    assert!(h.controller.view().connection_url.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_stale_deploy_answer_after_deletion_is_discarded() {
    let h = idle(FakeBackend::new()).await;
    let gate = h.backend.gate_deploys();
    let status_calls = h.backend.status_calls();

    let controller = h.controller.clone();
    let activation = tokio::spawn(async move { controller.activate().await });
    settle().await;

    h.controller.handle_deletion();
    gate.notify_one();
    assert_ok!(activation.await.unwrap());

    assert_eq!(h.controller.state(), OfficeState::Idle);
    assert!(!h.controller.is_polling());
    next_tick().await;
    assert_eq!(h.backend.status_calls(), status_calls);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_polling() {
    let h = idle(FakeBackend::new()).await;
    assert_ok!(h.controller.activate().await);

    h.controller.shutdown();
    let status_calls = h.backend.status_calls();
    next_tick().await;

    assert!(!h.controller.is_polling());
    assert_eq!(h.backend.status_calls(), status_calls);
}

#[tokio::test(start_paused = true)]
async fn test_view_changes_are_published() {
    let h = idle(FakeBackend::new()).await;
    let mut views = h.controller.subscribe();
    views.borrow_and_update();
    h.backend.push_status(Succeeded);
    h.backend.push_link("url");

    assert_ok!(h.controller.activate().await);

    assert!(views.has_changed().unwrap());
    assert_eq!(views.borrow_and_update().connection_url.as_deref(), Some("url"));
}
