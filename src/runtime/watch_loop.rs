//! # Watch Loop
//!
//! Runs the CRD watcher in the background and the Rekor controller in the
//! foreground until a shutdown signal arrives.

use crate::components::rekor;
use crate::controller::monitoring::CrdWatcherReconciler;
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::crd::Rekor;
use crate::runtime::error_policy::handle_reconciliation_error;
use crate::runtime::initialization::InitializationResult;
use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Service};
use kube::api::Api;
use kube_runtime::controller::Controller;
use kube_runtime::watcher;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Run the operator until shutdown
pub async fn run_watch_loop(init: InitializationResult) -> Result<()> {
    let InitializationResult {
        client,
        config,
        object_client,
        events,
        registry,
        server_state,
    } = init;

    let crd_watcher = Arc::new(CrdWatcherReconciler::new(
        object_client.clone(),
        registry.clone(),
        config.controller.service_monitor_crd.clone(),
    ));
    let crd_watch_handle = tokio::spawn(crd_watcher.run(client.clone()));

    let reconciler = Arc::new(Reconciler::new(
        rekor::CONTROLLER_NAME,
        object_client,
        events,
        config.controller.retry,
        rekor::pipeline(&config.controller, registry.clone()),
    )
    .with_registry(registry));
    info!(
        controller = rekor::CONTROLLER_NAME,
        actions = ?reconciler.pipeline().names(),
        "Starting controller"
    );

    let rekors: Api<Rekor> = Api::all(client.clone());
    Controller::new(rekors, watcher::Config::default())
        .owns(Api::<Deployment>::all(client.clone()), watcher::Config::default())
        .owns(Api::<Service>::all(client.clone()), watcher::Config::default())
        .owns(Api::<PersistentVolumeClaim>::all(client), watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile::<Rekor>, handle_reconciliation_error::<Rekor>, reconciler)
        .for_each(|result| async move {
            match result {
                Ok((object, action)) => debug!(object = %object, ?action, "Reconciled"),
                Err(e) => warn!(error = %e, "Reconcile failed"),
            }
        })
        .await;

    server_state.set_ready(false);
    crd_watch_handle.abort();
    info!("Controller stopped");
    Ok(())
}
