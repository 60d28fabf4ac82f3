//! # CRD Watcher
//!
//! Watches the monitoring CRD and drives the registry's availability gate.
//!
//! Events for any other CRD are ignored. On each event the CRD is re-read and
//! "established" is recomputed from its status; only a change of the gate
//! notifies owners, and an opening gate replays every registered spec.

use crate::controller::client::{get_typed, ObjectClient, ObjectKey};
use crate::controller::monitoring::ServiceMonitorRegistry;
use crate::error::OperatorResult;
use futures::StreamExt;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::Api;
use kube::ResourceExt;
use kube_runtime::watcher;
use kube_runtime::WatchStreamExt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Whether the CRD is established and not being deleted
pub fn is_established(crd: &CustomResourceDefinition) -> bool {
    crd.metadata.deletion_timestamp.is_none()
        && crd
            .status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .is_some_and(|conditions| {
                conditions
                    .iter()
                    .any(|c| c.type_ == "Established" && c.status == "True")
            })
}

/// Drives the registry gate from the monitoring CRD
pub struct CrdWatcherReconciler {
    client: Arc<dyn ObjectClient>,
    registry: Arc<ServiceMonitorRegistry>,
    crd_name: String,
}

impl std::fmt::Debug for CrdWatcherReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrdWatcherReconciler")
            .field("crd_name", &self.crd_name)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl CrdWatcherReconciler {
    pub fn new(
        client: Arc<dyn ObjectClient>,
        registry: Arc<ServiceMonitorRegistry>,
        crd_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            registry,
            crd_name: crd_name.into(),
        }
    }

    pub fn crd_name(&self) -> &str {
        &self.crd_name
    }

    /// Event filter: only the monitoring CRD passes
    pub fn matches(&self, name: &str) -> bool {
        name == self.crd_name
    }

    /// Handle an event for the CRD called `name`
    pub async fn reconcile(&self, name: &str) -> OperatorResult<()> {
        if !self.matches(name) {
            debug!(crd = %name, "Ignoring unrelated CRD");
            return Ok(());
        }

        let crd: Option<CustomResourceDefinition> =
            get_typed(self.client.as_ref(), &ObjectKey::cluster(name)).await?;
        let available = crd.as_ref().is_some_and(is_established);

        let Some(owners) = self.registry.set_api_available(available) else {
            return Ok(());
        };
        info!(
            crd = %name,
            available,
            owners = owners.len(),
            "ServiceMonitor API availability changed"
        );
        self.registry.notify_owners(&owners, available).await;

        if available {
            if let Err(e) = self.registry.reconcile_all().await {
                warn!(error = %e, "Some ServiceMonitors failed to reconcile");
            }
        }
        Ok(())
    }

    /// Watch the CRD until the stream ends
    pub async fn run(self: Arc<Self>, client: kube::Client) {
        let crds: Api<CustomResourceDefinition> = Api::all(client);
        let config = watcher::Config::default().fields(&format!("metadata.name={}", self.crd_name));
        let mut stream = watcher(crds, config).default_backoff().boxed();

        info!(crd = %self.crd_name, "CRD watcher started");

        while let Some(event) = stream.next().await {
            let name = match event {
                Ok(watcher::Event::Apply(crd))
                | Ok(watcher::Event::InitApply(crd))
                | Ok(watcher::Event::Delete(crd)) => crd.name_any(),
                Ok(watcher::Event::InitDone) => self.crd_name.clone(),
                Ok(watcher::Event::Init) => continue,
                Err(e) => {
                    warn!(error = %e, "CRD watch error");
                    continue;
                }
            };
            if let Err(e) = self.reconcile(&name).await {
                error!(crd = %name, error = %e, "Failed to reconcile CRD availability");
            }
        }

        warn!(crd = %self.crd_name, "CRD watcher stream ended");
    }
}
