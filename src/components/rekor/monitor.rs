//! Rekor server ServiceMonitor.
//!
//! The monitor is declared in the registry on every pass; the registry creates
//! it now if the monitoring CRD is installed, or later once it appears.
//! Disabling monitoring withdraws the declaration.

use super::{server_labels, server_name, METRICS_PORT_NAME};
use crate::controller::action::{Action, ActionResult, BaseAction};
use crate::controller::client::ObjectKey;
use crate::controller::kubernetes::{controller_reference, labels, Mutator};
use crate::controller::monitoring::{OwnerIdentity, ServiceMonitorRegistry, ServiceMonitorSpec};
use crate::controller::State;
use crate::crd::Rekor;
use crate::OperatorResult;
use async_trait::async_trait;
use kube::core::DynamicObject;
use kube::ResourceExt;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Declare the server ServiceMonitor in the registry
#[derive(Debug)]
pub struct ServiceMonitorAction {
    registry: Arc<ServiceMonitorRegistry>,
}

impl ServiceMonitorAction {
    pub fn new(registry: Arc<ServiceMonitorRegistry>) -> Self {
        Self { registry }
    }

    fn spec(instance: &Rekor) -> OperatorResult<ServiceMonitorSpec> {
        let selector = server_labels(instance);
        let monitor_spec = json!({
            "selector": { "matchLabels": selector },
            "endpoints": [{ "port": METRICS_PORT_NAME, "interval": "30s" }],
        });
        let mutators: Vec<Mutator<DynamicObject>> = vec![
            labels(selector),
            controller_reference(instance)?,
            Box::new(move |monitor: &mut DynamicObject| {
                monitor.data["spec"] = monitor_spec.clone();
                Ok(())
            }) as Mutator<DynamicObject>,
        ];
        Ok(ServiceMonitorSpec::new(
            ObjectKey {
                namespace: instance.namespace(),
                name: server_name(instance),
            },
            OwnerIdentity::of(instance),
            mutators,
        ))
    }
}

#[async_trait]
impl Action<Rekor> for ServiceMonitorAction {
    fn name(&self) -> &str {
        "service-monitor"
    }

    fn can_handle(&self, instance: &Rekor) -> bool {
        State::of(instance) >= State::Creating
    }

    async fn handle(&self, base: &BaseAction, instance: &mut Rekor) -> Option<ActionResult> {
        if !instance.spec.monitoring.enabled {
            let key = ObjectKey {
                namespace: instance.namespace(),
                name: server_name(instance),
            };
            // A disabled monitor must not come back on the next CRD replay.
            if self.registry.unregister(&key).is_some() {
                debug!(monitor = %key, "Monitoring disabled, ServiceMonitor spec dropped");
            }
            return base.proceed();
        }

        let spec = match Self::spec(instance) {
            Ok(spec) => spec,
            Err(e) => return base.error(instance, e, Vec::new()).await,
        };
        let key = spec.key.clone();

        if !self.registry.register(spec).await {
            debug!(monitor = %key, "ServiceMonitor API unavailable, deferring");
            return base.proceed();
        }
        match self.registry.reconcile_one(&key).await {
            Ok(_) => base.proceed(),
            Err(e) => base.error(instance, e, Vec::new()).await,
        }
    }
}
