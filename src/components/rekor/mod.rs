//! # Rekor Controller
//!
//! Pipeline for the Rekor transparency log server:
//!
//! ```text
//! pending -> create -> pvc -> deployment -> service -> service-monitor
//!         -> initialize -> wait-for-server -> ready
//! ```
//!
//! Resource actions gate on `State >= Creating`, so they run once the instance
//! has entered the Creating phase and keep converging the children afterwards.

pub mod deployment;
pub mod monitor;
pub mod pvc;
pub mod readiness;
pub mod service;

pub use deployment::ServerDeploymentAction;
pub use monitor::ServiceMonitorAction;
pub use pvc::CreatePvcAction;
pub use readiness::WaitForServerAction;
pub use service::ServerServiceAction;

use crate::config::{ControllerConfig, ImageKey};
use crate::controller::action::{Pipeline, ToCreatePhase, ToInitializePhase, ToPendingPhase, ToReadyPhase};
use crate::controller::kubernetes::recommended_labels;
use crate::controller::monitoring::ServiceMonitorRegistry;
use crate::crd::Rekor;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Controller name used in metrics and logs
pub const CONTROLLER_NAME: &str = "rekor";

/// Sub-condition reporting server availability
pub const SERVER_CONDITION: &str = "ServerAvailable";

pub const SERVER_COMPONENT: &str = "rekor-server";
pub const HTTP_PORT: i32 = 3000;
pub const METRICS_PORT: i32 = 2112;
pub const METRICS_PORT_NAME: &str = "metrics";
pub const ATTESTATIONS_MOUNT_PATH: &str = "/var/run/attestations";

/// Name of the server Deployment and Service
pub fn server_name(instance: &Rekor) -> String {
    format!("{}-server", instance.name_any())
}

/// Name of the attestation volume claim, unless the spec names one
pub fn pvc_name(instance: &Rekor) -> String {
    instance
        .spec
        .pvc
        .name
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("{}-pvc", instance.name_any()))
}

/// Labels shared by every object of the server component; also the pod selector
pub fn server_labels(instance: &Rekor) -> BTreeMap<String, String> {
    recommended_labels("rekor", SERVER_COMPONENT, &instance.name_any())
}

/// Build the Rekor action pipeline
pub fn pipeline(config: &ControllerConfig, registry: Arc<ServiceMonitorRegistry>) -> Pipeline<Rekor> {
    Pipeline::new()
        .with(ToPendingPhase::with_components(&[SERVER_CONDITION]))
        .with(ToCreatePhase)
        .with(CreatePvcAction)
        .with(ServerDeploymentAction::new(
            config.images.get(ImageKey::RekorServer),
            config.openshift,
        ))
        .with(ServerServiceAction)
        .with(ServiceMonitorAction::new(registry))
        .with(ToInitializePhase)
        .with(WaitForServerAction)
        .with(ToReadyPhase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::backoff::RetryPolicy;
    use crate::crd::RekorSpec;
    use crate::testing::FakeCluster;

    fn instance(pvc: Option<&str>) -> Rekor {
        let mut rekor = Rekor::new("transparency", RekorSpec::default());
        rekor.spec.pvc.name = pvc.map(str::to_string);
        rekor
    }

    #[test]
    fn test_child_names() {
        assert_eq!(server_name(&instance(None)), "transparency-server");
        assert_eq!(pvc_name(&instance(None)), "transparency-pvc");
        assert_eq!(pvc_name(&instance(Some(""))), "transparency-pvc");
        assert_eq!(pvc_name(&instance(Some("shared"))), "shared");
    }

    #[test]
    fn test_server_labels_select_the_instance() {
        let labels = server_labels(&instance(None));
        assert_eq!(labels["app.kubernetes.io/instance"], "transparency");
        assert_eq!(labels["app.kubernetes.io/component"], SERVER_COMPONENT);
    }

    #[test]
    fn test_pipeline_order() {
        let cluster = Arc::new(FakeCluster::new());
        let registry = Arc::new(ServiceMonitorRegistry::new(
            cluster.clone(),
            cluster,
            RetryPolicy::default(),
        ));
        let pipeline = pipeline(&ControllerConfig::default(), registry);
        assert_eq!(
            pipeline.names(),
            vec![
                "pending",
                "create",
                "create-pvc",
                "deployment",
                "service",
                "service-monitor",
                "initialize",
                "wait-for-server",
                "ready",
            ]
        );
    }
}
