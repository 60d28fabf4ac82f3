//! Server readiness.

use super::{server_name, SERVER_CONDITION};
use crate::controller::action::{Action, ActionResult, BaseAction};
use crate::controller::client::{get_typed, ObjectKey};
use crate::controller::conditions::{is_condition_true, set_condition};
use crate::controller::{Instance, State};
use crate::crd::{Condition, ConditionStatus, Rekor};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;
use tracing::{debug, info};

/// Whether the Deployment reports `Available=True`
pub fn is_deployment_available(deployment: &Deployment) -> bool {
    deployment
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Available" && c.status == "True")
        })
}

/// Poll the server Deployment until it is available
#[derive(Debug, Default, Clone, Copy)]
pub struct WaitForServerAction;

#[async_trait]
impl Action<Rekor> for WaitForServerAction {
    fn name(&self) -> &str {
        "wait-for-server"
    }

    fn can_handle(&self, instance: &Rekor) -> bool {
        State::of(instance) == State::Initialize
            && !is_condition_true(instance.conditions(), SERVER_CONDITION)
    }

    async fn handle(&self, base: &BaseAction, instance: &mut Rekor) -> Option<ActionResult> {
        let key = ObjectKey {
            namespace: instance.namespace(),
            name: server_name(instance),
        };
        let deployment: Option<Deployment> = match get_typed(base.client(), &key).await {
            Ok(deployment) => deployment,
            Err(e) => return base.error(instance, e.into(), Vec::new()).await,
        };

        if !deployment.as_ref().is_some_and(is_deployment_available) {
            debug!(deployment = %key, "Server is not available yet");
            return base.requeue();
        }

        info!(deployment = %key, "Server is available");
        set_condition(
            instance.conditions_mut(),
            Condition::new(SERVER_CONDITION, ConditionStatus::True, State::Ready.as_str())
                .with_message("Server is running"),
        );
        base.update_status(instance).await
    }
}
