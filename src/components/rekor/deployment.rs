//! Rekor server Deployment.

use super::{
    server_labels, server_name, ATTESTATIONS_MOUNT_PATH, HTTP_PORT, METRICS_PORT, METRICS_PORT_NAME,
    SERVER_COMPONENT, SERVER_CONDITION,
};
use crate::controller::action::{Action, ActionResult, BaseAction};
use crate::controller::client::OwnerEvent;
use crate::controller::conditions::set_condition;
use crate::controller::kubernetes::{controller_reference, create_or_update, labels, Mutator, OperationResult};
use crate::controller::{Instance, State};
use crate::crd::{Condition, ConditionStatus, Rekor};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PersistentVolumeClaimVolumeSource, PodSecurityContext, PodSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::info;

/// UID/GID the server image runs as outside OpenShift
const SERVER_USER_ID: i64 = 65533;
const STORAGE_VOLUME: &str = "storage";

/// Keep the server Deployment converged
#[derive(Debug, Clone)]
pub struct ServerDeploymentAction {
    image: String,
    openshift: bool,
}

impl ServerDeploymentAction {
    pub fn new(image: impl Into<String>, openshift: bool) -> Self {
        Self {
            image: image.into(),
            openshift,
        }
    }

    fn container(image: String, storage: Option<String>) -> impl Fn(&mut Container) + Send + Sync + 'static {
        move |container: &mut Container| {
            container.image = Some(image.clone());
            let mut args = vec![
                "serve".to_string(),
                "--rekor_server.address=0.0.0.0".to_string(),
                format!("--port={HTTP_PORT}"),
                format!("--enable_attestation_storage={}", storage.is_some()),
            ];
            if storage.is_some() {
                args.push(format!("--attestation_storage_bucket=file://{ATTESTATIONS_MOUNT_PATH}"));
            }
            container.args = Some(args);
            container.ports = Some(vec![
                ContainerPort {
                    name: Some("http".to_string()),
                    container_port: HTTP_PORT,
                    protocol: Some("TCP".to_string()),
                    ..ContainerPort::default()
                },
                ContainerPort {
                    name: Some(METRICS_PORT_NAME.to_string()),
                    container_port: METRICS_PORT,
                    protocol: Some("TCP".to_string()),
                    ..ContainerPort::default()
                },
            ]);
            container.volume_mounts = storage.as_ref().map(|_| {
                vec![VolumeMount {
                    name: STORAGE_VOLUME.to_string(),
                    mount_path: ATTESTATIONS_MOUNT_PATH.to_string(),
                    ..VolumeMount::default()
                }]
            });
        }
    }

    fn mutators(&self, instance: &Rekor) -> crate::OperatorResult<Vec<Mutator<Deployment>>> {
        let selector: BTreeMap<String, String> = server_labels(instance);
        let claim = instance
            .get_status()
            .and_then(|s| s.pvc_name.clone())
            .filter(|name| instance.spec.attestations.enabled && !name.is_empty());
        let container = Self::container(self.image.clone(), claim.clone());
        let openshift = self.openshift;

        Ok(vec![
            labels(selector.clone()),
            controller_reference(instance)?,
            Box::new(move |deployment: &mut Deployment| {
                let spec = deployment.spec.get_or_insert_with(DeploymentSpec::default);
                spec.replicas = Some(1);
                spec.selector = LabelSelector {
                    match_labels: Some(selector.clone()),
                    ..LabelSelector::default()
                };
                let template_meta = spec.template.metadata.get_or_insert_with(ObjectMeta::default);
                template_meta
                    .labels
                    .get_or_insert_with(BTreeMap::new)
                    .extend(selector.clone());

                let pod = spec.template.spec.get_or_insert_with(PodSpec::default);
                let index = match pod.containers.iter().position(|c| c.name == SERVER_COMPONENT) {
                    Some(index) => index,
                    None => {
                        pod.containers.push(Container {
                            name: SERVER_COMPONENT.to_string(),
                            ..Container::default()
                        });
                        pod.containers.len() - 1
                    }
                };
                container(&mut pod.containers[index]);

                pod.volumes = claim.as_ref().map(|claim_name| {
                    vec![Volume {
                        name: STORAGE_VOLUME.to_string(),
                        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                            claim_name: claim_name.clone(),
                            read_only: None,
                        }),
                        ..Volume::default()
                    }]
                });

                // OpenShift assigns UIDs from the namespace range.
                if !openshift {
                    let security = pod.security_context.get_or_insert_with(PodSecurityContext::default);
                    security.fs_group = Some(SERVER_USER_ID);
                    security.run_as_user = Some(SERVER_USER_ID);
                }
                Ok(())
            }) as Mutator<Deployment>,
        ])
    }
}

#[async_trait]
impl Action<Rekor> for ServerDeploymentAction {
    fn name(&self) -> &str {
        "deployment"
    }

    fn can_handle(&self, instance: &Rekor) -> bool {
        State::of(instance) >= State::Creating
    }

    async fn handle(&self, base: &BaseAction, instance: &mut Rekor) -> Option<ActionResult> {
        let name = server_name(instance);
        let mutators = match self.mutators(instance) {
            Ok(mutators) => mutators,
            Err(e) => return base.error(instance, e, Vec::new()).await,
        };
        let template = Deployment {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: instance.namespace(),
                ..ObjectMeta::default()
            },
            ..Deployment::default()
        };

        match create_or_update(base.client(), base.retry(), template, &mutators).await {
            Ok((OperationResult::None, _)) => base.proceed(),
            Ok((result, _)) => {
                info!(deployment = %name, %result, "Server deployment reconciled");
                let reason = if result == OperationResult::Created {
                    "DeploymentCreated"
                } else {
                    "DeploymentUpdated"
                };
                base.record_event(instance, OwnerEvent::normal(reason, format!("Deployment {name} {result}")))
                    .await;
                if result != OperationResult::Created {
                    return base.proceed();
                }
                set_condition(
                    instance.conditions_mut(),
                    Condition::new(SERVER_CONDITION, ConditionStatus::False, State::Creating.as_str())
                        .with_message(format!("Deployment {name} created")),
                );
                base.update_status(instance).await
            }
            Err(e) => {
                let condition = Condition::new(SERVER_CONDITION, ConditionStatus::False, State::Failure.as_str())
                    .with_message(format!("Failed to reconcile Deployment {name}: {e}"));
                base.error(instance, e, vec![condition]).await
            }
        }
    }
}
