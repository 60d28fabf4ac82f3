//! Attestation storage claim.

use super::{pvc_name, server_labels, SERVER_CONDITION};
use crate::controller::action::{Action, ActionResult, BaseAction};
use crate::controller::client::OwnerEvent;
use crate::controller::kubernetes::{controller_reference, create_or_update, labels, Mutator};
use crate::controller::{Instance, State};
use crate::crd::{Condition, ConditionStatus, Rekor};
use crate::error::OperatorError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use tracing::info;

const DEFAULT_ACCESS_MODE: &str = "ReadWriteOnce";

/// Create the claim once and record its name in `status.pvcName`
#[derive(Debug, Default, Clone, Copy)]
pub struct CreatePvcAction;

impl CreatePvcAction {
    fn mutators(instance: &Rekor, size: &str) -> Result<Vec<Mutator<PersistentVolumeClaim>>, OperatorError> {
        let pvc = instance.spec.pvc.clone();
        let size = Quantity(size.to_string());
        let mut mutators = vec![
            labels(server_labels(instance)),
            Box::new(move |claim: &mut PersistentVolumeClaim| {
                let spec = claim.spec.get_or_insert_with(PersistentVolumeClaimSpec::default);
                if spec.access_modes.is_none() {
                    spec.access_modes = Some(if pvc.access_modes.is_empty() {
                        vec![DEFAULT_ACCESS_MODE.to_string()]
                    } else {
                        pvc.access_modes.clone()
                    });
                }
                if spec.storage_class_name.is_none() {
                    spec.storage_class_name = pvc.storage_class.clone();
                }
                spec.resources
                    .get_or_insert_with(VolumeResourceRequirements::default)
                    .requests
                    .get_or_insert_with(Default::default)
                    .insert("storage".to_string(), size.clone());
                Ok(())
            }) as Mutator<PersistentVolumeClaim>,
        ];
        // A retained claim must survive the instance, so it gets no owner.
        if !instance.spec.pvc.retain {
            mutators.push(controller_reference(instance)?);
        }
        Ok(mutators)
    }
}

#[async_trait]
impl Action<Rekor> for CreatePvcAction {
    fn name(&self) -> &str {
        "create-pvc"
    }

    fn can_handle(&self, instance: &Rekor) -> bool {
        State::of(instance) >= State::Creating
            && instance.spec.attestations.enabled
            && instance
                .status
                .as_ref()
                .and_then(|s| s.pvc_name.as_deref())
                .is_none_or(str::is_empty)
    }

    async fn handle(&self, base: &BaseAction, instance: &mut Rekor) -> Option<ActionResult> {
        let Some(size) = instance.spec.pvc.size.clone().filter(|s| !s.is_empty()) else {
            let err = OperatorError::terminal("PVC size is not specified");
            return base.error(instance, err, Vec::new()).await;
        };

        let name = pvc_name(instance);
        let mutators = match Self::mutators(instance, &size) {
            Ok(mutators) => mutators,
            Err(e) => return base.error(instance, e, Vec::new()).await,
        };
        let template = PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: instance.namespace(),
                ..ObjectMeta::default()
            },
            ..PersistentVolumeClaim::default()
        };

        match create_or_update(base.client(), base.retry(), template, &mutators).await {
            Ok((result, _)) => {
                if result.changed() {
                    info!(pvc = %name, %result, "Attestation storage claim reconciled");
                    base.record_event(
                        instance,
                        OwnerEvent::normal("PersistentVolumeClaimCreated", format!("PVC {name} {result}")),
                    )
                    .await;
                }
                instance.status_entry().pvc_name = Some(name);
                base.update_status(instance).await
            }
            Err(e) => {
                let condition = Condition::new(SERVER_CONDITION, ConditionStatus::False, State::Failure.as_str())
                    .with_message(format!("Failed to create PVC {name}: {e}"));
                base.error(instance, e, vec![condition]).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::READY_CONDITION;
    use crate::controller::conditions::set_condition;
    use crate::crd::RekorSpec;

    fn creating(spec: RekorSpec) -> Rekor {
        let mut rekor = Rekor::new("rekor", spec);
        set_condition(
            rekor.conditions_mut(),
            Condition::new(READY_CONDITION, ConditionStatus::False, State::Creating.as_str()),
        );
        rekor
    }

    #[test]
    fn test_can_handle_until_claim_is_recorded() {
        let mut rekor = creating(RekorSpec::default());
        assert!(CreatePvcAction.can_handle(&rekor));

        rekor.status_entry().pvc_name = Some(String::new());
        assert!(CreatePvcAction.can_handle(&rekor));

        rekor.status_entry().pvc_name = Some("rekor-pvc".to_string());
        assert!(!CreatePvcAction.can_handle(&rekor));
    }

    #[test]
    fn test_not_handled_before_creating_or_when_disabled() {
        let mut spec = RekorSpec::default();
        assert!(!CreatePvcAction.can_handle(&Rekor::new("rekor", spec.clone())));

        spec.attestations.enabled = false;
        assert!(!CreatePvcAction.can_handle(&creating(spec)));
    }
}
