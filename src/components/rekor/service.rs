//! Rekor server Service.

use super::{server_labels, server_name, HTTP_PORT, METRICS_PORT, METRICS_PORT_NAME};
use crate::controller::action::{Action, ActionResult, BaseAction};
use crate::controller::client::OwnerEvent;
use crate::controller::kubernetes::{controller_reference, create_or_update, labels, Mutator, OperationResult};
use crate::controller::{Instance, State};
use crate::crd::Rekor;
use crate::OperatorResult;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use tracing::info;

/// Keep the server Service converged and publish its URL in `status.url`
#[derive(Debug, Default, Clone, Copy)]
pub struct ServerServiceAction;

fn port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(IntOrString::Int(port)),
        protocol: Some("TCP".to_string()),
        ..ServicePort::default()
    }
}

impl ServerServiceAction {
    fn mutators(instance: &Rekor) -> OperatorResult<Vec<Mutator<Service>>> {
        let selector = server_labels(instance);
        Ok(vec![
            labels(selector.clone()),
            controller_reference(instance)?,
            Box::new(move |service: &mut Service| {
                let spec = service.spec.get_or_insert_with(ServiceSpec::default);
                spec.selector = Some(selector.clone());
                spec.ports = Some(vec![port("http", HTTP_PORT), port(METRICS_PORT_NAME, METRICS_PORT)]);
                Ok(())
            }) as Mutator<Service>,
        ])
    }
}

#[async_trait]
impl Action<Rekor> for ServerServiceAction {
    fn name(&self) -> &str {
        "service"
    }

    fn can_handle(&self, instance: &Rekor) -> bool {
        State::of(instance) >= State::Creating
    }

    async fn handle(&self, base: &BaseAction, instance: &mut Rekor) -> Option<ActionResult> {
        let name = server_name(instance);
        let namespace = instance.namespace().unwrap_or_default();
        let mutators = match Self::mutators(instance) {
            Ok(mutators) => mutators,
            Err(e) => return base.error(instance, e, Vec::new()).await,
        };
        let template = Service {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(namespace.clone()),
                ..ObjectMeta::default()
            },
            ..Service::default()
        };

        match create_or_update(base.client(), base.retry(), template, &mutators).await {
            Ok((result, _)) => {
                if result.changed() {
                    info!(service = %name, %result, "Server service reconciled");
                    let reason = if result == OperationResult::Created {
                        "ServiceCreated"
                    } else {
                        "ServiceUpdated"
                    };
                    base.record_event(instance, OwnerEvent::normal(reason, format!("Service {name} {result}")))
                        .await;
                }
                instance.status_entry().url = Some(format!("http://{name}.{namespace}.svc"));
                base.update_status(instance).await
            }
            Err(e) => base.error(instance, e, Vec::new()).await,
        }
    }
}
