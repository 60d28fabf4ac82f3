//! # Create Or Update
//!
//! Idempotent upsert of any Kubernetes object.
//!
//! The caller passes a template that only needs to identify the object
//! (name and namespace) and a list of [`Mutator`]s, each owning one concern:
//! labels, controller reference, a spec field. The object is fetched (or
//! started from the template), every mutator is applied, and the result is
//! written only if it differs from what is stored.
//!
//! An existing object annotated with `signstack.dev/paused` is left untouched.
//! Conflicts and create races are retried with bounded exponential backoff.

pub mod mutators;

pub use mutators::*;

use crate::constants::PAUSED_ANNOTATION;
use crate::controller::backoff::RetryPolicy;
use crate::controller::client::{from_dynamic, to_dynamic, ClientError, ObjectClient, ObjectKey};
use crate::error::{OperatorError, OperatorResult};
use kube::core::{ApiResource, DynamicObject, TypeMeta};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// What `create_or_update` did to the object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    None,
    Created,
    Updated,
}

impl OperationResult {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationResult::None => "unchanged",
            OperationResult::Created => "created",
            OperationResult::Updated => "updated",
        }
    }

    /// Whether the object was written
    pub fn changed(self) -> bool {
        self != OperationResult::None
    }
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One idempotent edit of an object
///
/// Mutators must only touch the object they are given.
pub type Mutator<K> = Box<dyn Fn(&mut K) -> OperatorResult<()> + Send + Sync>;

/// Upsert a typed object; see the module docs
pub async fn create_or_update<K>(
    client: &dyn ObjectClient,
    retry: &RetryPolicy,
    template: K,
    mutators: &[Mutator<K>],
) -> OperatorResult<(OperationResult, K)>
where
    K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync,
{
    let resource = ApiResource::erase::<K>(&());
    create_or_update_with(client, retry, &resource, template, mutators).await
}

/// Upsert an object whose API resource is supplied by the caller
///
/// Used for kinds without static type information, such as an unstructured
/// [`DynamicObject`] of an optional CRD.
pub async fn create_or_update_with<K>(
    client: &dyn ObjectClient,
    retry: &RetryPolicy,
    resource: &ApiResource,
    template: K,
    mutators: &[Mutator<K>],
) -> OperatorResult<(OperationResult, K)>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Send + Sync,
{
    let key = ObjectKey::of(&template);
    for attempt in 0..retry.attempts {
        match apply_once(client, resource, &key, &template, mutators).await {
            Err(OperatorError::Client(ClientError::Conflict(_) | ClientError::AlreadyExists(_))) => {
                let delay = retry.delay(attempt);
                debug!(
                    kind = %resource.kind,
                    object = %key,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis(),
                    "Write raced with another writer, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            outcome => return outcome,
        }
    }
    Err(OperatorError::ConflictRetriesExhausted {
        name: format!("{} {key}", resource.kind),
        attempts: retry.attempts,
    })
}

async fn apply_once<K>(
    client: &dyn ObjectClient,
    resource: &ApiResource,
    key: &ObjectKey,
    template: &K,
    mutators: &[Mutator<K>],
) -> OperatorResult<(OperationResult, K)>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Send + Sync,
{
    let Some(live) = client.get(resource, key).await? else {
        let mut object = template.clone();
        mutate(&mut object, key, mutators)?;
        let created = client.create(resource, &typed_dynamic(resource, &object)?).await?;
        debug!(kind = %resource.kind, object = %key, "Created");
        return Ok((OperationResult::Created, from_dynamic(created)?));
    };

    if is_paused(&live) {
        debug!(kind = %resource.kind, object = %key, "Object is paused, leaving it untouched");
        return Ok((OperationResult::None, from_dynamic(live)?));
    }

    let current: K = from_dynamic(live)?;
    let mut object = current.clone();
    mutate(&mut object, key, mutators)?;
    if serde_json::to_value(&object)? == serde_json::to_value(&current)? {
        return Ok((OperationResult::None, current));
    }

    let replaced = client.replace(resource, &typed_dynamic(resource, &object)?).await?;
    debug!(kind = %resource.kind, object = %key, "Updated");
    Ok((OperationResult::Updated, from_dynamic(replaced)?))
}

fn mutate<K: Resource>(object: &mut K, key: &ObjectKey, mutators: &[Mutator<K>]) -> OperatorResult<()> {
    for mutator in mutators {
        mutator(object)?;
    }
    let mutated = ObjectKey::of(object);
    if &mutated != key {
        return Err(OperatorError::InvalidConfig(format!(
            "mutator changed object identity from {key} to {mutated}"
        )));
    }
    Ok(())
}

/// Untyped form of `object` with apiVersion/kind always set
fn typed_dynamic<K: Serialize>(resource: &ApiResource, object: &K) -> OperatorResult<DynamicObject> {
    let mut dynamic = to_dynamic(object)?;
    if dynamic.types.is_none() {
        dynamic.types = Some(TypeMeta {
            api_version: resource.api_version.clone(),
            kind: resource.kind.clone(),
        });
    }
    Ok(dynamic)
}

fn is_paused(object: &DynamicObject) -> bool {
    object
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(PAUSED_ANNOTATION))
        .is_some_and(|value| value != "false")
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    fn object(annotations: Option<(&str, &str)>) -> DynamicObject {
        DynamicObject {
            types: None,
            metadata: ObjectMeta {
                name: Some("rekor".into()),
                annotations: annotations
                    .map(|(k, v)| [(k.to_string(), v.to_string())].into_iter().collect()),
                ..ObjectMeta::default()
            },
            data: serde_json::json!({}),
        }
    }

    #[test]
    fn test_paused_annotation() {
        assert!(is_paused(&object(Some((PAUSED_ANNOTATION, "true")))));
        assert!(is_paused(&object(Some((PAUSED_ANNOTATION, "")))));
        assert!(!is_paused(&object(Some((PAUSED_ANNOTATION, "false")))));
        assert!(!is_paused(&object(Some(("other", "true")))));
        assert!(!is_paused(&object(None)));
    }

    #[test]
    fn test_mutator_cannot_rename_object() {
        let key = ObjectKey::cluster("rekor");
        let rename: Mutator<DynamicObject> = Box::new(|o| {
            o.metadata.name = Some("other".into());
            Ok(())
        });
        let mut target = object(None);
        let err = mutate(&mut target, &key, &[rename]).unwrap_err();
        assert!(err.is_terminal());
    }

    #[test]
    fn test_operation_result_changed() {
        assert!(!OperationResult::None.changed());
        assert!(OperationResult::Created.changed());
        assert!(OperationResult::Updated.changed());
    }
}
