//! # Mutators
//!
//! Reusable [`Mutator`] builders for metadata concerns.

use super::Mutator;
use crate::constants::{LABEL_COMPONENT, LABEL_INSTANCE, LABEL_MANAGED_BY, LABEL_NAME, LABEL_PART_OF, OPERATOR_NAME};
use crate::error::{OperatorError, OperatorResult};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

/// Merge `labels` into the object's labels
pub fn labels<K: Resource + 'static>(labels: BTreeMap<String, String>) -> Mutator<K> {
    Box::new(move |object: &mut K| {
        object.labels_mut().extend(labels.clone());
        Ok(())
    })
}

/// Merge `annotations` into the object's annotations
pub fn annotations<K: Resource + 'static>(annotations: BTreeMap<String, String>) -> Mutator<K> {
    Box::new(move |object: &mut K| {
        object.annotations_mut().extend(annotations.clone());
        Ok(())
    })
}

/// Make `owner` the controller of the object
///
/// Fails when the owner has no name or uid yet.
pub fn controller_reference<K, O>(owner: &O) -> OperatorResult<Mutator<K>>
where
    K: Resource + 'static,
    O: Resource<DynamicType = ()> + 'static,
{
    let owner_ref = owner.controller_owner_ref(&()).ok_or_else(|| {
        OperatorError::InvalidConfig(format!(
            "owner {} has no name or uid",
            owner.meta().name.clone().unwrap_or_default()
        ))
    })?;
    Ok(Box::new(move |object: &mut K| {
        set_controller_reference(object, &owner_ref)
    }))
}

/// Add or refresh `owner` as the controller reference of `object`
///
/// Another controller already owning the object is an error.
pub fn set_controller_reference<K: Resource>(object: &mut K, owner: &OwnerReference) -> OperatorResult<()> {
    let name = object.name_any();
    let references = object.meta_mut().owner_references.get_or_insert_with(Vec::new);

    if let Some(existing) = references
        .iter()
        .find(|r| r.controller == Some(true) && r.uid != owner.uid)
    {
        return Err(OperatorError::AlreadyOwned {
            name,
            owner: format!("{} {}", existing.kind, existing.name),
        });
    }

    match references.iter_mut().find(|r| r.uid == owner.uid) {
        Some(existing) => *existing = owner.clone(),
        None => references.push(owner.clone()),
    }
    Ok(())
}

/// `app.kubernetes.io/*` labels for a component of an instance
pub fn recommended_labels(name: &str, component: &str, instance: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_NAME.to_string(), name.to_string()),
        (LABEL_COMPONENT.to_string(), component.to_string()),
        (LABEL_INSTANCE.to_string(), instance.to_string()),
        (LABEL_PART_OF.to_string(), "signstack".to_string()),
        (LABEL_MANAGED_BY.to_string(), OPERATOR_NAME.to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;

    fn owner_ref(uid: &str) -> OwnerReference {
        OwnerReference {
            api_version: "signstack.dev/v1alpha1".into(),
            kind: "Rekor".into(),
            name: "rekor".into(),
            uid: uid.into(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    fn config_map() -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("settings".into()),
                ..ObjectMeta::default()
            },
            ..ConfigMap::default()
        }
    }

    #[test]
    fn test_controller_reference_is_idempotent() {
        let mut object = config_map();
        set_controller_reference(&mut object, &owner_ref("a")).unwrap();
        set_controller_reference(&mut object, &owner_ref("a")).unwrap();
        assert_eq!(object.metadata.owner_references.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_controller_reference_rejects_other_controller() {
        let mut object = config_map();
        set_controller_reference(&mut object, &owner_ref("a")).unwrap();
        let err = set_controller_reference(&mut object, &owner_ref("b")).unwrap_err();
        assert!(matches!(err, OperatorError::AlreadyOwned { .. }));
    }

    #[test]
    fn test_label_mutator_merges() {
        let mut object = config_map();
        object.labels_mut().insert("keep".into(), "me".into());
        let mutator: Mutator<ConfigMap> = labels(recommended_labels("rekor", "server", "rekor"));
        mutator(&mut object).unwrap();
        mutator(&mut object).unwrap();

        assert_eq!(object.labels().get("keep").map(String::as_str), Some("me"));
        assert_eq!(object.labels().get(LABEL_MANAGED_BY).map(String::as_str), Some(OPERATOR_NAME));
        assert_eq!(object.labels().len(), 6);
    }
}
