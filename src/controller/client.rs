//! # Kubernetes Client Seams
//!
//! The engine talks to the API server through two object-safe traits:
//!
//! - [`ObjectClient`] - get/create/replace/replace-status on untyped objects
//! - [`EventSink`] - Kubernetes Events on an owning object
//!
//! [`KubeObjectClient`] and [`KubeEventSink`] back them with a real `kube::Client`;
//! `testing::FakeCluster` backs them in memory for tests.

use crate::constants::OPERATOR_NAME;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::core::{ApiResource, DynamicObject};
use kube::{Client, Resource};
use kube_runtime::events::{Event, EventType, Recorder, Reporter};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Errors at the Kubernetes API boundary
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0} not found")]
    NotFound(String),

    /// resourceVersion precondition failed
    #[error("Conflict writing {0}")]
    Conflict(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Kubernetes API error: {0}")]
    Api(#[source] kube::Error),
}

impl ClientError {
    /// Classify a kube error by HTTP status code
    pub fn from_kube(error: kube::Error, object: &str) -> Self {
        match error {
            kube::Error::Api(ref response) if response.code == 404 => {
                ClientError::NotFound(object.to_string())
            }
            kube::Error::Api(ref response)
                if response.code == 409 && response.reason == "AlreadyExists" =>
            {
                ClientError::AlreadyExists(object.to_string())
            }
            kube::Error::Api(ref response) if response.code == 409 => {
                ClientError::Conflict(object.to_string())
            }
            other => ClientError::Api(other),
        }
    }
}

/// Namespace/name of one object; `namespace` is `None` for cluster-scoped kinds
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    pub fn of<K: Resource>(object: &K) -> Self {
        let meta = object.meta();
        Self {
            namespace: meta.namespace.clone(),
            name: meta.name.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{namespace}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Untyped CRUD against the API server
///
/// Writes carry `metadata.resourceVersion`; a stale version fails with
/// [`ClientError::Conflict`].
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Fetch an object; `Ok(None)` when it does not exist
    async fn get(
        &self,
        resource: &ApiResource,
        key: &ObjectKey,
    ) -> Result<Option<DynamicObject>, ClientError>;

    async fn create(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClientError>;

    /// Replace the object; the status sub-resource is left untouched
    async fn replace(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClientError>;

    /// Write only the status sub-resource
    async fn replace_status(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClientError>;
}

/// Severity of an owner event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

/// An event published on an owning object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerEvent {
    pub kind: EventKind,
    pub reason: String,
    pub action: String,
    pub note: Option<String>,
}

impl OwnerEvent {
    pub fn normal(reason: impl Into<String>, note: impl Into<String>) -> Self {
        Self::new(EventKind::Normal, reason, note)
    }

    pub fn warning(reason: impl Into<String>, note: impl Into<String>) -> Self {
        Self::new(EventKind::Warning, reason, note)
    }

    fn new(kind: EventKind, reason: impl Into<String>, note: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            kind,
            action: reason.clone(),
            reason,
            note: Some(note.into()),
        }
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, regarding: &ObjectReference, event: OwnerEvent)
        -> Result<(), ClientError>;
}

/// [`ObjectClient`] backed by `kube::Api<DynamicObject>`
#[derive(Clone)]
pub struct KubeObjectClient {
    client: Client,
}

impl fmt::Debug for KubeObjectClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeObjectClient").finish_non_exhaustive()
    }
}

impl KubeObjectClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, resource: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, resource),
            None => Api::all_with(self.client.clone(), resource),
        }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(OPERATOR_NAME.to_string()),
            ..PostParams::default()
        }
    }
}

#[async_trait]
impl ObjectClient for KubeObjectClient {
    async fn get(
        &self,
        resource: &ApiResource,
        key: &ObjectKey,
    ) -> Result<Option<DynamicObject>, ClientError> {
        self.api(resource, key.namespace.as_deref())
            .get_opt(&key.name)
            .await
            .map_err(|e| ClientError::from_kube(e, &key.to_string()))
    }

    async fn create(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClientError> {
        let key = ObjectKey::of(object);
        self.api(resource, key.namespace.as_deref())
            .create(&Self::post_params(), object)
            .await
            .map_err(|e| ClientError::from_kube(e, &key.to_string()))
    }

    async fn replace(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClientError> {
        let key = ObjectKey::of(object);
        self.api(resource, key.namespace.as_deref())
            .replace(&key.name, &Self::post_params(), object)
            .await
            .map_err(|e| ClientError::from_kube(e, &key.to_string()))
    }

    async fn replace_status(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClientError> {
        let key = ObjectKey::of(object);
        // Merge patch carrying resourceVersion: the API server rejects it with 409
        // when the object moved on. Status types serialize unset fields as null and
        // lists are replaced wholesale, so this writes the full status.
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": object.metadata.resource_version },
            "status": object.data.get("status").cloned().unwrap_or(serde_json::Value::Null),
        });
        self.api(resource, key.namespace.as_deref())
            .patch_status(
                &key.name,
                &PatchParams {
                    field_manager: Some(OPERATOR_NAME.to_string()),
                    ..PatchParams::default()
                },
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|e| ClientError::from_kube(e, &key.to_string()))
    }
}

/// [`EventSink`] backed by the kube-runtime event recorder
pub struct KubeEventSink {
    recorder: Recorder,
}

impl fmt::Debug for KubeEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeEventSink").finish_non_exhaustive()
    }
}

impl KubeEventSink {
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: OPERATOR_NAME.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn publish(
        &self,
        regarding: &ObjectReference,
        event: OwnerEvent,
    ) -> Result<(), ClientError> {
        let type_ = match event.kind {
            EventKind::Normal => EventType::Normal,
            EventKind::Warning => EventType::Warning,
        };
        self.recorder
            .publish(
                &Event {
                    type_,
                    reason: event.reason,
                    note: event.note,
                    action: event.action,
                    secondary: None,
                },
                regarding,
            )
            .await
            .map_err(ClientError::Api)
    }
}

/// Convert a typed object to its untyped form
pub fn to_dynamic<K: Serialize>(object: &K) -> Result<DynamicObject, ClientError> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

/// Convert an untyped object back to a typed one
pub fn from_dynamic<K: DeserializeOwned>(object: DynamicObject) -> Result<K, ClientError> {
    Ok(serde_json::from_value(serde_json::to_value(object)?)?)
}

/// Fetch a typed object through an [`ObjectClient`]
pub async fn get_typed<K>(client: &dyn ObjectClient, key: &ObjectKey) -> Result<Option<K>, ClientError>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    let resource = ApiResource::erase::<K>(&());
    client.get(&resource, key).await?.map(from_dynamic).transpose()
}

/// Reference to a typed object, for events
pub fn object_reference<K: Resource<DynamicType = ()>>(object: &K) -> ObjectReference {
    object.object_ref(&())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;

    #[test]
    fn test_object_key_display() {
        assert_eq!(ObjectKey::namespaced("ns", "rekor").to_string(), "ns/rekor");
        assert_eq!(ObjectKey::cluster("crd").to_string(), "crd");
    }

    #[test]
    fn test_dynamic_conversion_keeps_type_and_data() {
        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some("settings".into()),
                namespace: Some("ns".into()),
                ..ObjectMeta::default()
            },
            data: Some([("key".to_string(), "value".to_string())].into()),
            ..ConfigMap::default()
        };

        let dynamic = to_dynamic(&config_map).unwrap();
        assert_eq!(dynamic.types.as_ref().unwrap().kind, "ConfigMap");
        assert_eq!(dynamic.data["data"]["key"], "value");
        assert_eq!(ObjectKey::of(&dynamic), ObjectKey::namespaced("ns", "settings"));

        let back: ConfigMap = from_dynamic(dynamic).unwrap();
        assert_eq!(back, config_map);
    }

    #[test]
    fn test_owner_event_constructors() {
        let event = OwnerEvent::warning("ServiceMonitorFailed", "boom");
        assert_eq!(event.kind, EventKind::Warning);
        assert_eq!(event.action, "ServiceMonitorFailed");
        assert_eq!(event.note.as_deref(), Some("boom"));
    }
}
