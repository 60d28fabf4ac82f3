//! # Testing
//!
//! In-memory cluster implementing [`ObjectClient`] and [`EventSink`], for unit
//! and integration tests of actions and controllers. Integration tests reach it
//! through the `testing` feature.
//!
//! It keeps the API server semantics the engine depends on:
//!
//! - every write bumps a global `resourceVersion`; a write carrying a stale one
//!   fails with [`ClientError::Conflict`]
//! - `replace` never touches `status`, `replace_status` touches nothing else
//! - `metadata.generation` starts at 1 and moves when non-status data changes
//! - events are recorded instead of published
//!
//! Each async call yields before touching the store, so concurrent callers
//! interleave the way they would against a real API server.

use crate::controller::client::{from_dynamic, to_dynamic, ClientError, EventSink, ObjectClient, ObjectKey, OwnerEvent};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::core::{ApiResource, DynamicObject, TypeMeta};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct StoreKey {
    api_version: String,
    kind: String,
    namespace: Option<String>,
    name: String,
}

impl StoreKey {
    fn new(resource: &ApiResource, key: &ObjectKey) -> Self {
        Self {
            api_version: resource.api_version.clone(),
            kind: resource.kind.clone(),
            namespace: key.namespace.clone(),
            name: key.name.clone(),
        }
    }
}

/// An event captured by [`FakeCluster`]
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub regarding: ObjectReference,
    pub event: OwnerEvent,
}

#[derive(Default)]
struct Store {
    objects: BTreeMap<StoreKey, DynamicObject>,
    resource_version: u64,
    uids: u64,
    events: Vec<RecordedEvent>,
    injected_conflicts: u32,
    writes: u64,
}

impl Store {
    fn next_version(&mut self) -> Option<String> {
        self.resource_version += 1;
        Some(self.resource_version.to_string())
    }

    /// Consume one injected conflict, if any
    fn take_conflict(&mut self) -> bool {
        if self.injected_conflicts == 0 {
            return false;
        }
        self.injected_conflicts -= 1;
        true
    }

    fn create(&mut self, resource: &ApiResource, object: &DynamicObject) -> Result<DynamicObject, ClientError> {
        let key = ObjectKey::of(object);
        let store_key = StoreKey::new(resource, &key);
        if self.objects.contains_key(&store_key) {
            return Err(ClientError::AlreadyExists(key.to_string()));
        }

        let mut stored = object.clone();
        stored.types = Some(type_meta(resource));
        self.uids += 1;
        stored.metadata.uid = Some(format!("uid-{}", self.uids));
        stored.metadata.generation = Some(1);
        stored.metadata.resource_version = self.next_version();
        self.writes += 1;
        self.objects.insert(store_key, stored.clone());
        Ok(stored)
    }

    fn existing(&self, resource: &ApiResource, object: &DynamicObject) -> Result<(StoreKey, DynamicObject), ClientError> {
        let key = ObjectKey::of(object);
        let store_key = StoreKey::new(resource, &key);
        let existing = self
            .objects
            .get(&store_key)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(key.to_string()))?;
        let stale = object
            .metadata
            .resource_version
            .as_ref()
            .is_some_and(|version| Some(version) != existing.metadata.resource_version.as_ref());
        if stale {
            return Err(ClientError::Conflict(key.to_string()));
        }
        Ok((store_key, existing))
    }

    fn replace(&mut self, resource: &ApiResource, object: &DynamicObject) -> Result<DynamicObject, ClientError> {
        let (store_key, existing) = self.existing(resource, object)?;
        if self.take_conflict() {
            return Err(ClientError::Conflict(store_key.name));
        }

        let mut stored = object.clone();
        stored.types = Some(type_meta(resource));
        set_status(&mut stored, status_of(&existing));
        stored.metadata.uid = existing.metadata.uid.clone();
        stored.metadata.creation_timestamp = existing.metadata.creation_timestamp.clone();
        let generation = existing.metadata.generation.unwrap_or(1);
        stored.metadata.generation = Some(if without_status(&stored) == without_status(&existing) {
            generation
        } else {
            generation + 1
        });
        stored.metadata.resource_version = self.next_version();
        self.writes += 1;
        self.objects.insert(store_key, stored.clone());
        Ok(stored)
    }

    fn replace_status(&mut self, resource: &ApiResource, object: &DynamicObject) -> Result<DynamicObject, ClientError> {
        let (store_key, mut stored) = self.existing(resource, object)?;
        if self.take_conflict() {
            return Err(ClientError::Conflict(store_key.name));
        }

        set_status(&mut stored, status_of(object));
        stored.metadata.resource_version = self.next_version();
        self.writes += 1;
        self.objects.insert(store_key, stored.clone());
        Ok(stored)
    }
}

fn type_meta(resource: &ApiResource) -> TypeMeta {
    TypeMeta {
        api_version: resource.api_version.clone(),
        kind: resource.kind.clone(),
    }
}

fn status_of(object: &DynamicObject) -> Option<Value> {
    object.data.get("status").filter(|s| !s.is_null()).cloned()
}

fn set_status(object: &mut DynamicObject, status: Option<Value>) {
    if !object.data.is_object() {
        object.data = Value::Object(serde_json::Map::new());
    }
    if let Some(data) = object.data.as_object_mut() {
        match status {
            Some(status) => {
                data.insert("status".to_string(), status);
            }
            None => {
                data.remove("status");
            }
        }
    }
}

fn without_status(object: &DynamicObject) -> Value {
    let mut data = object.data.clone();
    if let Some(map) = data.as_object_mut() {
        map.remove("status");
    }
    data
}

/// In-memory API server
#[derive(Default)]
pub struct FakeCluster {
    store: Mutex<Store>,
}

impl std::fmt::Debug for FakeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.lock();
        f.debug_struct("FakeCluster")
            .field("objects", &store.objects.len())
            .field("events", &store.events.len())
            .finish_non_exhaustive()
    }
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a typed object as a user would create it
    pub fn insert<K>(&self, object: &K) -> Result<K, ClientError>
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
    {
        let resource = ApiResource::erase::<K>(&());
        let created = self.lock().create(&resource, &to_dynamic(object)?)?;
        from_dynamic(created)
    }

    /// Store an untyped object
    pub fn insert_dynamic(&self, resource: &ApiResource, object: &DynamicObject) -> Result<DynamicObject, ClientError> {
        self.lock().create(resource, object)
    }

    pub fn get<K>(&self, key: &ObjectKey) -> Option<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let object = self.get_dynamic(&ApiResource::erase::<K>(&()), key)?;
        from_dynamic(object).ok()
    }

    pub fn get_dynamic(&self, resource: &ApiResource, key: &ObjectKey) -> Option<DynamicObject> {
        self.lock().objects.get(&StoreKey::new(resource, key)).cloned()
    }

    pub fn delete<K: Resource<DynamicType = ()>>(&self, key: &ObjectKey) -> bool {
        self.delete_dynamic(&ApiResource::erase::<K>(&()), key)
    }

    pub fn delete_dynamic(&self, resource: &ApiResource, key: &ObjectKey) -> bool {
        let mut store = self.lock();
        let removed = store.objects.remove(&StoreKey::new(resource, key)).is_some();
        if removed {
            store.next_version();
        }
        removed
    }

    /// Edit a stored object in place, spec and status alike
    ///
    /// The generation moves when anything outside `status` changed.
    pub fn update<K, F>(&self, key: &ObjectKey, edit: F) -> Result<K, ClientError>
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
        F: FnOnce(&mut K),
    {
        let resource = ApiResource::erase::<K>(&());
        let store_key = StoreKey::new(&resource, key);
        let mut store = self.lock();
        let existing = store
            .objects
            .get(&store_key)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(key.to_string()))?;

        let mut typed: K = from_dynamic(existing.clone())?;
        edit(&mut typed);
        let mut stored = to_dynamic(&typed)?;
        stored.types = Some(type_meta(&resource));
        let generation = existing.metadata.generation.unwrap_or(1);
        if without_status(&stored) != without_status(&existing) {
            stored.metadata.generation = Some(generation + 1);
        }
        stored.metadata.resource_version = store.next_version();
        store.objects.insert(store_key, stored.clone());
        from_dynamic(stored)
    }

    /// Make the next `count` writes (replace or replace_status) fail with a conflict
    pub fn inject_conflicts(&self, count: u32) {
        self.lock().injected_conflicts = count;
    }

    /// Number of successful create/replace/replace_status calls
    pub fn writes(&self) -> u64 {
        self.lock().writes
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.lock().events.clone()
    }

    /// Reasons of the events published on objects called `name`, in order
    pub fn event_reasons_for(&self, name: &str) -> Vec<String> {
        self.lock()
            .events
            .iter()
            .filter(|e| e.regarding.name.as_deref() == Some(name))
            .map(|e| e.event.reason.clone())
            .collect()
    }

    pub fn clear_events(&self) {
        self.lock().events.clear();
    }
}

#[async_trait]
impl ObjectClient for FakeCluster {
    async fn get(&self, resource: &ApiResource, key: &ObjectKey) -> Result<Option<DynamicObject>, ClientError> {
        tokio::task::yield_now().await;
        Ok(self.get_dynamic(resource, key))
    }

    async fn create(&self, resource: &ApiResource, object: &DynamicObject) -> Result<DynamicObject, ClientError> {
        tokio::task::yield_now().await;
        self.lock().create(resource, object)
    }

    async fn replace(&self, resource: &ApiResource, object: &DynamicObject) -> Result<DynamicObject, ClientError> {
        tokio::task::yield_now().await;
        self.lock().replace(resource, object)
    }

    async fn replace_status(
        &self,
        resource: &ApiResource,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClientError> {
        tokio::task::yield_now().await;
        self.lock().replace_status(resource, object)
    }
}

#[async_trait]
impl EventSink for FakeCluster {
    async fn publish(&self, regarding: &ObjectReference, event: OwnerEvent) -> Result<(), ClientError> {
        self.lock().events.push(RecordedEvent {
            regarding: regarding.clone(),
            event,
        });
        Ok(())
    }
}
