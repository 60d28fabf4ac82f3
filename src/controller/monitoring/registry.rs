//! # ServiceMonitor Registry
//!
//! Process-wide set of desired ServiceMonitors plus the "API available" gate.
//!
//! All state sits behind one `RwLock`. Locks are never held across an API call:
//! every method copies what it needs out of the lock, then talks to the cluster.

use crate::constants::{
    SERVICE_MONITOR_GROUP, SERVICE_MONITOR_KIND, SERVICE_MONITOR_PLURAL, SERVICE_MONITOR_VERSION,
};
use crate::controller::backoff::RetryPolicy;
use crate::controller::client::{ClientError, EventSink, ObjectClient, ObjectKey, OwnerEvent};
use crate::controller::kubernetes::{create_or_update_with, Mutator, OperationResult};
use crate::error::{OperatorError, OperatorResult};
use crate::observability::metrics;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::Resource;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

pub const REASON_API_AVAILABLE: &str = "ServiceMonitorAPIAvailable";
pub const REASON_API_UNAVAILABLE: &str = "ServiceMonitorAPIUnavailable";
pub const REASON_CREATED: &str = "ServiceMonitorCreated";
pub const REASON_UPDATED: &str = "ServiceMonitorUpdated";
pub const REASON_FAILED: &str = "ServiceMonitorFailed";

/// API resource of `monitoring.coreos.com/v1` ServiceMonitor
pub fn service_monitor_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(SERVICE_MONITOR_GROUP, SERVICE_MONITOR_VERSION, SERVICE_MONITOR_KIND),
        SERVICE_MONITOR_PLURAL,
    )
}

/// Identity of the object that registered a monitor: namespaced name plus GVK
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerIdentity {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub plural: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl OwnerIdentity {
    pub fn of<K: Resource<DynamicType = ()>>(owner: &K) -> Self {
        let meta = owner.meta();
        Self {
            group: K::group(&()).to_string(),
            version: K::version(&()).to_string(),
            kind: K::kind(&()).to_string(),
            plural: K::plural(&()).to_string(),
            namespace: meta.namespace.clone(),
            name: meta.name.clone().unwrap_or_default(),
        }
    }

    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    pub fn resource(&self) -> ApiResource {
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: self.api_version(),
            kind: self.kind.clone(),
            plural: self.plural.clone(),
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    pub fn object_reference(&self) -> ObjectReference {
        ObjectReference {
            api_version: Some(self.api_version()),
            kind: Some(self.kind.clone()),
            namespace: self.namespace.clone(),
            name: Some(self.name.clone()),
            ..ObjectReference::default()
        }
    }
}

impl fmt::Display for OwnerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.key())
    }
}

/// A desired ServiceMonitor and who asked for it
#[derive(Clone)]
pub struct ServiceMonitorSpec {
    pub key: ObjectKey,
    pub owner: OwnerIdentity,
    pub mutators: Arc<Vec<Mutator<DynamicObject>>>,
}

impl ServiceMonitorSpec {
    pub fn new(key: ObjectKey, owner: OwnerIdentity, mutators: Vec<Mutator<DynamicObject>>) -> Self {
        Self {
            key,
            owner,
            mutators: Arc::new(mutators),
        }
    }
}

impl fmt::Debug for ServiceMonitorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceMonitorSpec")
            .field("key", &self.key)
            .field("owner", &self.owner)
            .field("mutators", &self.mutators.len())
            .finish()
    }
}

#[derive(Default)]
struct RegistryState {
    specs: HashMap<ObjectKey, ServiceMonitorSpec>,
    /// Owners already told about the gate, with the monitor they registered
    notified: HashMap<OwnerIdentity, ObjectKey>,
    api_available: bool,
}

/// Registry of desired ServiceMonitors behind the CRD availability gate
pub struct ServiceMonitorRegistry {
    state: RwLock<RegistryState>,
    client: Arc<dyn ObjectClient>,
    events: Arc<dyn EventSink>,
    retry: RetryPolicy,
}

impl fmt::Debug for ServiceMonitorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("ServiceMonitorRegistry")
            .field("specs", &state.specs.len())
            .field("api_available", &state.api_available)
            .finish_non_exhaustive()
    }
}

impl ServiceMonitorRegistry {
    pub fn new(client: Arc<dyn ObjectClient>, events: Arc<dyn EventSink>, retry: RetryPolicy) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            client,
            events,
            retry,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Upsert a spec; returns whether the API is currently available
    ///
    /// The first registration of an owner identity tells that owner whether
    /// monitoring is available. A spec whose owner changed drops the old
    /// owner's notification entry so that owner is notified afresh later.
    pub async fn register(&self, spec: ServiceMonitorSpec) -> bool {
        let owner = spec.owner.clone();
        let (notify, available) = {
            let mut state = self.write();
            let previous_owner = state
                .specs
                .get(&spec.key)
                .map(|previous| previous.owner.clone())
                .filter(|previous| *previous != owner);
            if let Some(previous_owner) = previous_owner {
                state.notified.remove(&previous_owner);
            }
            let notify = !state.notified.contains_key(&owner);
            if notify {
                state.notified.insert(owner.clone(), spec.key.clone());
            }
            state.specs.insert(spec.key.clone(), spec);
            (notify, state.api_available)
        };

        if notify {
            self.notify_owner(&owner, available).await;
        }
        available
    }

    /// Drop a spec and its notification entry
    pub fn unregister(&self, key: &ObjectKey) -> Option<ServiceMonitorSpec> {
        let mut state = self.write();
        let removed = state.specs.remove(key)?;
        if state.notified.get(&removed.owner) == Some(key) {
            state.notified.remove(&removed.owner);
        }
        Some(removed)
    }

    /// Drop every spec registered by `owner` and its notification entry
    ///
    /// Returns the number of specs removed.
    pub fn forget_owner(&self, owner: &OwnerIdentity) -> usize {
        let mut state = self.write();
        let before = state.specs.len();
        state.specs.retain(|_, spec| spec.owner != *owner);
        state.notified.remove(owner);
        before - state.specs.len()
    }

    pub fn is_api_available(&self) -> bool {
        self.read().api_available
    }

    /// Set the gate
    ///
    /// Returns the notified owners only when the gate actually flipped.
    pub fn set_api_available(&self, available: bool) -> Option<Vec<OwnerIdentity>> {
        let mut state = self.write();
        if state.api_available == available {
            return None;
        }
        state.api_available = available;
        metrics::set_service_monitor_api_available(available);
        Some(state.notified.keys().cloned().collect())
    }

    pub fn keys(&self) -> Vec<ObjectKey> {
        let mut keys: Vec<ObjectKey> = self.read().specs.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.read().specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().specs.is_empty()
    }

    /// Tell every owner in `owners` about the gate state
    pub async fn notify_owners(&self, owners: &[OwnerIdentity], available: bool) {
        for owner in owners {
            self.notify_owner(owner, available).await;
        }
    }

    async fn notify_owner(&self, owner: &OwnerIdentity, available: bool) {
        let event = if available {
            OwnerEvent::normal(REASON_API_AVAILABLE, "ServiceMonitor API is available")
        } else {
            OwnerEvent::warning(
                REASON_API_UNAVAILABLE,
                "ServiceMonitor API is not installed; monitoring is deferred",
            )
        };
        self.publish(owner, event).await;
    }

    async fn publish(&self, owner: &OwnerIdentity, event: OwnerEvent) {
        let reason = event.reason.clone();
        if let Err(e) = self.events.publish(&owner.object_reference(), event).await {
            warn!(owner = %owner, %reason, error = %e, "Failed to publish event");
        }
    }

    /// Reconcile one registered monitor
    ///
    /// `Ok(None)` when the spec is unknown or its owner is gone (the spec is
    /// then dropped).
    pub async fn reconcile_one(&self, key: &ObjectKey) -> OperatorResult<Option<OperationResult>> {
        let spec = {
            let state = self.read();
            if !state.api_available {
                return Err(OperatorError::MonitoringUnavailable);
            }
            state.specs.get(key).cloned()
        };
        let Some(spec) = spec else {
            return Ok(None);
        };

        match self.client.get(&spec.owner.resource(), &spec.owner.key()).await {
            Ok(Some(_)) => {}
            Ok(None) | Err(ClientError::NotFound(_)) => {
                info!(owner = %spec.owner, monitor = %key, "Owner is gone, dropping ServiceMonitor spec");
                self.unregister(key);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let resource = service_monitor_resource();
        let mut template = DynamicObject::new(&key.name, &resource);
        template.metadata.namespace = key.namespace.clone();

        match create_or_update_with(
            self.client.as_ref(),
            &self.retry,
            &resource,
            template,
            spec.mutators.as_slice(),
        )
        .await
        {
            Ok((result, _)) => {
                let reason = match result {
                    OperationResult::Created => REASON_CREATED,
                    OperationResult::Updated => REASON_UPDATED,
                    OperationResult::None => {
                        debug!(monitor = %key, "ServiceMonitor unchanged");
                        return Ok(Some(result));
                    }
                };
                let note = format!("ServiceMonitor {key} {result}");
                self.publish(&spec.owner, OwnerEvent::normal(reason, note))
                    .await;
                Ok(Some(result))
            }
            Err(e) => {
                self.publish(
                    &spec.owner,
                    OwnerEvent::warning(REASON_FAILED, format!("ServiceMonitor {key}: {e}")),
                )
                .await;
                Err(e)
            }
        }
    }

    /// Reconcile every registered monitor; returns the first error after trying all
    pub async fn reconcile_all(&self) -> OperatorResult<()> {
        if !self.is_api_available() {
            return Err(OperatorError::MonitoringUnavailable);
        }
        let mut first_error = None;
        for key in self.keys() {
            if let Err(e) = self.reconcile_one(&key).await {
                warn!(monitor = %key, error = %e, "Failed to reconcile ServiceMonitor");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
