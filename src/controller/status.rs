//! # Status Writes
//!
//! Optimistic-concurrency status updates.
//!
//! An action mutates its deep copy of the instance and asks for the status to be
//! persisted. Other actors may have written the status in the meantime, so the
//! write is a three-way rebase:
//!
//! 1. `base` - the status this reconcile last observed
//! 2. `desired` - the status after the action's mutations
//! 3. `live` - the status currently stored in the cluster
//!
//! Only what changed between `base` and `desired` is applied on top of `live`.
//! Conditions are merged by `type`, so two actors touching different conditions
//! never overwrite each other. A `resourceVersion` conflict re-reads and retries.

use crate::controller::backoff::RetryPolicy;
use crate::controller::client::{from_dynamic, ClientError, ObjectClient, ObjectKey};
use crate::controller::Instance;
use crate::error::{OperatorError, OperatorResult};
use crate::observability::metrics;
use kube::core::{ApiResource, DynamicObject};
use kube::ResourceExt;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Outcome of a status write
#[derive(Debug, Clone)]
pub struct StatusSwap<T> {
    /// `false` when the live status already matched
    pub written: bool,
    /// The object as stored after the write
    pub live: T,
}

/// Persist the status of `instance`, rebased against the live object
///
/// `base` is the serialized status the caller started from (`null` when none).
pub async fn compare_and_swap_status<T: Instance>(
    client: &dyn ObjectClient,
    retry: &RetryPolicy,
    base: &Value,
    instance: &T,
) -> OperatorResult<StatusSwap<T>> {
    let resource = ApiResource::erase::<T>(&());
    let key = ObjectKey::of(instance);
    let desired = serde_json::to_value(instance.get_status())?;

    for attempt in 0..retry.attempts {
        let Some(live) = client.get(&resource, &key).await? else {
            return Err(OperatorError::NotFound {
                kind: resource.kind.clone(),
                namespace: instance.namespace().unwrap_or_default(),
                name: instance.name_any(),
            });
        };

        let live_status = live.data.get("status").cloned().unwrap_or(Value::Null);
        let merged: Option<T::Status> =
            serde_json::from_value(rebase(&live_status, base, &desired))?;
        let live_typed: T = from_dynamic(live.clone())?;
        if live_typed.get_status() == merged.as_ref() {
            return Ok(StatusSwap {
                written: false,
                live: live_typed,
            });
        }

        let updated = with_status(live, serde_json::to_value(&merged)?);
        match client.replace_status(&resource, &updated).await {
            Ok(stored) => {
                return Ok(StatusSwap {
                    written: true,
                    live: from_dynamic(stored)?,
                });
            }
            Err(ClientError::Conflict(_)) => {
                metrics::increment_status_update_conflicts();
                let delay = retry.delay(attempt);
                debug!(
                    object = %key,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis(),
                    "Status write conflicted, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e.into()),
        }
    }

    warn!(object = %key, attempts = retry.attempts, "Status write retries exhausted");
    Err(OperatorError::ConflictRetriesExhausted {
        name: key.to_string(),
        attempts: retry.attempts,
    })
}

fn with_status(mut object: DynamicObject, status: Value) -> DynamicObject {
    match object.data.as_object_mut() {
        Some(data) => {
            data.insert("status".to_string(), status);
        }
        None => object.data = serde_json::json!({ "status": status }),
    }
    object
}

/// Apply the `base -> desired` change on top of `live`
pub fn rebase(live: &Value, base: &Value, desired: &Value) -> Value {
    if base == desired {
        return live.clone();
    }
    let (Value::Object(live), Value::Object(desired)) = (live, desired) else {
        return desired.clone();
    };

    let empty = Map::new();
    let base = base.as_object().unwrap_or(&empty);
    let mut merged = live.clone();

    for (field, desired_value) in desired {
        let base_value = base.get(field).unwrap_or(&Value::Null);
        let live_value = live.get(field).unwrap_or(&Value::Null);
        let value = if field == "conditions" {
            rebase_conditions(live_value, base_value, desired_value)
        } else {
            rebase(live_value, base_value, desired_value)
        };
        merged.insert(field.clone(), value);
    }
    for field in base.keys() {
        if !desired.contains_key(field) {
            merged.remove(field);
        }
    }
    Value::Object(merged)
}

fn condition_type(condition: &Value) -> Option<&str> {
    condition.get("type").and_then(Value::as_str)
}

fn find_by_type<'a>(conditions: &'a [Value], r#type: Option<&str>) -> Option<&'a Value> {
    conditions.iter().find(|c| condition_type(c) == r#type)
}

/// Merge condition lists by `type`
///
/// Conditions the caller changed are upserted into the live list; conditions
/// the caller removed are dropped; everything else keeps its live value.
fn rebase_conditions(live: &Value, base: &Value, desired: &Value) -> Value {
    let empty = Vec::new();
    let base = base.as_array().unwrap_or(&empty);
    let desired = desired.as_array().unwrap_or(&empty);
    let mut merged = live.as_array().cloned().unwrap_or_default();

    for condition in desired {
        let r#type = condition_type(condition);
        if find_by_type(base, r#type) == Some(condition) {
            continue;
        }
        match merged.iter_mut().find(|c| condition_type(c) == r#type) {
            Some(existing) => *existing = condition.clone(),
            None => merged.push(condition.clone()),
        }
    }
    for condition in base {
        let r#type = condition_type(condition);
        if find_by_type(desired, r#type).is_none() {
            merged.retain(|c| condition_type(c) != r#type);
        }
    }
    Value::Array(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unchanged_desired_keeps_live() {
        let live = json!({"url": "http://other", "conditions": []});
        let base = json!({"url": null});
        assert_eq!(rebase(&live, &base, &base), live);
    }

    #[test]
    fn test_scalar_change_is_applied() {
        let live = json!({"url": null, "pvcName": "data"});
        let base = json!({"url": null, "pvcName": null});
        let desired = json!({"url": "http://rekor.ns.svc", "pvcName": null});

        let merged = rebase(&live, &base, &desired);
        assert_eq!(merged["url"], "http://rekor.ns.svc");
        // Written concurrently by someone else and untouched here.
        assert_eq!(merged["pvcName"], "data");
    }

    #[test]
    fn test_disjoint_conditions_are_both_kept() {
        let base = json!({"conditions": [{"type": "Ready", "status": "False", "reason": "Creating"}]});
        let live = json!({"conditions": [
            {"type": "Ready", "status": "False", "reason": "Creating"},
            {"type": "DatabaseAvailable", "status": "True", "reason": "Ready"}
        ]});
        let desired = json!({"conditions": [
            {"type": "Ready", "status": "False", "reason": "Creating"},
            {"type": "ServerAvailable", "status": "True", "reason": "Ready"}
        ]});

        let merged = rebase(&live, &base, &desired);
        let conditions = merged["conditions"].as_array().unwrap();
        assert_eq!(conditions.len(), 3);
        assert!(conditions.iter().any(|c| c["type"] == "DatabaseAvailable"));
        assert!(conditions.iter().any(|c| c["type"] == "ServerAvailable"));
    }

    #[test]
    fn test_changed_condition_overrides_live() {
        let base = json!({"conditions": [{"type": "Ready", "status": "Unknown", "reason": "Pending"}]});
        let live = json!({"conditions": [{"type": "Ready", "status": "False", "reason": "Pending"}]});
        let desired = json!({"conditions": [{"type": "Ready", "status": "False", "reason": "Creating"}]});

        let merged = rebase(&live, &base, &desired);
        assert_eq!(merged["conditions"][0]["reason"], "Creating");
        assert_eq!(merged["conditions"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_removed_condition_is_dropped() {
        let base = json!({"conditions": [
            {"type": "Ready", "status": "True", "reason": "Ready"},
            {"type": "Stale", "status": "True", "reason": "Old"}
        ]});
        let desired = json!({"conditions": [{"type": "Ready", "status": "True", "reason": "Ready"}]});

        let merged = rebase(&base, &base, &desired);
        assert_eq!(merged["conditions"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_live_status_takes_desired() {
        let desired = json!({"conditions": [{"type": "Ready", "status": "False", "reason": "Pending"}]});
        assert_eq!(rebase(&Value::Null, &Value::Null, &desired), desired);
    }
}
