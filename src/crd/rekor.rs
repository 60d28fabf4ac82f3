//! # Rekor
//!
//! Custom resource for a Rekor transparency log server.
//!
//! ## Example
//!
//! ```yaml
//! apiVersion: signstack.dev/v1alpha1
//! kind: Rekor
//! metadata:
//!   name: rekor
//!   namespace: signstack
//! spec:
//!   attestations:
//!     enabled: true
//!   pvc:
//!     size: 5Gi
//!     retain: true
//!   monitoring:
//!     enabled: true
//! ```

use crate::controller::{Instance, StatusConditions};
use crate::crd::Condition;
use serde::{Deserialize, Serialize};

#[derive(kube::CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Rekor",
    group = "signstack.dev",
    version = "v1alpha1",
    namespaced,
    status = "RekorStatus",
    shortname = "rek",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}, {"name":"URL", "type":"string", "jsonPath":".status.url"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RekorSpec {
    /// Attestation storage
    #[serde(default)]
    pub attestations: Attestations,
    /// Volume backing attestation storage
    #[serde(default)]
    pub pvc: Pvc,
    /// ServiceMonitor for the server metrics endpoint
    #[serde(default)]
    pub monitoring: Monitoring,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Attestations {
    /// Store attestations on a persistent volume
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for Attestations {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pvc {
    /// Name of the claim; defaults to `<instance>-<suffix>` when empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Requested size, e.g. `5Gi`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Keep the claim when the instance is deleted
    #[serde(default)]
    pub retain: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    /// Defaults to `ReadWriteOnce`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_modes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Monitoring {
    #[serde(default)]
    pub enabled: bool,
}

/// Observed state of a Rekor instance
///
/// Optional fields serialize as `null` so a status write always carries every field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RekorStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Claim actually used for attestations
    #[serde(default)]
    pub pvc_name: Option<String>,
    /// In-cluster URL of the server
    #[serde(default)]
    pub url: Option<String>,
}

fn default_true() -> bool {
    true
}

impl StatusConditions for RekorStatus {
    fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.conditions
    }
}

impl Instance for Rekor {
    type Status = RekorStatus;

    fn get_status(&self) -> Option<&RekorStatus> {
        self.status.as_ref()
    }

    fn set_status(&mut self, status: RekorStatus) {
        self.status = Some(status);
    }

    fn status_entry(&mut self) -> &mut RekorStatus {
        self.status.get_or_insert_with(RekorStatus::default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_spec_defaults() {
        let spec: RekorSpec = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(spec.attestations.enabled);
        assert!(!spec.monitoring.enabled);
        assert!(spec.pvc.size.is_none());
    }

    #[test]
    fn test_crd_metadata() {
        let crd = Rekor::crd();
        assert_eq!(crd.metadata.name.as_deref(), Some("rekors.signstack.dev"));
        assert_eq!(crd.spec.group, "signstack.dev");
    }

    #[test]
    fn test_status_serializes_unset_fields_as_null() {
        let status = serde_json::to_value(RekorStatus::default()).unwrap();
        assert!(status["pvcName"].is_null());
        assert!(status.as_object().unwrap().contains_key("url"));
    }
}
