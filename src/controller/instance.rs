//! # Instance Capability
//!
//! The capability set a custom resource must expose to be driven by the engine:
//! conditions, generation, identity, and a typed status accessor pair.

use crate::crd::Condition;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// Status types carrying a condition list
pub trait StatusConditions {
    fn conditions(&self) -> &[Condition];
    fn conditions_mut(&mut self) -> &mut Vec<Condition>;
}

/// A custom resource the action pipeline can reconcile
///
/// Status access goes through [`get_status`](Instance::get_status) /
/// [`set_status`](Instance::set_status) so status writes compare typed values.
pub trait Instance:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Status: StatusConditions
        + Clone
        + Default
        + Debug
        + PartialEq
        + Serialize
        + DeserializeOwned
        + Send
        + Sync;

    fn get_status(&self) -> Option<&Self::Status>;

    fn set_status(&mut self, status: Self::Status);

    /// Status, created empty on first access
    fn status_entry(&mut self) -> &mut Self::Status;

    fn conditions(&self) -> &[Condition] {
        self.get_status()
            .map(StatusConditions::conditions)
            .unwrap_or_default()
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        self.status_entry().conditions_mut()
    }

    fn generation(&self) -> Option<i64> {
        self.meta().generation
    }

    /// `namespace/name`, used as the key for logs and backoff state
    fn object_key(&self) -> String {
        format!(
            "{}/{}",
            self.namespace().unwrap_or_default(),
            self.name_any()
        )
    }
}
