//! # Phase Transitions
//!
//! Four generic actions that move the `Ready` condition through the lifecycle:
//!
//! ```text
//! (none|Unknown) -> Pending -> Creating -> Initialize -> Ready
//! ```
//!
//! Component actions placed between them gate on [`State`], so their position
//! in the pipeline decides when they run.

use crate::constants::READY_CONDITION;
use crate::controller::action::{Action, ActionResult, BaseAction};
use crate::controller::conditions::{find_condition, set_condition};
use crate::controller::{Instance, State};
use crate::crd::{Condition, ConditionStatus};
use async_trait::async_trait;
use tracing::info;

type ComponentSupplier<T> = Box<dyn Fn(&T) -> Vec<String> + Send + Sync>;

fn ready(status: ConditionStatus, state: State) -> Condition {
    Condition::new(READY_CONDITION, status, state.as_str())
}

/// Enter `Pending` and declare the sub-conditions this instance will report
pub struct ToPendingPhase<T> {
    components: ComponentSupplier<T>,
}

impl<T> std::fmt::Debug for ToPendingPhase<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToPendingPhase").finish_non_exhaustive()
    }
}

impl<T> ToPendingPhase<T> {
    pub fn new(components: impl Fn(&T) -> Vec<String> + Send + Sync + 'static) -> Self {
        Self {
            components: Box::new(components),
        }
    }

    /// Same component conditions for every instance
    pub fn with_components(components: &[&str]) -> Self {
        let components: Vec<String> = components.iter().map(ToString::to_string).collect();
        Self::new(move |_| components.clone())
    }
}

#[async_trait]
impl<T: Instance> Action<T> for ToPendingPhase<T> {
    fn name(&self) -> &str {
        "pending"
    }

    fn can_handle(&self, instance: &T) -> bool {
        find_condition(instance.conditions(), READY_CONDITION)
            .is_none_or(|c| c.status == ConditionStatus::Unknown)
    }

    async fn handle(&self, base: &BaseAction, instance: &mut T) -> Option<ActionResult> {
        let components = (self.components)(instance);
        let conditions = instance.conditions_mut();
        set_condition(conditions, ready(ConditionStatus::False, State::Pending));
        for component in components {
            set_condition(
                conditions,
                Condition::new(component, ConditionStatus::Unknown, State::Pending.as_str()),
            );
        }
        info!(object = %instance.object_key(), "Moving to Pending phase");
        base.update_status(instance).await
    }
}

/// `Pending` -> `Creating`
#[derive(Debug, Default, Clone, Copy)]
pub struct ToCreatePhase;

#[async_trait]
impl<T: Instance> Action<T> for ToCreatePhase {
    fn name(&self) -> &str {
        "create"
    }

    fn can_handle(&self, instance: &T) -> bool {
        State::of(instance) == State::Pending
    }

    async fn handle(&self, base: &BaseAction, instance: &mut T) -> Option<ActionResult> {
        set_condition(
            instance.conditions_mut(),
            ready(ConditionStatus::False, State::Creating),
        );
        info!(object = %instance.object_key(), "Moving to Creating phase");
        base.update_status(instance).await
    }
}

/// `Creating` -> `Initialize`
#[derive(Debug, Default, Clone, Copy)]
pub struct ToInitializePhase;

#[async_trait]
impl<T: Instance> Action<T> for ToInitializePhase {
    fn name(&self) -> &str {
        "initialize"
    }

    fn can_handle(&self, instance: &T) -> bool {
        State::of(instance) == State::Creating
    }

    async fn handle(&self, base: &BaseAction, instance: &mut T) -> Option<ActionResult> {
        set_condition(
            instance.conditions_mut(),
            ready(ConditionStatus::False, State::Initialize),
        );
        info!(object = %instance.object_key(), "Moving to Initialize phase");
        base.update_status(instance).await
    }
}

/// Mark the instance `Ready` for its current generation
///
/// Re-applies whenever the reason, status or observed generation is off, so a
/// spec edit re-opens the gate. An instance without a `Ready` condition has not
/// entered the lifecycle yet and is left alone.
#[derive(Debug, Default, Clone, Copy)]
pub struct ToReadyPhase;

#[async_trait]
impl<T: Instance> Action<T> for ToReadyPhase {
    fn name(&self) -> &str {
        "ready"
    }

    fn can_handle(&self, instance: &T) -> bool {
        find_condition(instance.conditions(), READY_CONDITION).is_some_and(|c| {
            c.reason != State::Ready.as_str()
                || c.status != ConditionStatus::True
                || c.observed_generation != instance.generation()
        })
    }

    async fn handle(&self, base: &BaseAction, instance: &mut T) -> Option<ActionResult> {
        let generation = instance.generation();
        set_condition(
            instance.conditions_mut(),
            ready(ConditionStatus::True, State::Ready).with_generation(generation),
        );
        info!(object = %instance.object_key(), ?generation, "Instance is Ready");
        base.update_status(instance).await
    }
}
