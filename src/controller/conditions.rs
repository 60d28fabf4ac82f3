//! # Conditions
//!
//! Upsert and lookup of status conditions. A condition list never holds two
//! entries with the same type.

use crate::crd::{Condition, ConditionStatus};

pub fn find_condition<'a>(conditions: &'a [Condition], r#type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == r#type)
}

pub fn is_condition_true(conditions: &[Condition], r#type: &str) -> bool {
    find_condition(conditions, r#type).is_some_and(|c| c.status == ConditionStatus::True)
}

/// Insert or update the condition of the same type
///
/// `last_transition_time` moves only when the status flips (or the condition is new).
/// Returns `true` when the list changed.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) -> bool {
    let now = || Some(chrono::Utc::now().to_rfc3339());

    let Some(existing) = conditions.iter_mut().find(|c| c.r#type == condition.r#type) else {
        let mut condition = condition;
        if condition.last_transition_time.is_none() {
            condition.last_transition_time = now();
        }
        conditions.push(condition);
        return true;
    };

    let mut changed = false;
    if existing.status != condition.status {
        existing.status = condition.status;
        existing.last_transition_time = condition.last_transition_time.or_else(now);
        changed = true;
    }
    if existing.reason != condition.reason {
        existing.reason = condition.reason;
        changed = true;
    }
    if existing.message != condition.message {
        existing.message = condition.message;
        changed = true;
    }
    if existing.observed_generation != condition.observed_generation {
        existing.observed_generation = condition.observed_generation;
        changed = true;
    }
    changed
}

/// Remove the condition of the given type; returns `true` if one was removed
pub fn remove_condition(conditions: &mut Vec<Condition>, r#type: &str) -> bool {
    let before = conditions.len();
    conditions.retain(|c| c.r#type != r#type);
    conditions.len() != before
}
