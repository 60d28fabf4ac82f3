//! # Lifecycle State
//!
//! Coarse lifecycle of a managed instance, encoded in the `Ready` condition's reason.
//!
//! Writers (phase transitions, `BaseAction::error`) and readers share this closed enum,
//! so the reason strings cannot drift apart. Reasons written by something else
//! (an older operator, a user) map to [`State::None`].

use crate::constants::READY_CONDITION;
use crate::controller::conditions::find_condition;
use crate::controller::Instance;
use std::fmt;

/// Lifecycle state, ordered so that `state >= State::Creating` means
/// "the creation gate has passed"
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum State {
    #[default]
    None,
    Failure,
    NotDefined,
    Pending,
    Creating,
    Initialize,
    Ready,
}

impl State {
    pub fn as_str(self) -> &'static str {
        match self {
            State::None => "",
            State::Failure => "Failure",
            State::NotDefined => "NotDefined",
            State::Pending => "Pending",
            State::Creating => "Creating",
            State::Initialize => "Initialize",
            State::Ready => "Ready",
        }
    }

    /// Map a condition reason to a state; unknown strings map to `None`
    pub fn from_reason(reason: &str) -> Self {
        match reason {
            "Failure" => State::Failure,
            "NotDefined" => State::NotDefined,
            "Pending" => State::Pending,
            "Creating" => State::Creating,
            "Initialize" => State::Initialize,
            "Ready" => State::Ready,
            _ => State::None,
        }
    }

    /// State of an instance, read from its `Ready` condition
    pub fn of<T: Instance>(instance: &T) -> Self {
        find_condition(instance.conditions(), READY_CONDITION)
            .map_or(State::None, |c| State::from_reason(&c.reason))
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
