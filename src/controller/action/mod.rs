//! # Action Pipeline
//!
//! An [`Action`] is one idempotent unit of reconciliation work, gated by a pure
//! predicate. A controller composes an ordered [`Pipeline`] of actions; the
//! order of phase transitions interleaved with component actions is the
//! lifecycle state machine.
//!
//! ## Pipeline semantics
//!
//! - The fetched instance is deep-copied once per pass
//! - `can_handle` is evaluated for every action in this pass, never cached
//! - `None` from `handle` means "continue"; `Some` stops the pass and is returned
//!   to the driver, which maps an error to backoff-retry and a delay to a requeue

pub mod base;
pub mod transitions;

pub use base::BaseAction;
pub use transitions::{ToCreatePhase, ToInitializePhase, ToPendingPhase, ToReadyPhase};

use crate::controller::Instance;
use crate::error::OperatorError;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug_span, Instrument};

/// Outcome of one `handle` call that stops the pipeline
#[derive(Debug, Default)]
pub struct ActionResult {
    pub requeue_after: Option<Duration>,
    pub error: Option<OperatorError>,
}

impl ActionResult {
    /// Stop without error or requeue
    pub fn done() -> Self {
        Self::default()
    }

    pub fn requeue_after(delay: Duration) -> Self {
        Self {
            requeue_after: Some(delay),
            error: None,
        }
    }

    pub fn error(error: OperatorError) -> Self {
        Self {
            requeue_after: None,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// One capability-gated unit of work over an instance of `T`
///
/// Dependencies (client, event sink, logging span) arrive through the
/// [`BaseAction`] built by the driver for each reconcile pass.
#[async_trait]
pub trait Action<T: Instance>: Send + Sync {
    fn name(&self) -> &str;

    /// Pure predicate deciding whether `handle` runs in this pass
    fn can_handle(&self, instance: &T) -> bool;

    /// Apply the action; `None` continues with the next action
    async fn handle(&self, base: &BaseAction, instance: &mut T) -> Option<ActionResult>;
}

/// Ordered list of actions run sequentially for one instance
pub struct Pipeline<T: Instance> {
    actions: Vec<Box<dyn Action<T>>>,
}

impl<T: Instance> std::fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("actions", &self.names())
            .finish()
    }
}

impl<T: Instance> Default for Pipeline<T> {
    fn default() -> Self {
        Self {
            actions: Vec::new(),
        }
    }
}

impl<T: Instance> Pipeline<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action
    #[must_use]
    pub fn with(mut self, action: impl Action<T> + 'static) -> Self {
        self.actions.push(Box::new(action));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.actions.iter().map(|a| a.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run one pass over a deep copy of `instance`
    pub async fn run(&self, base: &BaseAction, instance: &T) -> Option<ActionResult> {
        let mut instance = instance.clone();
        base.observe(&instance);

        for action in &self.actions {
            if !action.can_handle(&instance) {
                continue;
            }
            let span = debug_span!(parent: base.span(), "action", action = action.name());
            if let Some(result) = action.handle(base, &mut instance).instrument(span).await {
                return Some(result);
            }
        }
        None
    }
}
