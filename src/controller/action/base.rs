//! # Base Action
//!
//! Helpers shared by every action: flow control, status persistence, error
//! handling and owner events.

use crate::constants::{READY_CONDITION, REQUEUE_DELAY};
use crate::controller::action::ActionResult;
use crate::controller::backoff::RetryPolicy;
use crate::controller::client::{object_reference, EventSink, ObjectClient, OwnerEvent};
use crate::controller::conditions::set_condition;
use crate::controller::status::compare_and_swap_status;
use crate::controller::{Instance, State};
use crate::crd::{Condition, ConditionStatus};
use crate::error::{OperatorError, OperatorResult};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, warn, Span};

/// Dependencies and helpers handed to each action during one reconcile pass
pub struct BaseAction {
    client: Arc<dyn ObjectClient>,
    events: Arc<dyn EventSink>,
    retry: RetryPolicy,
    span: Span,
    /// Status last read from or written to the cluster in this pass
    baseline: Mutex<Value>,
}

impl std::fmt::Debug for BaseAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseAction")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl BaseAction {
    pub fn new(client: Arc<dyn ObjectClient>, events: Arc<dyn EventSink>, retry: RetryPolicy) -> Self {
        Self {
            client,
            events,
            retry,
            span: Span::current(),
            baseline: Mutex::new(Value::Null),
        }
    }

    /// Attach the span that parents every action span of this pass
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn client(&self) -> &dyn ObjectClient {
        self.client.as_ref()
    }

    pub fn events(&self) -> &dyn EventSink {
        self.events.as_ref()
    }

    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Record the status `instance` was read with, as the base for the next write
    pub fn observe<T: Instance>(&self, instance: &T) {
        let status = serde_json::to_value(instance.get_status()).unwrap_or(Value::Null);
        *self.baseline.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    fn baseline(&self) -> Value {
        self.baseline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Continue with the next action
    pub fn proceed(&self) -> Option<ActionResult> {
        None
    }

    /// Stop the pass without error or requeue
    pub fn finish(&self) -> Option<ActionResult> {
        Some(ActionResult::done())
    }

    /// Stop and poll again after the fixed requeue delay
    pub fn requeue(&self) -> Option<ActionResult> {
        Some(ActionResult::requeue_after(REQUEUE_DELAY))
    }

    /// Persist the status of `instance`
    ///
    /// Only the changes made since the last observation are written, on top of
    /// whatever is live. Conflicts are retried in place. On return `instance`
    /// holds the stored object. Returns `true` when a write happened.
    pub async fn status_update<T: Instance>(&self, instance: &mut T) -> OperatorResult<bool> {
        let base = self.baseline();
        let swap = compare_and_swap_status(self.client(), &self.retry, &base, instance).await?;
        *instance = swap.live;
        self.observe(instance);
        Ok(swap.written)
    }

    /// Persist the status and stop the pass when something was written
    ///
    /// The write itself triggers the next reconcile, so a written status ends
    /// this pass. An unchanged status continues with the next action.
    pub async fn update_status<T: Instance>(&self, instance: &mut T) -> Option<ActionResult> {
        match self.status_update(instance).await {
            Ok(true) => self.finish(),
            Ok(false) => self.proceed(),
            Err(e) => self.error(instance, e, Vec::new()).await,
        }
    }

    /// Report an error and stop the pass
    ///
    /// Terminal errors force `Ready=False/Failure` with the error message. Extra
    /// `conditions` are applied either way; the status is persisted when it was
    /// touched. A Warning event is published on the instance.
    pub async fn error<T: Instance>(
        &self,
        instance: &mut T,
        err: OperatorError,
        conditions: Vec<Condition>,
    ) -> Option<ActionResult> {
        let terminal = err.is_terminal();
        let persist = terminal || !conditions.is_empty();

        if terminal {
            let generation = instance.generation();
            set_condition(
                instance.conditions_mut(),
                Condition::new(READY_CONDITION, ConditionStatus::False, State::Failure.as_str())
                    .with_message(err.to_string())
                    .with_generation(generation),
            );
            error!(object = %instance.object_key(), error = %err, "Terminal reconciliation error");
        } else {
            warn!(object = %instance.object_key(), error = %err, "Reconciliation error");
        }
        for condition in conditions {
            set_condition(instance.conditions_mut(), condition);
        }

        if persist {
            if let Err(e) = self.status_update(instance).await {
                warn!(object = %instance.object_key(), error = %e, "Failed to persist error status");
            }
        }

        let reason = if terminal { "Failure" } else { "Error" };
        self.record_event(instance, OwnerEvent::warning(reason, err.to_string()))
            .await;

        Some(ActionResult::error(err))
    }

    /// Publish an event on `instance`; failures are logged, never returned
    pub async fn record_event<T: Instance>(&self, instance: &T, event: OwnerEvent) {
        let reason = event.reason.clone();
        match self.events.publish(&object_reference(instance), event).await {
            Ok(()) => debug!(object = %instance.object_key(), %reason, "Published event"),
            Err(e) => warn!(object = %instance.object_key(), %reason, error = %e, "Failed to publish event"),
        }
    }
}
