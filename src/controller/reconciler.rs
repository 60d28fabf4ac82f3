//! # Reconciler
//!
//! Generic driver plugging an action [`Pipeline`] into kube-runtime's `Controller`.
//!
//! ## Reconciliation Flow
//!
//! 1. Re-fetch the instance (gone: wait for the next change)
//! 2. Skip instances being deleted (children cascade via owner references)
//! 3. Halt on a `Failure` recorded for the current generation; restart the
//!    lifecycle once the spec moved on
//! 4. Run the pipeline and map its outcome:
//!    - terminal error: wait for a spec change
//!    - transient error: returned, so the error policy backs off
//!    - delay: requeue after it
//!    - otherwise: wait for the next change

use crate::constants::{
    DEFAULT_ERROR_BACKOFF_MAX_SECS, DEFAULT_ERROR_BACKOFF_MIN_SECS, READY_CONDITION,
};
use crate::controller::action::{ActionResult, BaseAction, Pipeline};
use crate::controller::backoff::{ExponentialBackoff, RetryPolicy};
use crate::controller::client::{get_typed, EventSink, ObjectClient, ObjectKey};
use crate::controller::conditions::{find_condition, set_condition};
use crate::controller::monitoring::{OwnerIdentity, ServiceMonitorRegistry};
use crate::controller::{Instance, State};
use crate::crd::{Condition, ConditionStatus};
use crate::error::OperatorError;
use crate::observability::metrics;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, Instrument, Span};

/// Reconciler context shared by every reconcile of one controller
pub struct Reconciler<T: Instance> {
    name: String,
    client: Arc<dyn ObjectClient>,
    events: Arc<dyn EventSink>,
    retry: RetryPolicy,
    pipeline: Pipeline<T>,
    /// Per-resource error backoff, keyed by `namespace/name`
    backoff_states: Mutex<HashMap<String, ExponentialBackoff>>,
    backoff_min: Duration,
    backoff_max: Duration,
    /// Registry whose specs are dropped when an instance goes away
    registry: Option<Arc<ServiceMonitorRegistry>>,
}

impl<T: Instance> std::fmt::Debug for Reconciler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("name", &self.name)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl<T: Instance> Reconciler<T> {
    pub fn new(
        name: impl Into<String>,
        client: Arc<dyn ObjectClient>,
        events: Arc<dyn EventSink>,
        retry: RetryPolicy,
        pipeline: Pipeline<T>,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            events,
            retry,
            pipeline,
            backoff_states: Mutex::new(HashMap::new()),
            backoff_min: Duration::from_secs(DEFAULT_ERROR_BACKOFF_MIN_SECS),
            backoff_max: Duration::from_secs(DEFAULT_ERROR_BACKOFF_MAX_SECS),
            registry: None,
        }
    }

    /// Forget the ServiceMonitor specs of instances that are deleted
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<ServiceMonitorRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Override the error backoff bounds
    #[must_use]
    pub fn with_error_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.backoff_min = min;
        self.backoff_max = max;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pipeline(&self) -> &Pipeline<T> {
        &self.pipeline
    }

    fn base_action(&self, span: Span) -> BaseAction {
        BaseAction::new(self.client.clone(), self.events.clone(), self.retry).with_span(span)
    }

    fn backoff_states(&self) -> MutexGuard<'_, HashMap<String, ExponentialBackoff>> {
        self.backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Next error backoff for a resource
    pub fn next_backoff(&self, key: &str) -> (Duration, u32) {
        let mut states = self.backoff_states();
        let backoff = states
            .entry(key.to_string())
            .or_insert_with(|| ExponentialBackoff::new(self.backoff_min, self.backoff_max));
        let delay = backoff.next_backoff();
        (delay, backoff.attempt())
    }

    /// Forget the error backoff of a resource after a successful pass
    pub fn reset_backoff(&self, key: &str) {
        self.backoff_states().remove(key);
    }

    fn forget_owner(&self, obj: &T) {
        if let Some(registry) = &self.registry {
            let dropped = registry.forget_owner(&OwnerIdentity::of(obj));
            if dropped > 0 {
                debug!(dropped, "Dropped ServiceMonitor specs of a deleted instance");
            }
        }
    }

    /// Run one pass over `instance`, returning what the pipeline stopped with
    pub async fn run_pipeline(&self, instance: &T) -> Option<ActionResult> {
        let base = self.base_action(Span::current());
        self.pipeline.run(&base, instance).await
    }

    /// Halt on a failure for the current generation, or clear it once the spec changed
    ///
    /// Returns `true` when the pipeline must not run.
    async fn check_failure(&self, instance: &mut T) -> Result<bool, OperatorError> {
        if State::of(instance) != State::Failure {
            return Ok(false);
        }
        let failed_generation =
            find_condition(instance.conditions(), READY_CONDITION).and_then(|c| c.observed_generation);
        if failed_generation == instance.generation() {
            debug!("Instance failed at its current generation, waiting for a spec change");
            return Ok(true);
        }

        info!(
            ?failed_generation,
            generation = ?instance.generation(),
            "Spec changed after a failure, restarting lifecycle"
        );
        let base = self.base_action(Span::current());
        base.observe(instance);
        set_condition(
            instance.conditions_mut(),
            Condition::new(READY_CONDITION, ConditionStatus::Unknown, State::Pending.as_str())
                .with_message("Spec changed after a failure"),
        );
        base.status_update(instance).await?;
        Ok(false)
    }

    async fn reconcile_pass(&self, obj: &T) -> Result<Action, OperatorError> {
        let key = ObjectKey::of(obj);
        let Some(mut instance) = get_typed::<T>(self.client.as_ref(), &key).await? else {
            debug!("Instance is gone");
            self.reset_backoff(&obj.object_key());
            self.forget_owner(obj);
            return Ok(Action::await_change());
        };
        if instance.meta().deletion_timestamp.is_some() {
            debug!("Instance is being deleted");
            self.forget_owner(&instance);
            return Ok(Action::await_change());
        }
        if self.check_failure(&mut instance).await? {
            return Ok(Action::await_change());
        }

        let object_key = instance.object_key();
        match self.run_pipeline(&instance).await {
            Some(ActionResult {
                error: Some(error), ..
            }) => {
                if error.is_terminal() {
                    self.reset_backoff(&object_key);
                    Ok(Action::await_change())
                } else {
                    Err(error)
                }
            }
            Some(ActionResult {
                requeue_after: Some(delay),
                ..
            }) if !delay.is_zero() => {
                self.reset_backoff(&object_key);
                metrics::increment_requeues_total("poll");
                debug!(delay_secs = delay.as_secs_f64(), "Requeueing");
                Ok(Action::requeue(delay))
            }
            _ => {
                self.reset_backoff(&object_key);
                Ok(Action::await_change())
            }
        }
    }
}

/// Reconcile entry point for kube-runtime's `Controller::run`
pub async fn reconcile<T: Instance>(
    obj: Arc<T>,
    ctx: Arc<Reconciler<T>>,
) -> Result<Action, OperatorError> {
    let span = info_span!(
        "reconcile",
        controller = %ctx.name,
        namespace = %obj.namespace().unwrap_or_default(),
        name = %obj.name_any(),
    );
    async move {
        let start = Instant::now();
        metrics::increment_reconciliations(&ctx.name);
        let result = ctx.reconcile_pass(&obj).await;
        metrics::observe_reconciliation_duration(&ctx.name, start.elapsed().as_secs_f64());
        result
    }
    .instrument(span)
    .await
}
