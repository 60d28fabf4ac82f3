//! # Error Policy
//!
//! Backoff for transient reconciliation errors.
//!
//! Backoff state is tracked per resource so one failing instance does not slow
//! down the others. It is reset by the next successful pass.

use crate::controller::reconciler::Reconciler;
use crate::controller::Instance;
use crate::error::OperatorError;
use crate::observability;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use tracing::{error, info};

/// Handle reconciliation errors with exponential backoff
pub fn handle_reconciliation_error<T: Instance>(
    obj: Arc<T>,
    error: &OperatorError,
    ctx: Arc<Reconciler<T>>,
) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "reconciliation_error",
        controller = ctx.name(),
        resource.name = %name,
        resource.namespace = %namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {}/{}: {}", namespace, name, error);
    observability::metrics::increment_reconciliation_errors(ctx.name());

    let (delay, attempt) = ctx.next_backoff(&obj.object_key());
    info!(
        "Retrying {}/{} in {}s (attempt {})",
        namespace,
        name,
        delay.as_secs(),
        attempt
    );

    observability::metrics::increment_requeues_total("error-backoff");
    Action::requeue(delay)
}
