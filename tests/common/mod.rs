//! Shared fixtures for the integration tests.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use kube::api::ObjectMeta;
use kube_runtime::controller::Action;
use signstack_operator::components::rekor;
use signstack_operator::config::ControllerConfig;
use signstack_operator::controller::action::{BaseAction, Pipeline};
use signstack_operator::controller::backoff::RetryPolicy;
use signstack_operator::controller::client::ObjectKey;
use signstack_operator::controller::conditions::find_condition;
use signstack_operator::controller::monitoring::ServiceMonitorRegistry;
use signstack_operator::controller::reconciler::{reconcile, Reconciler};
use signstack_operator::controller::Instance;
use signstack_operator::crd::{Condition, Rekor, RekorSpec};
use signstack_operator::testing::FakeCluster;
use signstack_operator::OperatorError;
use std::sync::Arc;
use std::time::Duration;

pub const NAMESPACE: &str = "signstack";

/// Fast retries so conflict tests do not sleep for long
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        attempts: 5,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
    }
}

pub fn rekor_with(name: &str, spec: RekorSpec) -> Rekor {
    Rekor {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..ObjectMeta::default()
        },
        spec,
        status: None,
    }
}

/// A Rekor with attestations on a 1Gi claim
pub fn rekor(name: &str) -> Rekor {
    let mut spec = RekorSpec::default();
    spec.pvc.size = Some("1Gi".to_string());
    rekor_with(name, spec)
}

pub fn key(name: &str) -> ObjectKey {
    ObjectKey::namespaced(NAMESPACE, name)
}

pub fn base_action(cluster: &Arc<FakeCluster>) -> BaseAction {
    BaseAction::new(cluster.clone(), cluster.clone(), fast_retry())
}

pub fn registry(cluster: &Arc<FakeCluster>) -> Arc<ServiceMonitorRegistry> {
    Arc::new(ServiceMonitorRegistry::new(cluster.clone(), cluster.clone(), fast_retry()))
}

pub fn reconciler(cluster: &Arc<FakeCluster>, pipeline: Pipeline<Rekor>) -> Arc<Reconciler<Rekor>> {
    Arc::new(Reconciler::new(
        rekor::CONTROLLER_NAME,
        cluster.clone(),
        cluster.clone(),
        fast_retry(),
        pipeline,
    ))
}

/// The Rekor reconciler as the operator wires it
pub fn rekor_reconciler(cluster: &Arc<FakeCluster>, registry: Arc<ServiceMonitorRegistry>) -> Arc<Reconciler<Rekor>> {
    let pipeline = rekor::pipeline(&ControllerConfig::default(), registry.clone());
    Arc::new(
        Reconciler::new(
            rekor::CONTROLLER_NAME,
            cluster.clone(),
            cluster.clone(),
            fast_retry(),
            pipeline,
        )
        .with_registry(registry),
    )
}

/// One reconcile of the stored instance, the way the controller would run it
pub async fn reconcile_once(
    cluster: &FakeCluster,
    ctx: &Arc<Reconciler<Rekor>>,
    name: &str,
) -> Result<Action, OperatorError> {
    let stored: Rekor = cluster.get(&key(name)).expect("instance is stored");
    reconcile(Arc::new(stored), ctx.clone()).await
}

/// Reconcile until a pass neither writes nor fails, returning every outcome
pub async fn reconcile_until_idle(
    cluster: &FakeCluster,
    ctx: &Arc<Reconciler<Rekor>>,
    name: &str,
    max_passes: usize,
) -> Vec<Action> {
    let mut outcomes = Vec::new();
    for _ in 0..max_passes {
        let writes = cluster.writes();
        let action = reconcile_once(cluster, ctx, name).await.expect("reconcile succeeds");
        outcomes.push(action);
        if cluster.writes() == writes {
            break;
        }
    }
    outcomes
}

pub fn condition(instance: &Rekor, r#type: &str) -> Option<Condition> {
    find_condition(instance.conditions(), r#type).cloned()
}

pub fn stored(cluster: &FakeCluster, name: &str) -> Rekor {
    cluster.get(&key(name)).expect("instance is stored")
}
