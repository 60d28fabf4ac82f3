//! # Lifecycle Tests
//!
//! Drive a pipeline made only of the four phase transitions through the
//! reconcile driver, against the in-memory cluster.

mod common;

use common::{condition, key, reconcile_once, reconcile_until_idle, reconciler, rekor, stored};
use kube_runtime::controller::Action;
use signstack_operator::constants::READY_CONDITION;
use signstack_operator::controller::action::{Pipeline, ToCreatePhase, ToInitializePhase, ToPendingPhase, ToReadyPhase};
use signstack_operator::controller::conditions::set_condition;
use signstack_operator::controller::{Instance, State};
use signstack_operator::crd::{Condition, ConditionStatus, Rekor};
use signstack_operator::testing::FakeCluster;
use std::sync::Arc;

fn transitions() -> Pipeline<Rekor> {
    Pipeline::new()
        .with(ToPendingPhase::with_components(&["ServerAvailable"]))
        .with(ToCreatePhase)
        .with(ToInitializePhase)
        .with(ToReadyPhase)
}

#[tokio::test]
async fn test_new_instance_walks_every_phase_to_ready() {
    let cluster = Arc::new(FakeCluster::new());
    cluster.insert(&rekor("rekor")).unwrap();
    let ctx = reconciler(&cluster, transitions());

    let mut seen = Vec::new();
    for _ in 0..4 {
        let action = reconcile_once(&cluster, &ctx, "rekor").await.unwrap();
        assert_eq!(action, Action::await_change());
        seen.push(State::of(&stored(&cluster, "rekor")));
    }
    assert_eq!(
        seen,
        vec![State::Pending, State::Creating, State::Initialize, State::Ready]
    );

    let instance = stored(&cluster, "rekor");
    let ready = condition(&instance, READY_CONDITION).unwrap();
    assert_eq!(ready.status, ConditionStatus::True);
    assert_eq!(ready.observed_generation, instance.generation());

    let component = condition(&instance, "ServerAvailable").unwrap();
    assert_eq!(component.status, ConditionStatus::Unknown);
    assert_eq!(component.reason, "Pending");
}

#[tokio::test]
async fn test_ready_instance_is_left_alone() {
    let cluster = Arc::new(FakeCluster::new());
    cluster.insert(&rekor("rekor")).unwrap();
    let ctx = reconciler(&cluster, transitions());
    reconcile_until_idle(&cluster, &ctx, "rekor", 10).await;

    let writes = cluster.writes();
    let action = reconcile_once(&cluster, &ctx, "rekor").await.unwrap();
    assert_eq!(action, Action::await_change());
    assert_eq!(cluster.writes(), writes);
}

#[tokio::test]
async fn test_spec_change_refreshes_ready_generation() {
    let cluster = Arc::new(FakeCluster::new());
    cluster.insert(&rekor("rekor")).unwrap();
    let ctx = reconciler(&cluster, transitions());
    reconcile_until_idle(&cluster, &ctx, "rekor", 10).await;

    let edited: Rekor = cluster
        .update(&key("rekor"), |r: &mut Rekor| r.spec.monitoring.enabled = true)
        .unwrap();
    assert_eq!(edited.generation(), Some(2));
    assert_eq!(
        condition(&edited, READY_CONDITION).unwrap().observed_generation,
        Some(1)
    );

    reconcile_once(&cluster, &ctx, "rekor").await.unwrap();
    let ready = condition(&stored(&cluster, "rekor"), READY_CONDITION).unwrap();
    assert_eq!(ready.status, ConditionStatus::True);
    assert_eq!(ready.observed_generation, Some(2));
}

#[tokio::test]
async fn test_unknown_ready_condition_restarts_at_pending() {
    let cluster = Arc::new(FakeCluster::new());
    cluster.insert(&rekor("rekor")).unwrap();
    let ctx = reconciler(&cluster, transitions());
    reconcile_until_idle(&cluster, &ctx, "rekor", 10).await;

    cluster
        .update(&key("rekor"), |r: &mut Rekor| {
            set_condition(
                r.conditions_mut(),
                Condition::new(READY_CONDITION, ConditionStatus::Unknown, "Ready"),
            );
        })
        .unwrap();

    reconcile_once(&cluster, &ctx, "rekor").await.unwrap();
    assert_eq!(State::of(&stored(&cluster, "rekor")), State::Pending);
}

#[tokio::test]
async fn test_foreign_reason_is_not_a_lifecycle_state() {
    let cluster = Arc::new(FakeCluster::new());
    let mut instance = rekor("rekor");
    set_condition(
        instance.conditions_mut(),
        Condition::new(READY_CONDITION, ConditionStatus::False, "ReconciliationSucceeded"),
    );
    cluster.insert(&instance).unwrap();
    let ctx = reconciler(&cluster, transitions());

    // Only the Ready transition applies to a reason it does not recognise.
    reconcile_once(&cluster, &ctx, "rekor").await.unwrap();
    let instance = stored(&cluster, "rekor");
    assert_eq!(State::of(&instance), State::Ready);
}

#[tokio::test]
async fn test_deleted_instance_awaits_change() {
    let cluster = Arc::new(FakeCluster::new());
    let stored_instance = cluster.insert(&rekor("rekor")).unwrap();
    let ctx = reconciler(&cluster, transitions());
    assert!(cluster.delete::<Rekor>(&key("rekor")));

    let action = signstack_operator::controller::reconciler::reconcile(Arc::new(stored_instance), ctx)
        .await
        .unwrap();
    assert_eq!(action, Action::await_change());
    assert_eq!(cluster.writes(), 1);
}
