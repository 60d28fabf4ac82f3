//! # Create Or Update Tests
//!
//! Idempotence, pause handling and conflict retries of the upsert primitive.

mod common;

use common::{fast_retry, NAMESPACE};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use signstack_operator::constants::PAUSED_ANNOTATION;
use signstack_operator::controller::backoff::RetryPolicy;
use signstack_operator::controller::client::ObjectKey;
use signstack_operator::controller::kubernetes::{
    annotations, create_or_update, labels, Mutator, OperationResult,
};
use signstack_operator::testing::FakeCluster;
use signstack_operator::OperatorError;
use std::collections::BTreeMap;
use std::time::Duration;

fn template() -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some("settings".to_string()),
            namespace: Some(NAMESPACE.to_string()),
            ..ObjectMeta::default()
        },
        ..ConfigMap::default()
    }
}

fn data(value: &'static str) -> Mutator<ConfigMap> {
    Box::new(move |cm: &mut ConfigMap| {
        cm.data
            .get_or_insert_with(BTreeMap::new)
            .insert("level".to_string(), value.to_string());
        Ok(())
    })
}

fn team_label() -> Mutator<ConfigMap> {
    labels(BTreeMap::from([("team".to_string(), "signing".to_string())]))
}

fn settings_key() -> ObjectKey {
    ObjectKey::namespaced(NAMESPACE, "settings")
}

#[tokio::test]
async fn test_second_call_with_same_mutators_is_a_no_op() {
    let cluster = FakeCluster::new();
    let mutators = vec![team_label(), data("info")];

    let (result, created) = create_or_update(&cluster, &fast_retry(), template(), &mutators)
        .await
        .unwrap();
    assert_eq!(result, OperationResult::Created);
    assert_eq!(created.data.unwrap()["level"], "info");

    let writes = cluster.writes();
    let (result, _) = create_or_update(&cluster, &fast_retry(), template(), &mutators)
        .await
        .unwrap();
    assert_eq!(result, OperationResult::None);
    assert_eq!(cluster.writes(), writes);
}

#[tokio::test]
async fn test_changed_mutator_updates_object() {
    let cluster = FakeCluster::new();
    create_or_update(&cluster, &fast_retry(), template(), &[data("info")])
        .await
        .unwrap();

    let (result, updated) = create_or_update(&cluster, &fast_retry(), template(), &[data("debug")])
        .await
        .unwrap();
    assert_eq!(result, OperationResult::Updated);
    assert_eq!(updated.data.unwrap()["level"], "debug");
}

#[tokio::test]
async fn test_foreign_fields_survive_an_update() {
    let cluster = FakeCluster::new();
    let mut existing = template();
    existing.metadata.labels = Some(BTreeMap::from([("owner".to_string(), "ops".to_string())]));
    cluster.insert(&existing).unwrap();

    create_or_update(&cluster, &fast_retry(), template(), &[team_label()])
        .await
        .unwrap();

    let stored: ConfigMap = cluster.get(&settings_key()).unwrap();
    let stored_labels = stored.metadata.labels.unwrap();
    assert_eq!(stored_labels["owner"], "ops");
    assert_eq!(stored_labels["team"], "signing");
}

#[tokio::test]
async fn test_paused_object_is_left_untouched() {
    let cluster = FakeCluster::new();
    let mut paused = template();
    paused.metadata.annotations = Some(BTreeMap::from([(PAUSED_ANNOTATION.to_string(), "true".to_string())]));
    cluster.insert(&paused).unwrap();
    let writes = cluster.writes();

    let (result, _) = create_or_update(&cluster, &fast_retry(), template(), &[data("debug")])
        .await
        .unwrap();
    assert_eq!(result, OperationResult::None);
    assert_eq!(cluster.writes(), writes);
    assert!(cluster.get::<ConfigMap>(&settings_key()).unwrap().data.is_none());
}

#[tokio::test]
async fn test_pause_annotation_set_to_false_is_ignored() {
    let cluster = FakeCluster::new();
    let mut unpaused = template();
    unpaused.metadata.annotations = Some(BTreeMap::from([(PAUSED_ANNOTATION.to_string(), "false".to_string())]));
    cluster.insert(&unpaused).unwrap();

    let (result, _) = create_or_update(&cluster, &fast_retry(), template(), &[data("debug")])
        .await
        .unwrap();
    assert_eq!(result, OperationResult::Updated);
}

#[tokio::test]
async fn test_paused_annotation_only_applies_to_existing_objects() {
    let cluster = FakeCluster::new();
    let pause = annotations(BTreeMap::from([(PAUSED_ANNOTATION.to_string(), "true".to_string())]));

    let (result, _) = create_or_update(&cluster, &fast_retry(), template(), &[pause, data("info")])
        .await
        .unwrap();
    assert_eq!(result, OperationResult::Created);
    assert_eq!(cluster.get::<ConfigMap>(&settings_key()).unwrap().data.unwrap()["level"], "info");
}

#[tokio::test]
async fn test_conflicts_are_retried() {
    let cluster = FakeCluster::new();
    cluster.insert(&template()).unwrap();
    cluster.inject_conflicts(2);

    let (result, _) = create_or_update(&cluster, &fast_retry(), template(), &[data("debug")])
        .await
        .unwrap();
    assert_eq!(result, OperationResult::Updated);
}

#[tokio::test]
async fn test_conflict_retries_are_bounded() {
    let cluster = FakeCluster::new();
    cluster.insert(&template()).unwrap();
    cluster.inject_conflicts(10);
    let retry = RetryPolicy {
        attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    };

    let err = create_or_update(&cluster, &retry, template(), &[data("debug")])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OperatorError::ConflictRetriesExhausted { attempts: 3, .. }
    ));
}

#[tokio::test]
async fn test_mutator_error_is_returned() {
    let cluster = FakeCluster::new();
    let failing: Mutator<ConfigMap> = Box::new(|_| Err(OperatorError::terminal("bad template")));

    let err = create_or_update(&cluster, &fast_retry(), template(), &[failing])
        .await
        .unwrap_err();
    assert!(err.is_terminal());
    assert!(cluster.get::<ConfigMap>(&settings_key()).is_none());
}
