//! # Controller Metrics
//!
//! Metrics for the reconciliation engine: reconciliations, requeues, status
//! write conflicts and ServiceMonitor API availability.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{HistogramVec, IntCounter, IntCounterVec, IntGauge};
use std::sync::LazyLock;

// Reconciliation metrics
static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "signstack_reconciliations_total",
            "Total number of reconciliations",
        ),
        &["controller"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "signstack_reconciliation_errors_total",
            "Total number of reconciliation errors",
        ),
        &["controller"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "signstack_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["controller"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

// Requeue metrics
static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "signstack_requeues_total",
            "Total number of reconciliation requeues",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static STATUS_UPDATE_CONFLICTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "signstack_status_update_conflicts_total",
        "Total number of status writes rejected with a resourceVersion conflict",
    )
    .expect("Failed to create STATUS_UPDATE_CONFLICTS_TOTAL metric - this should never happen")
});

static SERVICE_MONITOR_API_AVAILABLE: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "signstack_service_monitor_api_available",
        "Whether the ServiceMonitor CRD is installed and established (1) or not (0)",
    )
    .expect("Failed to create SERVICE_MONITOR_API_AVAILABLE metric - this should never happen")
});

/// Register controller metrics with the registry
pub(crate) fn register_controller_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STATUS_UPDATE_CONFLICTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SERVICE_MONITOR_API_AVAILABLE.clone()))?;
    Ok(())
}

// Public functions for controller metrics

pub fn increment_reconciliations(controller: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[controller]).inc();
}

pub fn increment_reconciliation_errors(controller: &str) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[controller])
        .inc();
}

pub fn observe_reconciliation_duration(controller: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[controller])
        .observe(duration);
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_status_update_conflicts() {
    STATUS_UPDATE_CONFLICTS_TOTAL.inc();
}

pub fn set_service_monitor_api_available(available: bool) {
    SERVICE_MONITOR_API_AVAILABLE.set(i64::from(available));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.with_label_values(&["metrics-test"]).get();
        increment_reconciliations("metrics-test");
        let after = RECONCILIATIONS_TOTAL.with_label_values(&["metrics-test"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_reconciliation_errors() {
        let before = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["metrics-test"])
            .get();
        increment_reconciliation_errors("metrics-test");
        let after = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["metrics-test"])
            .get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_increment_requeues_total() {
        let before = REQUEUES_TOTAL.with_label_values(&["metrics-test"]).get();
        increment_requeues_total("metrics-test");
        let after = REQUEUES_TOTAL.with_label_values(&["metrics-test"]).get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_observe_reconciliation_duration() {
        let before = RECONCILIATION_DURATION
            .with_label_values(&["metrics-test"])
            .get_sample_count();
        observe_reconciliation_duration("metrics-test", 0.25);
        let after = RECONCILIATION_DURATION
            .with_label_values(&["metrics-test"])
            .get_sample_count();
        assert_eq!(after, before + 1);
    }

    #[test]
    fn test_increment_status_update_conflicts() {
        let before = STATUS_UPDATE_CONFLICTS_TOTAL.get();
        increment_status_update_conflicts();
        assert!(STATUS_UPDATE_CONFLICTS_TOTAL.get() > before);
    }
}
