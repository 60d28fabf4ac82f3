//! # Constants
//!
//! Shared names and default values used across the operator.

use std::time::Duration;

/// Field manager and event reporter name
pub const OPERATOR_NAME: &str = "signstack-operator";

/// API group of the operator's custom resources
pub const API_GROUP: &str = "signstack.dev";

/// Condition type carrying the coarse lifecycle state
pub const READY_CONDITION: &str = "Ready";

/// Annotation that freezes an object: `create_or_update` leaves it untouched
pub const PAUSED_ANNOTATION: &str = "signstack.dev/paused";

/// Fixed delay used while polling an in-flight dependency
pub const REQUEUE_DELAY: Duration = Duration::from_secs(5);

/// Name of the optional monitoring CRD
pub const DEFAULT_SERVICE_MONITOR_CRD: &str = "servicemonitors.monitoring.coreos.com";

/// Group/version/kind of the monitoring resource, accessed as an unstructured object
pub const SERVICE_MONITOR_GROUP: &str = "monitoring.coreos.com";
pub const SERVICE_MONITOR_VERSION: &str = "v1";
pub const SERVICE_MONITOR_KIND: &str = "ServiceMonitor";
pub const SERVICE_MONITOR_PLURAL: &str = "servicemonitors";

/// Default attempts for conflict retries (status writes and `create_or_update`)
pub const DEFAULT_CONFLICT_RETRY_ATTEMPTS: u32 = 5;

/// Initial delay between conflict retries (milliseconds)
pub const DEFAULT_CONFLICT_RETRY_BASE_MS: u64 = 10;

/// Upper bound for a single conflict retry delay (milliseconds)
pub const DEFAULT_CONFLICT_RETRY_MAX_MS: u64 = 1_000;

/// Error policy backoff bounds (seconds)
pub const DEFAULT_ERROR_BACKOFF_MIN_SECS: u64 = 1;
pub const DEFAULT_ERROR_BACKOFF_MAX_SECS: u64 = 300;

/// HTTP server defaults
pub const DEFAULT_METRICS_PORT: u16 = 8080;
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default Rekor server image
pub const DEFAULT_REKOR_SERVER_IMAGE: &str = "gcr.io/projectsigstore/rekor-server:v1.3.6";

/// Standard Kubernetes recommended labels
pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
