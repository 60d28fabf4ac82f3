//! # Metrics Module
//!
//! Prometheus metrics for monitoring the operator, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup, registration and text encoding
//! - `controller_metrics` - Reconciliations, requeues, status conflicts and the monitoring gate

pub mod controller_metrics;
pub mod registry;

pub use controller_metrics::*;
pub use registry::*;
