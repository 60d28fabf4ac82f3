//! # Observability
//!
//! Prometheus metrics for the operator. Logging goes through `tracing` and is
//! configured in [`crate::runtime::initialization`].

pub mod metrics;
