//! # Reconciliation Engine
//!
//! Generic control-loop building blocks shared by every component controller.
//!
//! ## Sub-modules
//!
//! - `instance` - capability trait every managed custom resource implements
//! - `state` - lifecycle state derived from the `Ready` condition
//! - `conditions` - condition upsert and lookup
//! - `client` - Kubernetes API and event seams
//! - `action` - action pipeline, shared helpers and phase transitions
//! - `status` - optimistic-concurrency status writes
//! - `kubernetes` - idempotent `create_or_update` and mutators
//! - `monitoring` - ServiceMonitor registry and CRD availability gate
//! - `reconciler` - generic driver plugged into kube-runtime
//! - `backoff` - bounded exponential backoff

pub mod action;
pub mod backoff;
pub mod client;
pub mod conditions;
pub mod instance;
pub mod kubernetes;
pub mod monitoring;
pub mod reconciler;
pub mod state;
pub mod status;

pub use instance::{Instance, StatusConditions};
pub use state::State;
