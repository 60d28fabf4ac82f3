//! # Monitoring
//!
//! Optional ServiceMonitor support.
//!
//! The monitoring CRD may be missing, or may be installed and removed while the
//! operator runs. Component actions declare the monitors they want in the
//! [`ServiceMonitorRegistry`]; the [`CrdWatcherReconciler`] flips the registry's
//! availability gate when the CRD appears or disappears and replays every
//! registered spec once it is available.

pub mod crd_watcher;
pub mod registry;

pub use crd_watcher::CrdWatcherReconciler;
pub use registry::{OwnerIdentity, ServiceMonitorRegistry, ServiceMonitorSpec};
