//! Signstack Operator Library
//!
//! Reconciliation engine for the signing and transparency-log stack operator.
//!
//! The engine is made of a few pieces that every managed component reuses:
//!
//! - [`controller::state`] maps the `Ready` condition to a lifecycle [`State`](controller::state::State)
//! - [`controller::action`] defines the [`Action`](controller::action::Action) pipeline and its
//!   shared helpers, plus the four phase transitions
//! - [`controller::kubernetes`] provides the idempotent `create_or_update` primitive
//! - [`controller::monitoring`] defers ServiceMonitor reconciliation until the monitoring CRD exists
//!
//! Concrete component controllers (see [`components`]) compose pipelines from these primitives.

pub mod components;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod error;
pub mod observability;
pub mod runtime;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use crd::*;
pub use error::{OperatorError, OperatorResult};
