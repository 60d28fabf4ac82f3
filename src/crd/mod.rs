//! # Custom Resource Definitions
//!
//! CRD types for the Signstack Operator.
//!
//! This module contains the shared status types ([`Condition`], [`ConditionStatus`])
//! and the custom resources managed by the bundled component controllers.

pub mod rekor;
pub mod status;

pub use rekor::*;
pub use status::*;
