//! # Components
//!
//! Concrete component controllers built from the engine's primitives.

pub mod rekor;
