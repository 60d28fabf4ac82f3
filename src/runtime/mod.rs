//! # Runtime Module
//!
//! Process runtime for the operator: initialization, the controller watch loop,
//! the error policy and the metrics/health HTTP server.

pub mod error_policy;
pub mod initialization;
pub mod server;
pub mod watch_loop;

pub use error_policy::*;
pub use initialization::*;
pub use watch_loop::*;
