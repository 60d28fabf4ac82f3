//! # Operator Configuration
//!
//! Configuration loaded from environment variables (populated from the
//! operator Deployment). All settings have defaults.
//!
//! The configuration is an explicit value threaded through constructors; there
//! is no process-wide mutable configuration.

mod controller;
mod server;

pub use controller::{ControllerConfig, ImageKey, Images};
pub use server::ServerConfig;

/// Complete operator configuration
#[derive(Debug, Clone, Default)]
pub struct OperatorConfig {
    pub controller: ControllerConfig,
    pub server: ServerConfig,
}

impl OperatorConfig {
    pub fn from_env() -> Self {
        Self {
            controller: ControllerConfig::from_env(),
            server: ServerConfig::from_env(),
        }
    }
}

/// Load configuration from environment variables with defaults
pub fn load_config() -> OperatorConfig {
    OperatorConfig::from_env()
}

/// Read environment variable or return default value
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
