//! # Controller Configuration
//!
//! Images, platform and optional-feature settings for the component controllers.

use super::env_var_or_default;
use crate::constants::{DEFAULT_CONFLICT_RETRY_ATTEMPTS, DEFAULT_REKOR_SERVER_IMAGE, DEFAULT_SERVICE_MONITOR_CRD};
use crate::controller::backoff::RetryPolicy;
use std::collections::HashMap;

/// Images the operator deploys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKey {
    RekorServer,
}

impl ImageKey {
    /// Environment variable overriding the image (OLM `RELATED_IMAGE_*` convention)
    pub fn env_var(self) -> &'static str {
        match self {
            ImageKey::RekorServer => "RELATED_IMAGE_REKOR_SERVER",
        }
    }

    pub fn default_image(self) -> &'static str {
        match self {
            ImageKey::RekorServer => DEFAULT_REKOR_SERVER_IMAGE,
        }
    }

    pub fn all() -> &'static [ImageKey] {
        &[ImageKey::RekorServer]
    }
}

/// Image lookup table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Images {
    images: HashMap<ImageKey, String>,
}

impl Default for Images {
    fn default() -> Self {
        Self {
            images: ImageKey::all()
                .iter()
                .map(|key| (*key, key.default_image().to_string()))
                .collect(),
        }
    }
}

impl Images {
    pub fn from_env() -> Self {
        Self {
            images: ImageKey::all()
                .iter()
                .map(|key| {
                    let image = env_var_or_default(key.env_var(), key.default_image().to_string());
                    (*key, image)
                })
                .collect(),
        }
    }

    pub fn get(&self, key: ImageKey) -> &str {
        self.images
            .get(&key)
            .map_or_else(|| key.default_image(), String::as_str)
    }

    #[must_use]
    pub fn with(mut self, key: ImageKey, image: impl Into<String>) -> Self {
        self.images.insert(key, image.into());
        self
    }
}

/// Component controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub images: Images,
    /// Running on OpenShift: the platform assigns pod UIDs, so none are set
    pub openshift: bool,
    /// Name of the monitoring CRD whose presence gates ServiceMonitors
    pub service_monitor_crd: String,
    /// Conflict retry policy for status writes and `create_or_update`
    pub retry: RetryPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            images: Images::default(),
            openshift: false,
            service_monitor_crd: DEFAULT_SERVICE_MONITOR_CRD.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            images: Images::from_env(),
            openshift: env_var_or_default("OPENSHIFT", false),
            service_monitor_crd: env_var_or_default(
                "SERVICE_MONITOR_CRD",
                DEFAULT_SERVICE_MONITOR_CRD.to_string(),
            ),
            retry: RetryPolicy::with_attempts(env_var_or_default(
                "CONFLICT_RETRY_ATTEMPTS",
                DEFAULT_CONFLICT_RETRY_ATTEMPTS,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_images() {
        let images = Images::default();
        assert_eq!(images.get(ImageKey::RekorServer), DEFAULT_REKOR_SERVER_IMAGE);
    }

    #[test]
    fn test_image_override() {
        let images = Images::default().with(ImageKey::RekorServer, "registry.local/rekor:dev");
        assert_eq!(images.get(ImageKey::RekorServer), "registry.local/rekor:dev");
    }

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert!(!config.openshift);
        assert_eq!(config.service_monitor_crd, DEFAULT_SERVICE_MONITOR_CRD);
        assert_eq!(config.retry.attempts, DEFAULT_CONFLICT_RETRY_ATTEMPTS);
    }
}
