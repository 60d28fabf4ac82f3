//! # Initialization
//!
//! Operator startup: rustls provider, tracing, configuration, metrics, HTTP
//! server and Kubernetes client.

use crate::config::{load_config, OperatorConfig, ServerConfig};
use crate::controller::client::{EventSink, KubeEventSink, KubeObjectClient, ObjectClient};
use crate::controller::monitoring::ServiceMonitorRegistry;
use crate::observability;
use crate::runtime::server::{start_server, ServerState};
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tracing::{error, info};

/// Everything the watch loop needs
pub struct InitializationResult {
    pub client: Client,
    pub config: OperatorConfig,
    pub object_client: Arc<dyn ObjectClient>,
    pub events: Arc<dyn EventSink>,
    pub registry: Arc<ServiceMonitorRegistry>,
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("server_state", &self.server_state)
            .finish_non_exhaustive()
    }
}

/// Initialize the operator runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Configuration loading
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before anything opens a TLS connection.
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        return Err(anyhow::anyhow!("Failed to install rustls crypto provider"));
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signstack_operator=info".into()),
        )
        .init();

    info!("Starting Signstack Operator v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config();
    info!(
        openshift = config.controller.openshift,
        service_monitor_crd = %config.controller.service_monitor_crd,
        conflict_retry_attempts = config.controller.retry.attempts,
        "Configuration loaded"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = server_state.clone();
    let server_port = config.server.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle, &config.server).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let object_client: Arc<dyn ObjectClient> = Arc::new(KubeObjectClient::new(client.clone()));
    let events: Arc<dyn EventSink> = Arc::new(KubeEventSink::new(client.clone()));
    let registry = Arc::new(ServiceMonitorRegistry::new(
        object_client.clone(),
        events.clone(),
        config.controller.retry,
    ));

    info!("Operator initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        config,
        object_client,
        events,
        registry,
        server_state,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = config.startup_timeout();
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }
        if server_state.ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }
        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }
        tokio::time::sleep(config.poll_interval()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_debug<T: std::fmt::Debug>() {}

    #[test]
    fn test_initialization_result_is_debug() {
        assert_debug::<InitializationResult>();
    }
}
