//! # Signstack Operator
//!
//! Kubernetes operator for the signing and transparency-log stack.
//!
//! ## Overview
//!
//! Each managed component is a custom resource reconciled by an ordered action
//! pipeline. The `Ready` condition tracks the lifecycle
//! (Pending, Creating, Initialize, Ready, Failure), and child objects are
//! converged with an idempotent create-or-update.
//!
//! ## Features
//!
//! - **Optional monitoring**: ServiceMonitors are created once the Prometheus
//!   Operator CRD is installed, and replayed when it appears at runtime
//! - **Prometheus metrics**: exposed on `/metrics`
//! - **Health probes**: `/healthz` and `/readyz`

use anyhow::Result;
use signstack_operator::runtime::initialization::initialize;
use signstack_operator::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;
    run_watch_loop(init_result).await
}
