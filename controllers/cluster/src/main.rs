//! Cluster Controller
//!
//! Reconciles `Cluster` resources: computes the registry set each cluster's
//! container runtime should trust, prunes stale `Registry` references and
//! issues trust store update steps to the cluster's nodes.

mod backoff;
mod controller;
mod error;
mod metrics;
mod reconciler;
mod watcher;

use crate::error::ControllerError;
use controller::{Controller, ControllerConfig};
use std::env;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    // kube's rustls-tls needs a process-wide crypto provider
    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Cluster Controller");

    let namespace = env::var("WATCH_NAMESPACE").ok();
    let probe_addr = env::var("PROBE_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()
        .map_err(|e| ControllerError::InvalidConfig(format!("PROBE_ADDR: {}", e)))?;
    let requeue_seconds: u64 = match env::var("REQUEUE_SECONDS") {
        Ok(value) => value
            .parse()
            .map_err(|e| ControllerError::InvalidConfig(format!("REQUEUE_SECONDS: {}", e)))?,
        Err(_) => 300,
    };

    info!("Configuration:");
    info!("  Namespace: {}", namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Probe address: {}", probe_addr);
    info!("  Requeue interval: {}s", requeue_seconds);

    let controller = Controller::new(ControllerConfig {
        namespace,
        probe_addr,
        requeue: Duration::from_secs(requeue_seconds),
    })
    .await?;
    controller.run().await?;

    Ok(())
}
