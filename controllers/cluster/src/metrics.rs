//! Metrics and health probes.
//!
//! Serves `/healthz`, `/readyz` and `/metrics` on the probe address. Counters
//! live in a registry owned by the controller rather than the prometheus
//! default registry.

use crate::error::ControllerError;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Reconciliation counters
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    reconciliations: IntCounterVec,
    reconcile_errors: IntCounter,
    registry_update_steps: IntCounter,
}

impl Metrics {
    /// Build the counters and register them in a fresh `nodesmith` registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("nodesmith".to_string()), None)?;

        let reconciliations = IntCounterVec::new(
            Opts::new("reconciliations_total", "Cluster reconciliations grouped by result"),
            &["result"],
        )?;
        let reconcile_errors = IntCounter::new("reconcile_errors_total", "Failed cluster reconciliations")?;
        let registry_update_steps = IntCounter::new(
            "registry_update_steps_total",
            "Registry update steps issued to cluster nodes",
        )?;

        registry.register(Box::new(reconciliations.clone()))?;
        registry.register(Box::new(reconcile_errors.clone()))?;
        registry.register(Box::new(registry_update_steps.clone()))?;

        Ok(Self {
            registry,
            reconciliations,
            reconcile_errors,
            registry_update_steps,
        })
    }

    /// Count a successful reconciliation
    pub fn reconcile_succeeded(&self) {
        self.reconciliations.with_label_values(&["success"]).inc();
    }

    /// Count a failed reconciliation
    pub fn reconcile_failed(&self) {
        self.reconciliations.with_label_values(&["error"]).inc();
        self.reconcile_errors.inc();
    }

    /// Count an issued registry update step
    pub fn registry_update_issued(&self) {
        self.registry_update_steps.inc();
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared state of the probe server
#[derive(Debug, Clone)]
pub struct ProbeState {
    metrics: Arc<Metrics>,
    ready: Arc<AtomicBool>,
}

impl ProbeState {
    /// Probe state reporting `metrics`, not ready until [`ProbeState::mark_ready`]
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            metrics,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Report ready from now on
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(state): State<ProbeState>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "starting")
    }
}

async fn metrics(State(state): State<ProbeState>) -> Response {
    match state.metrics.render() {
        Ok(body) => ([(CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Router serving the probe endpoints
pub fn router(state: ProbeState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serve the probe endpoints until the listener fails
pub async fn serve(addr: SocketAddr, state: ProbeState) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ControllerError::Watch(format!("Failed to bind probe listener at {}: {}", addr, e)))?;
    info!("Probe server listening on {}", addr);
    axum::serve(listener, router(state))
        .await
        .map_err(|e| ControllerError::Watch(format!("Probe server failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_exported_with_prefix() {
        let metrics = Metrics::new().unwrap();
        metrics.reconcile_succeeded();
        metrics.reconcile_failed();
        metrics.registry_update_issued();
        metrics.registry_update_issued();

        let text = metrics.render().unwrap();
        assert!(text.contains("nodesmith_reconciliations_total{result=\"success\"} 1"));
        assert!(text.contains("nodesmith_reconciliations_total{result=\"error\"} 1"));
        assert!(text.contains("nodesmith_reconcile_errors_total 1"));
        assert!(text.contains("nodesmith_registry_update_steps_total 2"));
    }

    #[tokio::test]
    async fn test_readiness_follows_mark_ready() {
        let state = ProbeState::new(Arc::new(Metrics::new().unwrap()));

        let response = readyz(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.mark_ready();
        let response = readyz(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_renders() {
        let state = ProbeState::new(Arc::new(Metrics::new().unwrap()));
        let response = metrics(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
