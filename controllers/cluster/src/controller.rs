//! Main controller implementation.
//!
//! Wires the cluster store, the reconciler, the `Cluster` watcher and the
//! probe server together and runs them until one of them exits.

use crate::error::ControllerError;
use crate::metrics::{Metrics, ProbeState};
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use cluster_store::KubeClusterStore;
use crds::Cluster;
use kube::{Api, Client};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Controller settings read from the environment
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace reported in logs (`Cluster` and `Registry` are cluster scoped)
    pub namespace: Option<String>,

    /// Probe and metrics listen address
    pub probe_addr: SocketAddr,

    /// Requeue interval of healthy clusters
    pub requeue: Duration,
}

/// Main controller for `Cluster` resources.
#[derive(Debug)]
pub struct Controller {
    cluster_watcher: JoinHandle<Result<(), ControllerError>>,
    probe_server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its tasks.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Cluster Controller");
        if let Some(ns) = &config.namespace {
            info!("Cluster and Registry are cluster scoped, ignoring namespace {}", ns);
        }

        let kube_client = Client::try_default().await?;
        let cluster_api: Api<Cluster> = Api::all(kube_client.clone());
        let store = Arc::new(KubeClusterStore::new(kube_client));

        let metrics = Arc::new(
            Metrics::new().map_err(|e| ControllerError::InvalidConfig(format!("metrics registry: {}", e)))?,
        );
        let probe_state = ProbeState::new(metrics.clone());

        let reconciler = Arc::new(Reconciler::new(store, cluster_api.clone(), metrics, config.requeue));
        let watcher = Watcher::new(reconciler, cluster_api);

        let cluster_watcher = tokio::spawn(async move { watcher.watch_clusters().await });
        let probe_server = {
            let state = probe_state.clone();
            tokio::spawn(async move { crate::metrics::serve(config.probe_addr, state).await })
        };
        probe_state.mark_ready();

        Ok(Self {
            cluster_watcher,
            probe_server,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Cluster Controller running");

        tokio::select! {
            result = &mut self.cluster_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Cluster watcher panicked: {}", e)))??;
            }
            result = &mut self.probe_server => {
                result.map_err(|e| ControllerError::Watch(format!("Probe server panicked: {}", e)))??;
            }
        }

        Ok(())
    }
}
