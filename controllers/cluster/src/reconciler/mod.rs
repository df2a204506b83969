//! Reconciliation logic for `Cluster` resources.
//!
//! - `registries`: desired registry set, stale reference pruning and the
//!   trust store update step

pub mod registries;

use crate::backoff::{MIN_DELAY, RetryBackoff};
use crate::error::ControllerError;
use crate::metrics::Metrics;
use cluster_store::ClusterStore;
use crds::{Cluster, ClusterPhase, ClusterStatus};
use kube::api::{Patch, PatchParams};
use kube::{Api, ResourceExt};
use registries::{RegistryPlan, plan_registry_update};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Reconciles `Cluster` resources.
pub struct Reconciler {
    pub(crate) store: Arc<dyn ClusterStore>,
    pub(crate) cluster_api: Api<Cluster>,
    pub(crate) metrics: Arc<Metrics>,
    requeue: Duration,
    /// Consecutive failures per cluster name
    backoff_states: Arc<Mutex<HashMap<String, RetryBackoff>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("requeue", &self.requeue)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a reconciler requeueing healthy clusters every `requeue`
    pub fn new(
        store: Arc<dyn ClusterStore>,
        cluster_api: Api<Cluster>,
        metrics: Arc<Metrics>,
        requeue: Duration,
    ) -> Self {
        Self {
            store,
            cluster_api,
            metrics,
            requeue,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Interval between reconciliations of a healthy cluster
    pub fn requeue_interval(&self) -> Duration {
        self.requeue
    }

    /// Reconcile the registry trust of one cluster.
    ///
    /// Stale registry references are pruned from the spec, and an update
    /// step is recorded in status when the desired registry set changed.
    pub async fn reconcile_cluster(&self, cluster: &Cluster) -> Result<(), ControllerError> {
        let name = cluster.name_any();
        info!("Reconciling Cluster {}", name);

        let status = cluster.status.clone().unwrap_or_default();
        let plan = match plan_registry_update(&name, &cluster.spec, &status.registries, self.store.as_ref()).await {
            Ok(plan) => plan,
            Err(e) => {
                self.record_failure(&name, &e).await;
                return Err(e);
            }
        };

        self.apply_plan(&name, &status, plan).await
    }

    async fn apply_plan(&self, name: &str, status: &ClusterStatus, plan: RegistryPlan) -> Result<(), ControllerError> {
        let pp = PatchParams::default();

        if let Some(valid_refs) = &plan.pruned_refs {
            info!(
                "Pruning stale registry references of Cluster {} ({} remain)",
                name,
                valid_refs.len()
            );
            let spec_patch = serde_json::json!({
                "spec": { "containerRuntime": { "registries": valid_refs } }
            });
            self.cluster_api.patch(name, &pp, &Patch::Merge(&spec_patch)).await?;
        }

        match plan.update_step {
            Some(step) => {
                info!(
                    "Registry set of Cluster {} changed, issuing step {} to {} nodes",
                    name,
                    step.id,
                    step.nodes.len()
                );
                let status_patch = serde_json::json!({
                    "status": {
                        "registries": plan.desired.registries,
                        "phase": ClusterPhase::Updating,
                        "pendingSteps": [step],
                        "lastReconciled": chrono::Utc::now(),
                        "error": null,
                    }
                });
                self.cluster_api
                    .patch_status(name, &pp, &Patch::Merge(&status_patch))
                    .await?;
                self.metrics.registry_update_issued();
            }
            None if status.phase != ClusterPhase::Running || status.error.is_some() => {
                let status_patch = serde_json::json!({
                    "status": {
                        "phase": ClusterPhase::Running,
                        "lastReconciled": chrono::Utc::now(),
                        "error": null,
                    }
                });
                self.cluster_api
                    .patch_status(name, &pp, &Patch::Merge(&status_patch))
                    .await?;
            }
            None => debug!("Registry set of Cluster {} is up to date", name),
        }

        Ok(())
    }

    /// Best effort: record the failure in status
    async fn record_failure(&self, name: &str, err: &ControllerError) {
        let status_patch = serde_json::json!({
            "status": {
                "phase": ClusterPhase::Failed,
                "error": err.to_string(),
            }
        });
        if let Err(e) = self
            .cluster_api
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&status_patch))
            .await
        {
            warn!("Failed to record failure on Cluster {}: {}", name, e);
        }
    }

    /// Next requeue delay after `error`, advancing the cluster's backoff
    pub fn get_backoff_duration(&self, cluster: &str, error: &ControllerError) -> Duration {
        let class = error.retry_class();
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states.entry(cluster.to_string()).or_default();
                let delay = state.on_failure(class);
                debug!(
                    "Cluster {} failed {} times in a row ({:?})",
                    cluster,
                    state.failures(),
                    class
                );
                delay
            }
            Err(e) => {
                error!("Failed to lock backoff states: {}, using default backoff", e);
                MIN_DELAY
            }
        }
    }

    /// Reset the backoff of a cluster after a successful reconciliation
    pub fn reset_error(&self, cluster: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(cluster);
        }
    }
}
