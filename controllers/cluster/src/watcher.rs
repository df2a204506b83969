//! Kubernetes resource watchers.
//!
//! Watches `Cluster` resources through `kube_runtime::Controller`, which
//! handles reconnection, event deduplication and requeues.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::Cluster;
use futures::StreamExt;
use kube::{Api, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::{Controller, watcher};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Watches `Cluster` resources for changes.
#[derive(Debug)]
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    cluster_api: Api<Cluster>,
}

async fn reconcile(cluster: Arc<Cluster>, ctx: Arc<Reconciler>) -> Result<Action, ControllerError> {
    debug!("Reconciling Cluster {:?}", cluster.metadata.name);
    match ctx.reconcile_cluster(&cluster).await {
        Ok(()) => {
            ctx.metrics.reconcile_succeeded();
            ctx.reset_error(&cluster.name_any());
            Ok(Action::requeue(ctx.requeue_interval()))
        }
        Err(e) => {
            ctx.metrics.reconcile_failed();
            error!("Reconciliation failed for Cluster {}: {}", cluster.name_any(), e);
            Err(e)
        }
    }
}

fn error_policy(cluster: Arc<Cluster>, error: &ControllerError, ctx: Arc<Reconciler>) -> Action {
    let name = cluster.name_any();
    let delay = ctx.get_backoff_duration(&name, error);
    error!(
        "Reconciliation error for Cluster {}: {}, retrying in {:?}",
        name, error, delay
    );
    Action::requeue(delay)
}

impl Watcher {
    /// Creates a new watcher instance.
    pub fn new(reconciler: Arc<Reconciler>, cluster_api: Api<Cluster>) -> Self {
        Self {
            reconciler,
            cluster_api,
        }
    }

    /// Watches `Cluster` resources until the stream ends.
    pub async fn watch_clusters(&self) -> Result<(), ControllerError> {
        info!("Starting Cluster watcher");

        // Debounce batches the status patches the reconciler itself causes
        let controller_config = ControllerConfig::default()
            .debounce(Duration::from_secs(5))
            .concurrency(3);

        Controller::new(self.cluster_api.clone(), watcher::Config::default())
            .with_config(controller_config)
            .run(reconcile, error_policy, self.reconciler.clone())
            .for_each(|res| async move {
                match res {
                    Ok((obj, _)) => debug!("Reconciled Cluster {}", obj.name),
                    Err(e) => error!("Controller error for Cluster: {}", e),
                }
            })
            .await;

        Ok(())
    }
}
