//! Registry reconciliation for `Cluster` resources.
//!
//! Builds the registry set a cluster's container runtime should trust from
//! its insecure hosts, addon image mirrors and explicit registry entries, and
//! issues a trust store update step to the cluster's nodes when that set
//! differs from the one last recorded in status.

use crate::error::ControllerError;
use cluster_store::{ClusterStore, NodeQuery};
use components::cri::ContainerdRegistryConfigure;
use components::registries::insecure_hosts;
use components::{DesiredState, ExtraMetadata, RegistrySet, Runnable, needs_update};
use crds::{ClusterSpec, CriRegistry, RegistrySpec, Step, StepAction, StepNode};
use tracing::{debug, warn};

/// Registry set computed for a cluster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredRegistries {
    /// Merged registries, unique and sorted by identity key
    pub registries: Vec<RegistrySpec>,

    /// Explicit registry entries that still resolve
    pub valid_refs: Vec<CriRegistry>,
}

/// Compute the registry set of a cluster.
///
/// Entries referencing a `Registry` that no longer exists are left out of
/// `valid_refs`; any other lookup failure aborts. The cluster is not
/// modified, persisting `valid_refs` is up to the caller.
pub async fn compute_desired_registries(
    cluster: &ClusterSpec,
    store: &dyn ClusterStore,
) -> Result<DesiredRegistries, ControllerError> {
    let mut set = RegistrySet::new();
    for host in insecure_hosts(cluster) {
        set.insert_insecure_host(&host);
    }

    let explicit = &cluster.container_runtime.registries;
    let mut valid_refs = Vec::with_capacity(explicit.len());
    for entry in explicit {
        let Some(name) = entry.reference() else {
            set.insert_insecure_host(&entry.insecure_registry);
            valid_refs.push(CriRegistry {
                insecure_registry: entry.insecure_registry.clone(),
                registry_ref: None,
            });
            continue;
        };

        match store.get_registry(name).await {
            Ok(spec) => {
                set.insert(spec);
                valid_refs.push(entry.clone());
            }
            Err(e) if e.is_not_found() => {
                warn!("Registry {} no longer exists, dropping reference: {}", name, e);
            }
            Err(source) => {
                return Err(ControllerError::Registry {
                    name: name.to_string(),
                    source,
                });
            }
        }
    }

    debug!("Desired registry set has {} entries", set.len());
    Ok(DesiredRegistries {
        registries: set.into_vec(),
        valid_refs,
    })
}

/// Trust store update step for `desired`, targeting `nodes`
pub fn registry_update_step(
    metadata: &ExtraMetadata,
    cluster: &ClusterSpec,
    desired: &[RegistrySpec],
    nodes: &[StepNode],
) -> Result<Step, ControllerError> {
    let runnable = ContainerdRegistryConfigure::default().init_step(
        metadata,
        &DesiredState::new(cluster, desired),
        nodes,
    )?;
    runnable
        .action_steps(StepAction::Install)
        .first()
        .cloned()
        .ok_or_else(|| ControllerError::InvalidConfig("registry update produced no step".to_string()))
}

/// Outcome of planning a cluster's registry reconciliation
#[derive(Debug, Clone, Default)]
pub struct RegistryPlan {
    /// Desired registries and validated explicit entries
    pub desired: DesiredRegistries,

    /// Explicit entries to persist when stale references were dropped
    pub pruned_refs: Option<Vec<CriRegistry>>,

    /// Update step when the desired set differs from the recorded one
    pub update_step: Option<Step>,
}

/// Plan the registry reconciliation of cluster `name`.
///
/// Nodes are only listed when an update step is needed; a listing failure is
/// returned.
pub async fn plan_registry_update(
    name: &str,
    cluster: &ClusterSpec,
    recorded: &[RegistrySpec],
    store: &dyn ClusterStore,
) -> Result<RegistryPlan, ControllerError> {
    let desired = compute_desired_registries(cluster, store).await?;

    let pruned_refs = (desired.valid_refs != cluster.container_runtime.registries)
        .then(|| desired.valid_refs.clone());

    let update_step = if needs_update(recorded, &desired.registries) {
        let nodes = store
            .list_nodes(&NodeQuery::for_cluster(name))
            .await
            .map_err(|source| ControllerError::ListNodes {
                cluster: name.to_string(),
                source,
            })?;
        let nodes: Vec<StepNode> = nodes.iter().map(crds::Node::to_step_node).collect();
        let metadata = ExtraMetadata::from_cluster(name, cluster);
        Some(registry_update_step(&metadata, cluster, &desired.registries, &nodes)?)
    } else {
        None
    };

    Ok(RegistryPlan {
        desired,
        pruned_refs,
        update_step,
    })
}
