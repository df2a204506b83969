//! Kubernetes-backed cluster store
//!
//! Reads `Node` and `Registry` resources through the Kubernetes API.

use crate::error::StoreError;
use crate::query::NodeQuery;
use crate::store_trait::ClusterStore;
use crds::{Node, Registry, RegistrySpec};
use kube::api::ListParams;
use kube::{Api, Client};
use tracing::debug;

/// Cluster store backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeClusterStore {
    nodes: Api<Node>,
    registries: Api<Registry>,
}

impl std::fmt::Debug for KubeClusterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterStore").finish_non_exhaustive()
    }
}

impl KubeClusterStore {
    /// Create a store from a Kubernetes client
    pub fn new(client: Client) -> Self {
        Self {
            nodes: Api::all(client.clone()),
            registries: Api::all(client),
        }
    }
}

#[async_trait::async_trait]
impl ClusterStore for KubeClusterStore {
    async fn list_nodes(&self, query: &NodeQuery) -> Result<Vec<Node>, StoreError> {
        let selector = query.label_selector();
        debug!("Listing nodes with selector '{}'", selector);
        let params = ListParams::default().labels(&selector);
        let list = self.nodes.list(&params).await?;
        Ok(list.items)
    }

    async fn get_registry(&self, name: &str) -> Result<RegistrySpec, StoreError> {
        debug!("Getting registry {}", name);
        match self.registries.get_opt(name).await? {
            Some(registry) => Ok(registry.spec),
            None => Err(StoreError::NotFound(format!("Registry {} not found", name))),
        }
    }
}
