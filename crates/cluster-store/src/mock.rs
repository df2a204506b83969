//! Mock ClusterStore for unit testing
//!
//! Stores nodes and registries in memory. Individual registry names can be
//! made to fail with a non-not-found error to exercise abort paths.

use crate::error::StoreError;
use crate::query::NodeQuery;
use crate::store_trait::ClusterStore;
use crds::{Node, NodeSpec, RegistrySpec, LABEL_CLUSTER_NAME};
use kube::ResourceExt;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// In-memory cluster store
#[derive(Clone, Default, Debug)]
pub struct MockClusterStore {
    pub(crate) nodes: Arc<Mutex<Vec<Node>>>,
    pub(crate) registries: Arc<Mutex<HashMap<String, RegistrySpec>>>,
    pub(crate) failing_registries: Arc<Mutex<HashSet<String>>>,
    pub(crate) fail_list_nodes: Arc<Mutex<bool>>,
}

impl MockClusterStore {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node to the mock store (for test setup)
    pub fn add_node(&self, node: Node) {
        self.nodes.lock().unwrap().push(node);
    }

    /// Add a node labeled as a member of `cluster` (for test setup)
    pub fn add_cluster_node(&self, cluster: &str, name: &str, ipv4: &str) {
        let mut node = Node::new(
            name,
            NodeSpec {
                hostname: name.to_string(),
                ipv4: ipv4.to_string(),
                arch: "amd64".to_string(),
            },
        );
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_CLUSTER_NAME.to_string(), cluster.to_string());
        node.metadata.labels = Some(labels);
        self.add_node(node);
    }

    /// Add a named registry (for test setup)
    pub fn add_registry(&self, name: &str, spec: RegistrySpec) {
        self.registries.lock().unwrap().insert(name.to_string(), spec);
    }

    /// Make lookups of `name` fail with [`StoreError::Unavailable`]
    pub fn fail_registry(&self, name: &str) {
        self.failing_registries.lock().unwrap().insert(name.to_string());
    }

    /// Make `list_nodes` fail with [`StoreError::Unavailable`]
    pub fn fail_list_nodes(&self) {
        *self.fail_list_nodes.lock().unwrap() = true;
    }
}

#[async_trait::async_trait]
impl ClusterStore for MockClusterStore {
    async fn list_nodes(&self, query: &NodeQuery) -> Result<Vec<Node>, StoreError> {
        if *self.fail_list_nodes.lock().unwrap() {
            return Err(StoreError::Unavailable("node listing disabled".to_string()));
        }
        Ok(self
            .nodes
            .lock()
            .unwrap()
            .iter()
            .filter(|node| query.matches(node.labels()))
            .cloned()
            .collect())
    }

    async fn get_registry(&self, name: &str) -> Result<RegistrySpec, StoreError> {
        if self.failing_registries.lock().unwrap().contains(name) {
            return Err(StoreError::Unavailable(format!("Registry {} lookup failed", name)));
        }
        self.registries
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("Registry {} not found", name)))
    }
}
