//! ClusterStore trait for mocking
//!
//! This trait abstracts the cluster store so reconcilers can be unit tested
//! without a running API server. The kube-backed [`crate::KubeClusterStore`]
//! implements it, and tests use [`crate::MockClusterStore`].

use crate::error::StoreError;
use crate::query::NodeQuery;
use crds::{Node, RegistrySpec};

/// Trait for cluster store read operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterStore: Send + Sync {
    /// List nodes matching a query
    async fn list_nodes(&self, query: &NodeQuery) -> Result<Vec<Node>, StoreError>;

    /// Resolve a named registry.
    ///
    /// Returns [`StoreError::NotFound`] (or a 404 API error) when the registry
    /// does not exist.
    async fn get_registry(&self, name: &str) -> Result<RegistrySpec, StoreError>;
}
