//! Cluster store client
//!
//! Read access to the objects the provisioning core needs from the cluster
//! store: the nodes labeled as members of a cluster and named `Registry`
//! resources.
//!
//! # Example
//!
//! ```no_run
//! use cluster_store::{ClusterStore, KubeClusterStore, NodeQuery};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let store = KubeClusterStore::new(client);
//!
//! let nodes = store.list_nodes(&NodeQuery::for_cluster("prod")).await?;
//! let registry = store.get_registry("harbor").await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod query;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeClusterStore;
pub use error::StoreError;
pub use query::NodeQuery;
pub use store_trait::ClusterStore;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockClusterStore;
