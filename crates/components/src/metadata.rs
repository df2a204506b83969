//! Inputs to step generation

use crds::{ClusterSpec, RegistrySpec};

/// Cluster-wide settings shared by every component of one reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraMetadata {
    /// Cluster name
    pub cluster_name: String,

    /// Kubernetes version the cluster runs (may lag the spec during upgrades)
    pub kube_version: String,

    /// Install from pre-staged artifacts
    pub offline: bool,

    /// Registry images are pulled from instead of upstream
    pub local_registry: String,

    /// Mirror proxy used when online without a local registry
    pub repo_mirror: String,

    /// Kubelet root directory
    pub kubelet_data_dir: String,

    /// Container runtime type
    pub cri: String,
}

impl ExtraMetadata {
    /// Metadata derived from a cluster spec
    pub fn from_cluster(name: &str, spec: &ClusterSpec) -> Self {
        Self {
            cluster_name: name.to_string(),
            kube_version: spec.kubernetes_version.clone(),
            offline: spec.offline,
            local_registry: spec.local_registry.clone(),
            repo_mirror: String::new(),
            kubelet_data_dir: spec.kubelet.root_dir.clone(),
            cri: spec.container_runtime.runtime_type.clone(),
        }
    }

    /// Set the mirror proxy
    #[must_use]
    pub fn with_repo_mirror(mut self, mirror: impl Into<String>) -> Self {
        self.repo_mirror = mirror.into();
        self
    }
}

/// Desired state a component is initialised from
#[derive(Debug, Clone, Copy)]
pub struct DesiredState<'a> {
    /// Cluster spec
    pub cluster: &'a ClusterSpec,

    /// Resolved registry set, sorted by identity key
    pub registries: &'a [RegistrySpec],
}

impl<'a> DesiredState<'a> {
    /// Desired state from a cluster spec and its resolved registries
    pub fn new(cluster: &'a ClusterSpec, registries: &'a [RegistrySpec]) -> Self {
        Self {
            cluster,
            registries,
        }
    }
}
