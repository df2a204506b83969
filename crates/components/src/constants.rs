//! Node filesystem layout and well-known names

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Registration schema version of every built-in component
pub const COMPONENT_VERSION: &str = "v1";

/// containerd systemd unit
pub const CONTAINERD_UNIT: &str = "containerd.service";

/// containerd namespace used by the kubelet
pub const K8S_NAMESPACE: &str = "k8s.io";

/// Default containerd socket
pub const CONTAINERD_SOCKET: &str = "/run/containerd/containerd.sock";

/// Default kubelet root directory
pub const DEFAULT_KUBELET_DIR: &str = "/var/lib/kubelet";

/// Kubernetes admin kubeconfig written by kubeadm
pub const ADMIN_KUBECONFIG: &str = "/etc/kubernetes/admin.conf";

/// How long teardown waits for a killed task to exit
pub const TASK_EXIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between task status polls while waiting for an exit
pub const TASK_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Paths a component touches on a node.
///
/// Every path is configurable so node-side code can be exercised against a
/// temporary directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePaths {
    /// containerd configuration directory (holds `config.toml`)
    pub containerd_config_dir: PathBuf,

    /// containerd trust store root (one subdirectory per registry host)
    pub registry_config_dir: PathBuf,

    /// containerd data root
    pub containerd_data_dir: PathBuf,

    /// containerd runtime state directory
    pub containerd_run_dir: PathBuf,

    /// Directory rendered CNI manifests are written to
    pub manifest_dir: PathBuf,

    /// Cache directory for downloaded artifacts (configs, charts, images)
    pub artifact_cache_dir: PathBuf,

    /// Root that config archives are unpacked into
    pub install_root: PathBuf,
}

impl Default for NodePaths {
    fn default() -> Self {
        Self {
            containerd_config_dir: PathBuf::from("/etc/containerd"),
            registry_config_dir: PathBuf::from("/etc/containerd/certs.d"),
            containerd_data_dir: PathBuf::from("/var/lib/containerd"),
            containerd_run_dir: PathBuf::from("/run/containerd"),
            manifest_dir: PathBuf::from("/tmp/.nodesmith/manifests"),
            artifact_cache_dir: PathBuf::from("/tmp/.nodesmith"),
            install_root: PathBuf::from("/"),
        }
    }
}

impl NodePaths {
    /// Layout rooted under `root` (tests and dry runs)
    pub fn rooted(root: &std::path::Path) -> Self {
        let defaults = Self::default();
        let reroot = |p: &PathBuf| root.join(p.strip_prefix("/").unwrap_or(p.as_path()));
        Self {
            containerd_config_dir: reroot(&defaults.containerd_config_dir),
            registry_config_dir: reroot(&defaults.registry_config_dir),
            containerd_data_dir: reroot(&defaults.containerd_data_dir),
            containerd_run_dir: reroot(&defaults.containerd_run_dir),
            manifest_dir: reroot(&defaults.manifest_dir),
            artifact_cache_dir: reroot(&defaults.artifact_cache_dir),
            install_root: root.to_path_buf(),
        }
    }

    /// containerd main configuration file
    pub fn containerd_config_file(&self) -> PathBuf {
        self.containerd_config_dir.join("config.toml")
    }

    /// Cache directory of one component version
    pub fn artifact_dir(&self, kind: &str, version: &str) -> PathBuf {
        self.artifact_cache_dir.join(format!(".{kind}")).join(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_rooted_layout() {
        let paths = NodePaths::rooted(Path::new("/tmp/node"));
        assert_eq!(paths.registry_config_dir, PathBuf::from("/tmp/node/etc/containerd/certs.d"));
        assert_eq!(
            paths.containerd_config_file(),
            PathBuf::from("/tmp/node/etc/containerd/config.toml")
        );
        assert_eq!(
            paths.artifact_dir("calico", "v3.26.1"),
            PathBuf::from("/tmp/node/tmp/.nodesmith/.calico/v3.26.1")
        );
    }
}
