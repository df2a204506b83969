//! Cluster CRD
//!
//! Declarative description of a Kubernetes cluster: the container runtime and
//! its registry trust, the CNI plugin, pod networking and attached addons.

use crate::registry::{CriRegistry, RegistrySpec};
use crate::step::Step;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "nodesmith.io",
    version = "v1",
    kind = "Cluster",
    status = "ClusterStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Kubernetes version (e.g. "v1.28.4")
    pub kubernetes_version: String,

    /// Container runtime configuration
    pub container_runtime: ContainerRuntime,

    /// CNI plugin configuration
    pub cni: Cni,

    /// Pod and service networking
    #[serde(default)]
    pub networking: Networking,

    /// Addons attached to the cluster
    #[serde(default)]
    pub addons: Vec<Addon>,

    /// Kubelet settings
    #[serde(default)]
    pub kubelet: Kubelet,

    /// Local registry used instead of upstream registries
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub local_registry: String,

    /// Install from pre-staged artifacts instead of downloading
    #[serde(default)]
    pub offline: bool,
}

/// Container runtime settings
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRuntime {
    /// Runtime type, only "containerd" is supported
    #[serde(rename = "type", default = "default_runtime_type")]
    pub runtime_type: String,

    /// Runtime version (e.g. "1.7.13")
    pub version: String,

    /// Runtime data root directory
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data_root_dir: String,

    /// Hosts trusted over plain http and unverified https
    #[serde(default)]
    pub insecure_registry: Vec<String>,

    /// Explicit registries (literal hosts or references to Registry resources)
    #[serde(default)]
    pub registries: Vec<CriRegistry>,
}

fn default_runtime_type() -> String {
    "containerd".to_string()
}

/// CNI plugin settings
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cni {
    /// Plugin type (e.g. "calico")
    #[serde(rename = "type")]
    pub cni_type: String,

    /// Plugin version (e.g. "v3.26.1")
    pub version: String,

    /// Namespace the plugin is deployed into
    #[serde(default = "default_cni_namespace")]
    pub namespace: String,

    /// Install from pre-staged images
    #[serde(default)]
    pub offline: bool,

    /// Registry the plugin images are pulled from
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub local_registry: String,

    /// Calico specific settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calico: Option<Calico>,
}

fn default_cni_namespace() -> String {
    "kube-system".to_string()
}

/// Calico settings
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Calico {
    /// IPv4 node address autodetection method (e.g. "first-found", "interface=eth.*")
    #[serde(default, rename = "IPv4AutoDetection")]
    pub ipv4_auto_detection: String,

    /// IPv6 node address autodetection method
    #[serde(default, rename = "IPv6AutoDetection")]
    pub ipv6_auto_detection: String,

    /// Network mode (e.g. "Overlay-Vxlan-All", "BGP")
    pub mode: String,

    /// Use Calico IPAM
    #[serde(default, rename = "IPManger")]
    pub ip_manger: bool,

    /// Interface MTU
    #[serde(default = "default_mtu")]
    pub mtu: u32,
}

fn default_mtu() -> u32 {
    1440
}

/// IP family of the cluster
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub enum IpFamily {
    /// IPv4 only
    #[default]
    IPv4,

    /// IPv4 and IPv6
    DualStack,
}

/// Pod and service networking
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Networking {
    /// IP family
    #[serde(default)]
    pub ip_family: IpFamily,

    /// Pod CIDR blocks, IPv4 first
    pub pods: NetworkRanges,

    /// Service CIDR blocks, IPv4 first
    pub services: NetworkRanges,
}

impl Default for Networking {
    fn default() -> Self {
        Self {
            ip_family: IpFamily::IPv4,
            pods: NetworkRanges {
                cidr_blocks: vec!["172.25.0.0/16".to_string()],
            },
            services: NetworkRanges {
                cidr_blocks: vec!["10.96.0.0/16".to_string()],
            },
        }
    }
}

/// A list of CIDR blocks
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRanges {
    /// CIDR blocks
    #[serde(default)]
    pub cidr_blocks: Vec<String>,
}

/// Kubelet settings
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Kubelet {
    /// Kubelet root directory (defaults to /var/lib/kubelet)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub root_dir: String,
}

/// An addon attached to the cluster.
///
/// The configuration is opaque to the provisioning core; only the optional
/// `imageRepoMirror` field is interpreted.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Addon {
    /// Addon name
    pub name: String,

    /// Addon version
    #[serde(default)]
    pub version: String,

    /// Opaque addon configuration
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Lifecycle phase of a cluster
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ClusterPhase {
    /// Not reconciled yet
    #[default]
    Pending,

    /// Steps were issued and await execution
    Updating,

    /// Observed state matches desired state
    Running,

    /// Reconciliation failed
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Registry set last applied to the nodes, sorted by identity key
    #[serde(default)]
    pub registries: Vec<RegistrySpec>,

    /// Current phase
    #[serde(default)]
    pub phase: ClusterPhase,

    /// Steps issued by the last reconciliation, waiting for the executor
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_steps: Vec<Step>,

    /// Last reconciliation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconciled: Option<chrono::DateTime<chrono::Utc>>,

    /// Error message if reconciliation failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
