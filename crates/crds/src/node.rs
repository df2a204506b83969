//! Node CRD
//!
//! A machine managed by nodesmith. Cluster membership is expressed with the
//! [`LABEL_CLUSTER_NAME`] label.

use crate::step::StepNode;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Label carrying the name of the cluster a node belongs to
pub const LABEL_CLUSTER_NAME: &str = "nodesmith.io/cluster-name";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "nodesmith.io",
    version = "v1",
    kind = "Node",
    status = "NodeStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    /// Hostname reported by the node agent
    pub hostname: String,

    /// Primary IPv4 address
    pub ipv4: String,

    /// CPU architecture (e.g. "amd64", "arm64")
    #[serde(default = "default_arch")]
    pub arch: String,
}

fn default_arch() -> String {
    "amd64".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    /// Whether the node agent is reachable
    #[serde(default)]
    pub ready: bool,

    /// Last heartbeat timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<chrono::DateTime<chrono::Utc>>,
}

impl Node {
    /// Step target for this node
    pub fn to_step_node(&self) -> StepNode {
        StepNode {
            id: self.name_any(),
            ipv4: self.spec.ipv4.clone(),
            hostname: self.spec.hostname.clone(),
        }
    }

    /// Name of the cluster this node is labeled with, if any
    pub fn cluster_name(&self) -> Option<&str> {
        self.labels().get(LABEL_CLUSTER_NAME).map(String::as_str)
    }
}
