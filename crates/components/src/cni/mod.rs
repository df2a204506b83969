//! CNI plugin components
//!
//! Calico is the only plugin. Its install sequence depends on the Kubernetes
//! version: from v1.28 the tigera operator is installed from its Helm chart and
//! configured through a rendered `Installation`; older clusters apply a
//! rendered manifest directly.

pub mod calico;
pub mod chart;

use crate::component_registry::RunnableRole;
use crate::error::ComponentError;
use crate::runnable::{custom_command, custom_step, shell_step};
use crate::version::Version;
use crds::{Cni, IpFamily, Networking, Step, StepAction, StepNode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// First Kubernetes version installing Calico through its chart
pub const CHART_KUBE_VERSION: Version = Version::new(1, 28, 0);

/// Namespace of the tigera operator release
pub const OPERATOR_NAMESPACE: &str = "tigera-operator";

const RENDER_TIMEOUT: Duration = Duration::from_secs(30);
const APPLY_TIMEOUT: Duration = Duration::from_secs(60);
const RELEASE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Whether `kube_version` installs CNI plugins from charts
pub fn is_high_kube_version(kube_version: &str) -> bool {
    Version::parse(kube_version).is_some_and(|v| v >= CHART_KUBE_VERSION)
}

/// Settings shared by every CNI plugin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CniBase {
    /// Plugin type
    pub cni_type: String,
    /// Plugin version
    pub version: String,
    /// Deployment namespace
    pub namespace: String,
    /// Install from pre-staged images
    #[serde(default)]
    pub offline: bool,
    /// Registry images are pulled from
    #[serde(default)]
    pub local_registry: String,
    /// Container runtime type of the cluster
    #[serde(default)]
    pub cri: String,
    /// IPv4 and IPv6 pod networking
    #[serde(default)]
    pub dual_stack: bool,
    /// IPv4 pod CIDR
    pub pod_ipv4_cidr: String,
    /// IPv6 pod CIDR (dual stack only)
    #[serde(default)]
    pub pod_ipv6_cidr: String,
}

impl CniBase {
    /// Base settings from the cluster CNI and networking sections
    pub fn new(cni: &Cni, networking: &Networking, cri: &str) -> Result<Self, ComponentError> {
        let dual_stack = networking.ip_family == IpFamily::DualStack;
        let blocks = &networking.pods.cidr_blocks;
        let pod_ipv4_cidr = blocks
            .first()
            .cloned()
            .ok_or_else(|| ComponentError::invalid_spec(&cni.cni_type, "no pod CIDR configured"))?;
        let pod_ipv6_cidr = if dual_stack {
            blocks.get(1).cloned().ok_or_else(|| {
                ComponentError::invalid_spec(&cni.cni_type, "dual stack requires an IPv6 pod CIDR")
            })?
        } else {
            String::new()
        };
        Ok(Self {
            cni_type: cni.cni_type.clone(),
            version: cni.version.clone(),
            namespace: cni.namespace.clone(),
            offline: cni.offline,
            local_registry: cni.local_registry.clone(),
            cri: cri.to_string(),
            dual_stack,
            pod_ipv4_cidr,
            pod_ipv6_cidr,
        })
    }

    /// Images are side-loaded onto the nodes
    pub fn loads_images(&self) -> bool {
        self.offline && self.local_registry.is_empty()
    }
}

/// Node address autodetection method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeAddressDetection {
    /// Method name (`first-found`, `interface`, `can-reach`, ...)
    #[serde(rename = "type")]
    pub detection_type: String,
    /// Method argument, empty for argument-less methods
    #[serde(default)]
    pub value: String,
}

impl Default for NodeAddressDetection {
    fn default() -> Self {
        Self {
            detection_type: Self::FIRST_FOUND.to_string(),
            value: String::new(),
        }
    }
}

impl NodeAddressDetection {
    /// Use the first valid address
    pub const FIRST_FOUND: &'static str = "first-found";
    /// Use the address of the interface reaching a destination
    pub const CAN_REACH: &'static str = "can-reach";
    /// Use the first interface matching a regex
    pub const INTERFACE: &'static str = "interface";
    /// Use the first interface not matching a regex
    pub const SKIP_INTERFACE: &'static str = "skip-interface";
    /// Use an address within a CIDR
    pub const CIDR: &'static str = "cidr";
    /// Use the node's Kubernetes InternalIP
    pub const KUBERNETES_INTERNAL_IP: &'static str = "kubernetes-internal-ip";

    /// Parse `first-found`, `interface=eth.*`, `can-reach=8.8.8.8`, ...
    ///
    /// Empty and unrecognised methods fall back to `first-found`.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        let (method, value) = match input.split_once('=') {
            Some((method, value)) => (method.trim(), value.trim()),
            None => (input, ""),
        };
        match method {
            Self::FIRST_FOUND | Self::KUBERNETES_INTERNAL_IP => Self {
                detection_type: method.to_string(),
                value: String::new(),
            },
            Self::CAN_REACH | Self::INTERFACE | Self::SKIP_INTERFACE | Self::CIDR if !value.is_empty() => Self {
                detection_type: method.to_string(),
                value: value.to_string(),
            },
            _ => {
                if !input.is_empty() {
                    debug!("Unrecognised address detection {:?}, using first-found", input);
                }
                Self::default()
            }
        }
    }

    /// `IP_AUTODETECTION_METHOD` form used by calico-node
    pub fn method(&self) -> String {
        if self.value.is_empty() {
            self.detection_type.clone()
        } else {
            format!("{}={}", self.detection_type, self.value)
        }
    }

    /// Single-line YAML mapping used by the operator `Installation`
    pub fn operator_yaml(&self) -> String {
        let quoted = serde_json::Value::String(self.value.clone()).to_string();
        match self.detection_type.as_str() {
            Self::CAN_REACH => format!("canReach: {quoted}"),
            Self::INTERFACE => format!("interface: {quoted}"),
            Self::SKIP_INTERFACE => format!("skipInterface: {quoted}"),
            Self::CIDR => format!("cidrs: [{quoted}]"),
            Self::KUBERNETES_INTERNAL_IP => "kubernetes: NodeInternalIP".to_string(),
            _ => "firstFound: true".to_string(),
        }
    }
}

/// Calico network mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalicoMode {
    /// IP-in-IP for all traffic
    IpipAll,
    /// IP-in-IP across subnets only
    IpipCrossSubnet,
    /// VXLAN for all traffic
    VxlanAll,
    /// VXLAN across subnets only
    VxlanCrossSubnet,
    /// Unencapsulated BGP
    Bgp,
}

impl CalicoMode {
    /// Parse the cluster `mode` field; unknown modes are an error
    pub fn parse(mode: &str) -> Result<Self, ComponentError> {
        match mode {
            "Overlay-IPIP-All" => Ok(CalicoMode::IpipAll),
            "Overlay-IPIP-Cross-Subnet" => Ok(CalicoMode::IpipCrossSubnet),
            "Overlay-Vxlan-All" => Ok(CalicoMode::VxlanAll),
            "Overlay-Vxlan-Cross-Subnet" => Ok(CalicoMode::VxlanCrossSubnet),
            "BGP" => Ok(CalicoMode::Bgp),
            other => Err(ComponentError::invalid_spec("calico", format!("unknown mode {other:?}"))),
        }
    }

    /// `CALICO_IPV4POOL_IPIP`
    pub fn ipip_mode(self) -> &'static str {
        match self {
            CalicoMode::IpipAll => "Always",
            CalicoMode::IpipCrossSubnet => "CrossSubnet",
            _ => "Never",
        }
    }

    /// `CALICO_IPV4POOL_VXLAN`
    pub fn vxlan_mode(self) -> &'static str {
        match self {
            CalicoMode::VxlanAll => "Always",
            CalicoMode::VxlanCrossSubnet => "CrossSubnet",
            _ => "Never",
        }
    }

    /// `calico_backend`; VXLAN-only pools run without BIRD
    pub fn backend(self) -> &'static str {
        match self {
            CalicoMode::VxlanAll | CalicoMode::VxlanCrossSubnet => "vxlan",
            _ => "bird",
        }
    }

    /// Operator IPv4 pool encapsulation
    pub fn encapsulation(self) -> &'static str {
        match self {
            CalicoMode::IpipAll => "IPIP",
            CalicoMode::IpipCrossSubnet => "IPIPCrossSubnet",
            CalicoMode::VxlanAll => "VXLAN",
            CalicoMode::VxlanCrossSubnet => "VXLANCrossSubnet",
            CalicoMode::Bgp => "None",
        }
    }

    /// Operator IPv6 pool encapsulation (IP-in-IP is IPv4 only)
    pub fn encapsulation_v6(self) -> &'static str {
        match self {
            CalicoMode::VxlanAll => "VXLAN",
            CalicoMode::VxlanCrossSubnet => "VXLANCrossSubnet",
            _ => "None",
        }
    }

    /// Tunnel interfaces this mode creates on a node
    pub fn tunnel_interfaces(self, dual_stack: bool) -> Vec<&'static str> {
        match self {
            CalicoMode::IpipAll | CalicoMode::IpipCrossSubnet => vec!["tunl0"],
            CalicoMode::VxlanAll | CalicoMode::VxlanCrossSubnet if dual_stack => {
                vec!["vxlan.calico", "vxlan-v6.calico"]
            }
            CalicoMode::VxlanAll | CalicoMode::VxlanCrossSubnet => vec!["vxlan.calico"],
            CalicoMode::Bgp => Vec::new(),
        }
    }
}

/// Step running a component's template role on the nodes
pub fn render_step(kind: &str, payload: Vec<u8>, nodes: &[StepNode]) -> Step {
    custom_step(
        &format!("render{}Manifest", capitalize(kind)),
        StepAction::Install,
        RENDER_TIMEOUT,
        nodes,
        custom_command(kind, RunnableRole::Template, payload),
    )
}

/// Step applying a rendered manifest
pub fn apply_step(manifest: &Path, nodes: &[StepNode]) -> Step {
    let manifest = manifest.to_string_lossy().into_owned();
    shell_step(
        "applyCniManifest",
        StepAction::Install,
        APPLY_TIMEOUT,
        nodes,
        ["kubectl", "apply", "-f", manifest.as_str()],
    )
}

/// Step installing or upgrading the tigera operator release from a local chart
pub fn operator_release_step(chart: &Path, nodes: &[StepNode]) -> Step {
    let chart = chart.to_string_lossy().into_owned();
    shell_step(
        "installCalicoRelease",
        StepAction::Install,
        RELEASE_TIMEOUT,
        nodes,
        [
            "helm",
            "upgrade",
            "--install",
            "calico",
            chart.as_str(),
            "--namespace",
            OPERATOR_NAMESPACE,
            "--create-namespace",
            "--set",
            "installation.enabled=false",
            "--wait",
        ],
    )
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::NetworkRanges;

    #[test]
    fn test_high_kube_version() {
        assert!(is_high_kube_version("v1.28.0"));
        assert!(is_high_kube_version("1.30.2"));
        assert!(!is_high_kube_version("v1.27.9"));
        assert!(!is_high_kube_version(""));
    }

    #[test]
    fn test_detection_parsing() {
        let cases = [
            ("first-found", "first-found", ""),
            ("", "first-found", ""),
            ("interface=eth.*", "interface", "eth.*"),
            ("skip-interface=docker0", "skip-interface", "docker0"),
            ("can-reach=8.8.8.8", "can-reach", "8.8.8.8"),
            ("cidr=10.0.0.0/8", "cidr", "10.0.0.0/8"),
            ("kubernetes-internal-ip", "kubernetes-internal-ip", ""),
            ("interface=", "first-found", ""),
            ("bogus=1", "first-found", ""),
        ];
        for (input, detection_type, value) in cases {
            let parsed = NodeAddressDetection::parse(input);
            assert_eq!(parsed.detection_type, detection_type, "{input}");
            assert_eq!(parsed.value, value, "{input}");
        }
        assert_eq!(NodeAddressDetection::parse("interface=eth0").method(), "interface=eth0");
        assert_eq!(NodeAddressDetection::parse("cidr=10.0.0.0/8").operator_yaml(), "cidrs: [\"10.0.0.0/8\"]");
        assert_eq!(NodeAddressDetection::default().operator_yaml(), "firstFound: true");
    }

    #[test]
    fn test_mode_mapping() {
        let vxlan = CalicoMode::parse("Overlay-Vxlan-All").unwrap();
        assert_eq!((vxlan.ipip_mode(), vxlan.vxlan_mode(), vxlan.backend()), ("Never", "Always", "vxlan"));
        assert_eq!(vxlan.tunnel_interfaces(true), vec!["vxlan.calico", "vxlan-v6.calico"]);

        let ipip = CalicoMode::parse("Overlay-IPIP-Cross-Subnet").unwrap();
        assert_eq!(ipip.ipip_mode(), "CrossSubnet");
        assert_eq!(ipip.encapsulation_v6(), "None");
        assert_eq!(ipip.tunnel_interfaces(false), vec!["tunl0"]);

        assert!(CalicoMode::parse("BGP").unwrap().tunnel_interfaces(false).is_empty());
        assert!(CalicoMode::parse("Overlay").is_err());
    }

    #[test]
    fn test_base_requires_v6_cidr_for_dual_stack() {
        let cni = Cni {
            cni_type: "calico".to_string(),
            version: "v3.26.1".to_string(),
            ..Default::default()
        };
        let mut networking = Networking {
            ip_family: IpFamily::DualStack,
            ..Default::default()
        };
        assert!(CniBase::new(&cni, &networking, "containerd").is_err());

        networking.pods = NetworkRanges {
            cidr_blocks: vec!["172.25.0.0/16".to_string(), "fd00::/108".to_string()],
        };
        let base = CniBase::new(&cni, &networking, "containerd").unwrap();
        assert!(base.dual_stack);
        assert_eq!(base.pod_ipv6_cidr, "fd00::/108");
    }

    #[test]
    fn test_operator_release_step() {
        let step = operator_release_step(Path::new("/tmp/.nodesmith/.calico/v3.26.1/charts.tgz"), &[]);
        let args = &step.commands[0].shell_command;
        assert_eq!(&args[..3], ["helm", "upgrade", "--install"]);
        assert!(args.contains(&"installation.enabled=false".to_string()));
        assert_eq!(render_step("calico", vec![1], &[]).name, "renderCalicoManifest");
    }
}
