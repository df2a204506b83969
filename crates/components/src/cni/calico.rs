//! Calico CNI plugin
//!
//! Manifests are rendered on a node from embedded templates, one per
//! supported Calico release. A release template extends its generation
//! (flexvolume driver up to v3.24, CSI node driver from v3.26) and pins the
//! `crd.projectcalico.org` definitions, disruption budget and init
//! containers that release ships with.

use crate::cni::chart::ChartRunnable;
use crate::cni::{
    CalicoMode, CniBase, NodeAddressDetection, apply_step, is_high_kube_version,
    operator_release_step, render_step,
};
use crate::component_registry::RunnableRole;
use crate::constants::{DEFAULT_KUBELET_DIR, NodePaths};
use crate::error::ComponentError;
use crate::fsutil::{remove_file_if_exists, write_atomic};
use crate::image::ImageLoader;
use crate::metadata::{DesiredState, ExtraMetadata};
use crate::node::{InstallOptions, NodeContext};
use crate::runnable::{ActionSteps, Runnable, custom_command, custom_step};
use crds::{Step, StepAction, StepNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tera::{Context, Tera};
use tracing::{debug, info, warn};

/// Component kind
pub const KIND: &str = "calico";

/// Rendered manifest file name
pub const MANIFEST_FILE: &str = "calico.yaml";

/// Registry images are pulled from without a local registry
pub const UPSTREAM_REGISTRY: &str = "docker.io";

const CLEAN_TIMEOUT: Duration = Duration::from_secs(120);

const INSTALLATION: &str = "calico/installation.yaml";

/// Shared layers the release templates extend or import
const LAYERS: &[(&str, &str)] = &[
    ("calico/base.yaml", include_str!("../../templates/calico/base.yaml")),
    ("calico/macros.yaml", include_str!("../../templates/calico/macros.yaml")),
    ("calico/flexvol.yaml", include_str!("../../templates/calico/flexvol.yaml")),
    ("calico/csi.yaml", include_str!("../../templates/calico/csi.yaml")),
    (INSTALLATION, include_str!("../../templates/calico/installation.yaml")),
];

/// Supported releases and their manifest template
const VERSIONS: &[(&str, &str)] = &[
    ("v3.11.2", include_str!("../../templates/calico/v3.11.2.yaml")),
    ("v3.16.10", include_str!("../../templates/calico/v3.16.10.yaml")),
    ("v3.21.2", include_str!("../../templates/calico/v3.21.2.yaml")),
    ("v3.22.4", include_str!("../../templates/calico/v3.22.4.yaml")),
    ("v3.24.5", include_str!("../../templates/calico/v3.24.5.yaml")),
    ("v3.26.1", include_str!("../../templates/calico/v3.26.1.yaml")),
];

/// Supported Calico releases
pub fn supported_versions() -> impl Iterator<Item = &'static str> {
    VERSIONS.iter().map(|(version, _)| *version)
}

fn manifest_template(version: &str) -> Result<&'static str, ComponentError> {
    VERSIONS
        .iter()
        .find(|(v, _)| *v == version)
        .map(|(_, template)| *template)
        .ok_or_else(|| ComponentError::UnsupportedVersion {
            kind: KIND.to_string(),
            version: version.to_string(),
        })
}

/// Calico plugin
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalicoRunnable {
    /// Settings shared with other plugins
    #[serde(flatten)]
    pub base: CniBase,

    /// Network mode (e.g. "Overlay-Vxlan-All")
    pub mode: String,

    /// Interface MTU
    pub mtu: u32,

    /// Use Calico IPAM instead of host-local
    #[serde(default)]
    pub ip_manger: bool,

    /// IPv4 address autodetection
    #[serde(default)]
    pub node_address_detection_v4: NodeAddressDetection,

    /// IPv6 address autodetection
    #[serde(default)]
    pub node_address_detection_v6: NodeAddressDetection,

    /// Kubelet root directory; the default is used when empty
    #[serde(default)]
    pub kubelet_data_dir: String,

    /// Render the operator `Installation` instead of the full manifest
    #[serde(default)]
    pub use_chart: bool,

    #[serde(skip)]
    steps: ActionSteps,
}

impl CalicoRunnable {
    /// Plugin bound to a cluster spec
    pub fn from_desired(metadata: &ExtraMetadata, desired: &DesiredState<'_>) -> Result<Self, ComponentError> {
        let cluster = desired.cluster;
        let calico = cluster
            .cni
            .calico
            .as_ref()
            .ok_or_else(|| ComponentError::invalid_spec(KIND, "calico settings are required"))?;
        manifest_template(&cluster.cni.version)?;
        CalicoMode::parse(&calico.mode)?;

        Ok(Self {
            base: CniBase::new(&cluster.cni, &cluster.networking, &metadata.cri)?,
            mode: calico.mode.clone(),
            mtu: calico.mtu,
            ip_manger: calico.ip_manger,
            node_address_detection_v4: NodeAddressDetection::parse(&calico.ipv4_auto_detection),
            node_address_detection_v6: NodeAddressDetection::parse(&calico.ipv6_auto_detection),
            kubelet_data_dir: metadata.kubelet_data_dir.clone(),
            use_chart: is_high_kube_version(&metadata.kube_version),
            steps: ActionSteps::default(),
        })
    }

    fn kubelet_dir(&self) -> &str {
        if self.kubelet_data_dir.is_empty() {
            DEFAULT_KUBELET_DIR
        } else {
            &self.kubelet_data_dir
        }
    }

    fn image_registry(&self) -> &str {
        if self.base.local_registry.is_empty() {
            UPSTREAM_REGISTRY
        } else {
            &self.base.local_registry
        }
    }

    fn chart(&self) -> ChartRunnable {
        ChartRunnable::new(KIND, &self.base.version, self.base.offline)
    }

    fn images(&self) -> ImageLoader {
        ImageLoader::new(KIND, &self.base.version, self.base.offline)
    }

    /// Rendered manifest location on a node with layout `paths`
    pub fn manifest_path(paths: &NodePaths) -> PathBuf {
        paths.manifest_dir.join(MANIFEST_FILE)
    }

    /// Render the manifest (or the operator `Installation` on the chart path)
    pub fn render_manifest(&self) -> Result<String, ComponentError> {
        let release = format!("calico/{}.yaml", self.base.version);
        let manifest = manifest_template(&self.base.version)?;
        let name = if self.use_chart { INSTALLATION } else { release.as_str() };
        let mode = CalicoMode::parse(&self.mode)?;

        let mut tera = Tera::default();
        let mut templates: Vec<(&str, &str)> = LAYERS.to_vec();
        templates.push((release.as_str(), manifest));
        tera.add_raw_templates(templates)
            .map_err(|e| ComponentError::template(name, e))?;

        let mut context = Context::new();
        context.insert("version", &self.base.version);
        context.insert("namespace", &self.base.namespace);
        context.insert("image_registry", self.image_registry());
        let node_image = format!("{}/calico/node:{}", self.image_registry(), self.base.version);
        context.insert("node_image", &node_image);
        context.insert("mtu", &self.mtu);
        context.insert("ipam", if self.ip_manger { "calico-ipam" } else { "host-local" });
        context.insert("backend", mode.backend());
        context.insert("ipip_mode", mode.ipip_mode());
        context.insert("vxlan_mode", mode.vxlan_mode());
        context.insert("encapsulation", mode.encapsulation());
        context.insert("encapsulation_v6", mode.encapsulation_v6());
        context.insert("dual_stack", &self.base.dual_stack);
        context.insert("pod_ipv4_cidr", &self.base.pod_ipv4_cidr);
        context.insert("pod_ipv6_cidr", &self.base.pod_ipv6_cidr);
        context.insert("ipv4_detection", &self.node_address_detection_v4.method());
        context.insert("ipv6_detection", &self.node_address_detection_v6.method());
        context.insert("ipv4_detection_yaml", &self.node_address_detection_v4.operator_yaml());
        context.insert("ipv6_detection_yaml", &self.node_address_detection_v6.operator_yaml());
        context.insert("kubelet_dir", self.kubelet_dir());

        tera.render(name, &context)
            .map_err(|e| ComponentError::template(name, e))
    }

    /// Operator commands for inspecting and restarting the plugin
    pub fn cmd_list(namespace: &str) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("get", format!("kubectl get po -n {namespace} | grep calico")),
            ("restart", format!("kubectl rollout restart ds calico-node -n {namespace}")),
        ])
    }

    fn build_steps(&self, nodes: &[StepNode], kube_version: &str) -> Result<ActionSteps, ComponentError> {
        manifest_template(&self.base.version)?;
        let mut rendered = self.clone();
        rendered.use_chart = is_high_kube_version(kube_version);
        let payload = rendered.to_payload()?;
        let manifest = Self::manifest_path(&NodePaths::default());

        let mut install = Vec::new();
        if self.base.loads_images() {
            install.push(self.images().load_step(nodes)?);
        }
        if rendered.use_chart {
            let chart = self.chart();
            install.extend(chart.install_steps(nodes, kube_version)?);
            install.push(operator_release_step(&chart.chart_path(&NodePaths::default()), nodes));
        }
        install.push(render_step(KIND, payload, nodes));
        install.push(apply_step(&manifest, nodes));

        Ok(ActionSteps {
            install,
            uninstall: self.removal_steps(nodes)?,
            upgrade: Vec::new(),
        })
    }

    /// Manifest and tunnel cleanup on every node, then image removal
    fn removal_steps(&self, nodes: &[StepNode]) -> Result<Vec<Step>, ComponentError> {
        let mut steps = vec![
            custom_step(
                "cleanCalico",
                StepAction::Uninstall,
                CLEAN_TIMEOUT,
                nodes,
                custom_command(KIND, RunnableRole::AgentStep, self.to_payload()?),
            )
            .ignore_errors(),
        ];
        if self.base.loads_images() {
            steps.push(self.images().remove_step(nodes)?);
        }
        Ok(steps)
    }

    async fn clear_nics(&self, ctx: &NodeContext, dry_run: bool) {
        let mode = match CalicoMode::parse(&self.mode) {
            Ok(mode) => mode,
            Err(e) => {
                warn!("Skipping tunnel cleanup: {}", e);
                return;
            }
        };
        for nic in mode.tunnel_interfaces(self.base.dual_stack) {
            match ctx.commands.run(dry_run, "ip", &["link", "delete", nic]).await {
                Ok(_) => debug!("Removed calico interface {}", nic),
                Err(e) => warn!("Failed to remove calico interface {}: {}", nic, e),
            }
        }
    }
}

#[async_trait::async_trait]
impl Runnable for CalicoRunnable {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn version(&self) -> &str {
        &self.base.version
    }

    fn new_instance(&self) -> Box<dyn Runnable> {
        Box::new(Self::default())
    }

    fn init_step(
        &self,
        metadata: &ExtraMetadata,
        desired: &DesiredState<'_>,
        nodes: &[StepNode],
    ) -> Result<Box<dyn Runnable>, ComponentError> {
        let mut calico = Self::from_desired(metadata, desired)?;
        calico.steps = calico.build_steps(nodes, &metadata.kube_version)?;
        Ok(Box::new(calico))
    }

    fn install_steps(&self, nodes: &[StepNode], kube_version: &str) -> Result<Vec<Step>, ComponentError> {
        Ok(self.build_steps(nodes, kube_version)?.install)
    }

    fn uninstall_steps(&self, nodes: &[StepNode]) -> Result<Vec<Step>, ComponentError> {
        self.removal_steps(nodes)
    }

    async fn install(&self, ctx: &NodeContext, opts: InstallOptions) -> Result<(), ComponentError> {
        self.render(ctx, opts).await
    }

    async fn uninstall(&self, ctx: &NodeContext, opts: InstallOptions) -> Result<(), ComponentError> {
        let manifest = Self::manifest_path(&ctx.paths);
        if opts.dry_run {
            debug!("dry run: remove {}", manifest.display());
        } else if let Err(e) = remove_file_if_exists(&manifest).await {
            warn!("Failed to remove {}: {}", manifest.display(), e);
        }
        self.clear_nics(ctx, opts.dry_run).await;
        info!("calico {} uninstalled", self.base.version);
        Ok(())
    }

    async fn render(&self, ctx: &NodeContext, opts: InstallOptions) -> Result<(), ComponentError> {
        ctx.check_cancelled()?;
        let manifest = self.render_manifest()?;
        let path = Self::manifest_path(&ctx.paths);
        write_atomic(&path, manifest.as_bytes(), opts.dry_run).await?;
        info!(
            "Rendered calico {} {} to {}",
            self.base.version,
            if self.use_chart { "installation" } else { "manifest" },
            path.display()
        );
        Ok(())
    }

    fn action_steps(&self, action: StepAction) -> &[Step] {
        self.steps.get(action)
    }

    fn to_payload(&self) -> Result<Vec<u8>, ComponentError> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::fake::FakeNode;
    use crds::{Calico, ClusterSpec, Cni, CommandType, IpFamily, NetworkRanges, Networking};

    fn calico(version: &str, mode: &str, kubelet_dir: &str, dual_stack: bool) -> CalicoRunnable {
        CalicoRunnable {
            base: CniBase {
                cni_type: "calico".to_string(),
                version: version.to_string(),
                namespace: "kube-system".to_string(),
                dual_stack,
                pod_ipv4_cidr: "10.244.0.0/16".to_string(),
                pod_ipv6_cidr: if dual_stack { "fd00::/108".to_string() } else { String::new() },
                ..Default::default()
            },
            mode: mode.to_string(),
            mtu: 1440,
            ip_manger: true,
            node_address_detection_v4: NodeAddressDetection::parse("first-found"),
            node_address_detection_v6: NodeAddressDetection::parse("first-found"),
            kubelet_data_dir: kubelet_dir.to_string(),
            ..Default::default()
        }
    }

    fn cluster(version: &str, offline: bool) -> ClusterSpec {
        ClusterSpec {
            kubernetes_version: "v1.27.6".to_string(),
            cni: Cni {
                cni_type: "calico".to_string(),
                version: version.to_string(),
                namespace: "kube-system".to_string(),
                offline,
                calico: Some(Calico {
                    ipv4_auto_detection: "interface=eth.*".to_string(),
                    mode: "Overlay-Vxlan-All".to_string(),
                    ip_manger: true,
                    mtu: 1440,
                    ..Default::default()
                }),
                ..Default::default()
            },
            offline,
            ..Default::default()
        }
    }

    fn step_names(steps: &[Step]) -> Vec<&str> {
        steps.iter().map(|s| s.name.as_str()).collect()
    }

    fn documents(rendered: &str) -> Vec<serde_yaml::Value> {
        serde_yaml::Deserializer::from_str(rendered)
            .map(|doc| serde_yaml::Value::deserialize(doc).unwrap())
            .filter(|doc| !doc.is_null())
            .collect()
    }

    #[test]
    fn test_render_default_kubelet_dir() {
        let rendered = calico("v3.26.1", "Overlay-IPIP-All", "", false).render_manifest().unwrap();
        assert!(rendered.contains("/var/lib/kubelet/plugins/csi.tigera.io"));
        assert!(!rendered.contains("pod2daemon-flexvol"));
    }

    #[test]
    fn test_render_custom_kubelet_dir() {
        let rendered = calico("v3.26.1", "Overlay-IPIP-All", "/custom/kubelet", false)
            .render_manifest()
            .unwrap();
        assert!(rendered.contains("/custom/kubelet"));
        assert!(!rendered.contains("/var/lib/kubelet"));
    }

    #[test]
    fn test_every_supported_version_renders_valid_yaml() {
        for version in supported_versions() {
            let rendered = calico(version, "Overlay-Vxlan-All", "", true).render_manifest().unwrap();
            let docs = documents(&rendered);
            assert!(docs.len() >= 8, "{version}");
            assert!(rendered.contains(&format!("docker.io/calico/node:{version}")), "{version}");
            assert!(rendered.contains("CALICO_IPV6POOL_CIDR"), "{version}");
        }
        let flexvol = calico("v3.24.5", "BGP", "", false).render_manifest().unwrap();
        assert!(flexvol.contains("pod2daemon-flexvol"));
        assert!(!flexvol.contains("csi-node-driver"));
    }

    fn crd_names(docs: &[serde_yaml::Value]) -> Vec<String> {
        docs.iter()
            .filter(|doc| doc["kind"] == "CustomResourceDefinition")
            .map(|doc| doc["metadata"]["name"].as_str().unwrap().to_string())
            .collect()
    }

    fn images(rendered: &str) -> Vec<&str> {
        rendered
            .lines()
            .filter_map(|line| line.trim().strip_prefix("image: "))
            .collect()
    }

    #[test]
    fn test_each_release_pins_its_crds_and_images() {
        let expected = [
            ("v3.11.2", 14, "apiextensions.k8s.io/v1beta1"),
            ("v3.16.10", 15, "apiextensions.k8s.io/v1"),
            ("v3.21.2", 16, "apiextensions.k8s.io/v1"),
            ("v3.22.4", 17, "apiextensions.k8s.io/v1"),
            ("v3.24.5", 17, "apiextensions.k8s.io/v1"),
            ("v3.26.1", 18, "apiextensions.k8s.io/v1"),
        ];
        assert_eq!(expected.len(), supported_versions().count());

        for (version, crd_count, crd_api) in expected {
            let rendered = calico(version, "Overlay-Vxlan-All", "", false).render_manifest().unwrap();
            let docs = documents(&rendered);

            let crds = crd_names(&docs);
            assert_eq!(crds.len(), crd_count, "{version}");
            assert!(crds.iter().all(|name| name.ends_with(".crd.projectcalico.org")), "{version}");
            for required in ["felixconfigurations", "ippools", "ipamblocks", "clusterinformations"] {
                assert!(
                    crds.contains(&format!("{required}.crd.projectcalico.org")),
                    "{version} lacks {required}"
                );
            }
            assert!(
                docs.iter()
                    .filter(|doc| doc["kind"] == "CustomResourceDefinition")
                    .all(|doc| doc["apiVersion"] == crd_api),
                "{version}"
            );

            let images = images(&rendered);
            assert!(images.len() >= 3, "{version}");
            assert!(
                images.iter().all(|image| image.ends_with(&format!(":{version}"))),
                "{version}: {images:?}"
            );
            for other in supported_versions().filter(|v| *v != version) {
                assert!(!rendered.contains(other), "{version} mentions {other}");
            }
        }
    }

    #[test]
    fn test_release_specific_resources() {
        let render = |version| calico(version, "BGP", "", false).render_manifest().unwrap();

        let v3_11 = render("v3.11.2");
        assert!(v3_11.contains("name: upgrade-ipam"));
        assert!(!v3_11.contains("kind: PodDisruptionBudget"));
        assert!(!v3_11.contains("kubecontrollersconfigurations"));

        let v3_21 = render("v3.21.2");
        assert!(v3_21.contains("ipreservations.crd.projectcalico.org"));
        assert!(v3_21.contains("apiVersion: policy/v1beta1"));
        assert!(!v3_21.contains("caliconodestatuses"));

        let v3_24 = render("v3.24.5");
        assert!(v3_24.contains("caliconodestatuses.crd.projectcalico.org"));
        assert!(v3_24.contains("apiVersion: policy/v1\n"));
        assert!(v3_24.contains("name: mount-bpffs"));
        assert!(!v3_24.contains("bgpfilters"));

        let v3_26 = render("v3.26.1");
        assert!(v3_26.contains("bgpfilters.crd.projectcalico.org"));
        assert!(v3_26.contains("name: mount-bpffs"));
        assert!(!render("v3.16.10").contains("mount-bpffs"));
    }

    #[test]
    fn test_unsupported_version_has_no_steps() {
        let spec = cluster("v3.25.0", false);
        let metadata = ExtraMetadata::from_cluster("prod", &spec);
        let err = CalicoRunnable::default()
            .init_step(&metadata, &DesiredState::new(&spec, &[]), &[])
            .unwrap_err();
        assert!(matches!(err, ComponentError::UnsupportedVersion { .. }));

        let bare = calico("v9.9.9", "BGP", "", false);
        assert!(bare.install_steps(&[], "v1.27.6").is_err());
        assert!(bare.render_manifest().is_err());
    }

    #[test]
    fn test_manifest_path_steps() {
        let spec = cluster("v3.24.5", false);
        let metadata = ExtraMetadata::from_cluster("prod", &spec);
        let runnable = CalicoRunnable::default()
            .init_step(&metadata, &DesiredState::new(&spec, &[]), &[])
            .unwrap();
        let install = runnable.action_steps(StepAction::Install);
        assert_eq!(step_names(install), vec!["renderCalicoManifest", "applyCniManifest"]);
        assert_eq!(install[0].commands[0].identity, "calico/v1/template");
        assert_eq!(
            install[1].commands[0].shell_command,
            vec!["kubectl", "apply", "-f", "/tmp/.nodesmith/manifests/calico.yaml"]
        );

        let uninstall = runnable.action_steps(StepAction::Uninstall);
        assert_eq!(step_names(uninstall), vec!["cleanCalico"]);
        assert!(uninstall[0].err_ignore);
        assert_eq!(uninstall[0].commands[0].identity, "calico/v1/step");
    }

    #[test]
    fn test_chart_path_steps_for_offline_cluster() {
        let mut spec = cluster("v3.26.1", true);
        spec.kubernetes_version = "v1.28.4".to_string();
        let metadata = ExtraMetadata::from_cluster("prod", &spec);
        let runnable = CalicoRunnable::default()
            .init_step(&metadata, &DesiredState::new(&spec, &[]), &[])
            .unwrap();

        let install = runnable.action_steps(StepAction::Install);
        assert_eq!(
            step_names(install),
            vec![
                "loadImages-calico",
                "downloadChart-calico",
                "installCalicoRelease",
                "renderCalicoManifest",
                "applyCniManifest",
            ]
        );
        assert_eq!(install[2].commands[0].command_type, CommandType::Shell);

        let rendered: CalicoRunnable = serde_json::from_slice(&install[3].commands[0].custom_command).unwrap();
        assert!(rendered.use_chart);
        let installation = rendered.render_manifest().unwrap();
        assert!(installation.contains("kind: Installation"));
        assert!(installation.contains("interface: \"eth.*\""));
        assert_eq!(documents(&installation).len(), 2);

        assert_eq!(
            step_names(runnable.action_steps(StepAction::Uninstall)),
            vec!["cleanCalico", "removeImages-calico"]
        );
    }

    #[test]
    fn test_dual_stack_takes_second_cidr() {
        let mut spec = cluster("v3.26.1", false);
        spec.networking = Networking {
            ip_family: IpFamily::DualStack,
            pods: NetworkRanges {
                cidr_blocks: vec!["172.25.0.0/16".to_string(), "fd00::/108".to_string()],
            },
            ..Default::default()
        };
        let metadata = ExtraMetadata::from_cluster("prod", &spec);
        let runnable = CalicoRunnable::from_desired(&metadata, &DesiredState::new(&spec, &[])).unwrap();
        assert!(runnable.base.dual_stack);
        assert_eq!(runnable.base.pod_ipv6_cidr, "fd00::/108");
        assert_eq!(runnable.node_address_detection_v4.method(), "interface=eth.*");
        assert_eq!(runnable.node_address_detection_v6.method(), "first-found");
    }

    #[tokio::test]
    async fn test_render_writes_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let paths = NodePaths::rooted(dir.path());
        let ctx = FakeNode::default().context(paths.clone());

        calico("v3.26.1", "BGP", "", false)
            .install(&ctx, InstallOptions::default())
            .await
            .unwrap();
        let written = std::fs::read_to_string(CalicoRunnable::manifest_path(&paths)).unwrap();
        assert!(written.contains("calico/node:v3.26.1"));
    }

    #[tokio::test]
    async fn test_uninstall_clears_tunnels() {
        let dir = tempfile::tempdir().unwrap();
        let paths = NodePaths::rooted(dir.path());
        let node = FakeNode::default();
        node.commands.fail_on("vxlan.calico", "Cannot find device");
        let ctx = node.context(paths.clone());

        let runnable = calico("v3.26.1", "Overlay-Vxlan-All", "", true);
        runnable.render(&ctx, InstallOptions::default()).await.unwrap();
        runnable.uninstall(&ctx, InstallOptions::default()).await.unwrap();

        assert!(!CalicoRunnable::manifest_path(&paths).exists());
        assert_eq!(
            node.commands.command_lines(),
            vec!["ip link delete vxlan.calico", "ip link delete vxlan-v6.calico"]
        );
    }

    #[test]
    fn test_cmd_list() {
        let cmds = CalicoRunnable::cmd_list("kube-system");
        assert_eq!(cmds["restart"], "kubectl rollout restart ds calico-node -n kube-system");
        assert!(cmds["get"].starts_with("kubectl get po -n kube-system"));
    }
}
