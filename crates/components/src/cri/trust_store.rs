//! containerd per-host registry trust store
//!
//! containerd resolves registry hosts through `<config_path>/<host>/hosts.toml`.
//! Every registry host in the desired set gets one directory holding its
//! `hosts.toml` and, when a CA bundle is configured, a `<host>.pem` file.
//! Directories of hosts no longer desired are removed on reconcile.

use crate::component_registry::RunnableRole;
use crate::constants::CONTAINERD_UNIT;
use crate::cri::containerd::ContainerdRunnable;
use crate::error::ComponentError;
use crate::fsutil::write_atomic;
use crate::metadata::{DesiredState, ExtraMetadata};
use crate::node::{InstallOptions, NodeContext};
use crate::runnable::{ActionSteps, Runnable, custom_command, custom_step};
use crds::{RegistrySpec, SCHEME_HTTPS, Step, StepAction, StepNode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Component kind
pub const KIND: &str = "containerd-registry";

/// Host may pull images
pub const CAPABILITY_PULL: &str = "pull";
/// Host may push images
pub const CAPABILITY_PUSH: &str = "push";
/// Host may resolve tags to digests
pub const CAPABILITY_RESOLVE: &str = "resolve";

const HOSTS_FILE: &str = "hosts.toml";
const STEP_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// One endpoint of a registry host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerdHost {
    /// "http" or "https"
    pub scheme: String,
    /// Registry host, with optional port
    pub host: String,
    /// Operations allowed against this endpoint
    pub capabilities: Vec<String>,
    /// Skip TLS verification
    #[serde(default)]
    pub skip_verify: bool,
    /// PEM encoded CA bundle
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ca: String,
}

impl ContainerdHost {
    fn url(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }
}

/// Trust configuration of one registry host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerdRegistry {
    /// Registry host without scheme; also the directory name
    pub server: String,
    /// Endpoints, in identity key order
    pub hosts: Vec<ContainerdHost>,
}

/// Per-endpoint section of `hosts.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFileConfig {
    /// Allowed operations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,

    /// CA certificate file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,

    /// Only emitted when verification is disabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_verify: Option<bool>,

    /// API root is part of the endpoint URL
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub override_path: bool,
}

/// Contents of `hosts.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFile {
    /// Default upstream server
    pub server: String,
    /// Endpoint sections keyed by `scheme://host`
    pub host: BTreeMap<String, HostFileConfig>,
}

impl ContainerdRegistry {
    /// Upstream server URL, https when any endpoint speaks it
    pub fn server_url(&self) -> String {
        let scheme = if self.hosts.iter().any(|h| h.scheme == SCHEME_HTTPS) {
            SCHEME_HTTPS
        } else {
            self.hosts.first().map_or(SCHEME_HTTPS, |h| h.scheme.as_str())
        };
        format!("{scheme}://{}", self.server)
    }

    /// `hosts.toml` model; CA files are referenced inside `host_dir`
    pub fn host_file(&self, host_dir: &Path) -> HostFile {
        let host = self
            .hosts
            .iter()
            .map(|h| {
                let config = HostFileConfig {
                    capabilities: h.capabilities.clone(),
                    ca: (!h.ca.is_empty())
                        .then(|| host_dir.join(format!("{}.pem", h.host)).to_string_lossy().into_owned()),
                    skip_verify: h.skip_verify.then_some(true),
                    override_path: false,
                };
                (h.url(), config)
            })
            .collect();
        HostFile {
            server: self.server_url(),
            host,
        }
    }

    /// Write `hosts.toml` and CA files under `<dir>/<server>`
    pub async fn render_configs(&self, dir: &Path) -> Result<(), ComponentError> {
        let host_dir = dir.join(&self.server);
        tokio::fs::create_dir_all(&host_dir)
            .await
            .map_err(|e| ComponentError::io(&host_dir, e))?;

        for host in self.hosts.iter().filter(|h| !h.ca.is_empty()) {
            let ca_file = host_dir.join(format!("{}.pem", host.host));
            write_atomic(&ca_file, host.ca.as_bytes(), false).await?;
        }

        let contents = toml::to_string(&self.host_file(&host_dir))?;
        write_atomic(&host_dir.join(HOSTS_FILE), contents.as_bytes(), false).await?;
        debug!("Rendered trust store for {} ({} endpoints)", self.server, self.hosts.len());
        Ok(())
    }
}

/// Group registry endpoints by host
pub fn to_containerd_registry_config(registries: &[RegistrySpec]) -> BTreeMap<String, ContainerdRegistry> {
    let mut configs: BTreeMap<String, ContainerdRegistry> = BTreeMap::new();
    for r in registries {
        configs
            .entry(r.host.clone())
            .or_insert_with(|| ContainerdRegistry {
                server: r.host.clone(),
                hosts: Vec::new(),
            })
            .hosts
            .push(ContainerdHost {
                scheme: r.scheme.clone(),
                host: r.host.clone(),
                capabilities: vec![
                    CAPABILITY_PULL.to_string(),
                    CAPABILITY_PUSH.to_string(),
                    CAPABILITY_RESOLVE.to_string(),
                ],
                skip_verify: r.skip_verify,
                ca: r.ca.clone(),
            });
    }
    configs
}

/// Brings a node's trust store in line with the cluster registry set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerdRegistryConfigure {
    /// Desired trust configuration keyed by host
    #[serde(default)]
    pub registries: BTreeMap<String, ContainerdRegistry>,

    /// Runtime whose `config.toml` is re-rendered
    #[serde(default)]
    pub containerd: ContainerdRunnable,

    #[serde(skip)]
    steps: ActionSteps,
}

impl ContainerdRegistryConfigure {
    /// Configure step payload for a runtime and its registry set
    pub fn new(containerd: ContainerdRunnable) -> Self {
        Self {
            registries: to_containerd_registry_config(&containerd.registries),
            containerd,
            steps: ActionSteps::default(),
        }
    }

    /// Reconcile the trust store under `ctx.paths.registry_config_dir`.
    ///
    /// Rendering failures are returned. Stale directory removal, the
    /// `config.toml` rewrite and the containerd restart only log on failure.
    pub async fn reconcile(&self, ctx: &NodeContext, dry_run: bool) -> Result<(), ComponentError> {
        self.reconcile_with(ctx, dry_run, tokio::fs::remove_dir_all).await
    }

    /// [`Self::reconcile`] removing stale host directories with `remove_dir`
    async fn reconcile_with<F, Fut>(
        &self,
        ctx: &NodeContext,
        dry_run: bool,
        remove_dir: F,
    ) -> Result<(), ComponentError>
    where
        F: Fn(PathBuf) -> Fut,
        Fut: Future<Output = std::io::Result<()>>,
    {
        let config_dir = &ctx.paths.registry_config_dir;
        if dry_run {
            debug!(
                "dry run: reconcile {} registries under {}",
                self.registries.len(),
                config_dir.display()
            );
            return Ok(());
        }

        let mut stale = existing_host_dirs(config_dir).await?;
        for registry in self.registries.values() {
            ctx.check_cancelled()?;
            registry.render_configs(config_dir).await?;
            stale.remove(&registry.server);
        }

        for dir in &stale {
            let path = config_dir.join(dir);
            match remove_dir(path.clone()).await {
                Ok(()) => info!("Removed stale registry config {}", path.display()),
                Err(e) => error!("Failed to remove stale registry config {}: {}", path.display(), e),
            }
        }

        let mut containerd = self.containerd.clone();
        containerd.enable_systemd_cgroup = ctx.systemd_cgroup;
        match containerd.render_config(&ctx.paths) {
            Ok(config) => {
                if let Err(e) = write_atomic(&ctx.paths.containerd_config_file(), config.as_bytes(), false).await {
                    error!("Failed to write containerd config: {}", e);
                }
            }
            Err(e) => error!("Failed to render containerd config: {}", e),
        }

        if let Err(e) = ctx.services.daemon_reload().await {
            error!("systemctl daemon-reload failed: {}", e);
        }
        if let Err(e) = ctx.services.restart(CONTAINERD_UNIT).await {
            error!("Failed to restart {}: {}", CONTAINERD_UNIT, e);
        }

        info!(
            "Trust store reconciled: {} hosts, {} removed",
            self.registries.len(),
            stale.len()
        );
        Ok(())
    }

    fn build_steps(&self, nodes: &[StepNode]) -> Result<ActionSteps, ComponentError> {
        Ok(ActionSteps {
            install: vec![custom_step(
                "criRegistryUpdate",
                StepAction::Install,
                STEP_TIMEOUT,
                nodes,
                custom_command(KIND, RunnableRole::AgentStep, self.to_payload()?),
            )],
            ..Default::default()
        })
    }
}

async fn existing_host_dirs(dir: &Path) -> Result<BTreeSet<String>, ComponentError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => return Err(ComponentError::io(dir, e)),
    };
    let mut dirs = BTreeSet::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| ComponentError::io(dir, e))? {
        match entry.file_type().await {
            Ok(t) if t.is_dir() => {
                dirs.insert(entry.file_name().to_string_lossy().into_owned());
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to stat {}: {}", entry.path().display(), e),
        }
    }
    Ok(dirs)
}

#[async_trait::async_trait]
impl Runnable for ContainerdRegistryConfigure {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn version(&self) -> &str {
        &self.containerd.version
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
        let mut configure = Self::new(ContainerdRunnable::from_desired(metadata, desired)?);
        configure.steps = configure.build_steps(nodes)?;
        Ok(Box::new(configure))
    }

    fn install_steps(&self, nodes: &[StepNode], _kube_version: &str) -> Result<Vec<Step>, ComponentError> {
        Ok(self.build_steps(nodes)?.install)
    }

    fn uninstall_steps(&self, _nodes: &[StepNode]) -> Result<Vec<Step>, ComponentError> {
        Ok(Vec::new())
    }

    async fn install(&self, ctx: &NodeContext, opts: InstallOptions) -> Result<(), ComponentError> {
        self.reconcile(ctx, opts.dry_run).await
    }

    async fn uninstall(&self, _ctx: &NodeContext, _opts: InstallOptions) -> Result<(), ComponentError> {
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
    use crate::constants::NodePaths;
    use crate::node::fake::{FakeNode, read_dir_files};
    use crate::registries::RegistrySet;
    use crds::ClusterSpec;
    use std::fs;

    fn configure(hosts: &[&str]) -> ContainerdRegistryConfigure {
        let registries: RegistrySet = hosts.iter().flat_map(|h| RegistrySpec::insecure_pair(h)).collect();
        ContainerdRegistryConfigure::new(ContainerdRunnable {
            version: "1.7.13".to_string(),
            pause_version: "3.9".to_string(),
            pause_registry: "registry.k8s.io".to_string(),
            registries: registries.into_vec(),
            ..Default::default()
        })
    }

    fn subdirs(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_grouping_by_host() {
        let ca = RegistrySpec {
            ca: "PEM".to_string(),
            ..RegistrySpec::https_insecure("b.local")
        };
        let mut registries = RegistrySpec::insecure_pair("a.local").to_vec();
        registries.push(ca);

        let configs = to_containerd_registry_config(&registries);
        assert_eq!(configs.keys().collect::<Vec<_>>(), vec!["a.local", "b.local"]);
        assert_eq!(configs["a.local"].hosts.len(), 2);
        assert_eq!(configs["a.local"].hosts[0].capabilities, vec!["pull", "push", "resolve"]);
        assert_eq!(configs["b.local"].hosts[0].ca, "PEM");
    }

    #[test]
    fn test_host_file_shape() {
        let configs = to_containerd_registry_config(&RegistrySpec::insecure_pair("a.local:5000"));
        let file = configs["a.local:5000"].host_file(Path::new("/etc/containerd/certs.d/a.local:5000"));
        let rendered = toml::to_string(&file).unwrap();
        let parsed: toml::Value = toml::from_str(&rendered).unwrap();

        assert_eq!(parsed["server"].as_str(), Some("https://a.local:5000"));
        let http = &parsed["host"]["http://a.local:5000"];
        assert!(http.get("skip_verify").is_none());
        assert!(http.get("ca").is_none());
        assert_eq!(http["capabilities"].as_array().map(Vec::len), Some(3));
        assert_eq!(parsed["host"]["https://a.local:5000"]["skip_verify"].as_bool(), Some(true));
    }

    #[test]
    fn test_plain_http_registry_server() {
        let configs = to_containerd_registry_config(&[RegistrySpec::http("plain.local")]);
        assert_eq!(configs["plain.local"].server_url(), "http://plain.local");
    }

    #[tokio::test]
    async fn test_render_writes_ca_file() {
        let dir = tempfile::tempdir().unwrap();
        let spec = RegistrySpec {
            ca: "-----BEGIN CERTIFICATE-----\n".to_string(),
            ..RegistrySpec::https_insecure("harbor.local")
        };
        let configs = to_containerd_registry_config(&[spec]);
        configs["harbor.local"].render_configs(dir.path()).await.unwrap();

        let files = read_dir_files(&dir.path().join("harbor.local"));
        assert_eq!(files["harbor.local.pem"], "-----BEGIN CERTIFICATE-----\n");
        let parsed: toml::Value = toml::from_str(&files["hosts.toml"]).unwrap();
        let ca = parsed["host"]["https://harbor.local"]["ca"].as_str().unwrap();
        assert!(ca.ends_with("harbor.local/harbor.local.pem"));
    }

    #[tokio::test]
    async fn test_reconcile_replaces_stale_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let paths = NodePaths::rooted(dir.path());
        let node = FakeNode::default();
        let ctx = node.context(paths.clone());

        configure(&["a", "b"]).reconcile(&ctx, false).await.unwrap();
        assert_eq!(subdirs(&paths.registry_config_dir), vec!["a", "b"]);

        configure(&["b", "c"]).reconcile(&ctx, false).await.unwrap();
        assert_eq!(subdirs(&paths.registry_config_dir), vec!["b", "c"]);
        assert!(paths.registry_config_dir.join("c/hosts.toml").is_file());
        assert!(paths.containerd_config_file().is_file());
        assert_eq!(
            node.services.calls(),
            vec![
                "daemon-reload",
                "restart containerd.service",
                "daemon-reload",
                "restart containerd.service",
            ]
        );
    }

    #[tokio::test]
    async fn test_reconcile_keeps_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = NodePaths::rooted(dir.path());
        fs::create_dir_all(&paths.registry_config_dir).unwrap();
        fs::write(paths.registry_config_dir.join("README"), "keep").unwrap();
        let ctx = FakeNode::default().context(paths.clone());

        configure(&["a"]).reconcile(&ctx, false).await.unwrap();
        assert!(paths.registry_config_dir.join("README").is_file());
    }

    #[tokio::test]
    async fn test_reconcile_tolerates_stale_removal_failure() {
        let dir = tempfile::tempdir().unwrap();
        let paths = NodePaths::rooted(dir.path());
        let node = FakeNode::default();
        let ctx = node.context(paths.clone());
        configure(&["a", "b"]).reconcile(&ctx, false).await.unwrap();

        let stuck = paths.registry_config_dir.join("a");
        configure(&["b", "c"])
            .reconcile_with(&ctx, false, |path| {
                let refuse = path == stuck;
                async move {
                    if refuse {
                        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "busy"))
                    } else {
                        tokio::fs::remove_dir_all(path).await
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(subdirs(&paths.registry_config_dir), vec!["a", "b", "c"]);
        assert!(paths.registry_config_dir.join("b/hosts.toml").is_file());
        assert!(paths.registry_config_dir.join("c/hosts.toml").is_file());
        assert!(paths.containerd_config_file().is_file());
        assert_eq!(node.services.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_reconcile_tolerates_restart_failure() {
        let dir = tempfile::tempdir().unwrap();
        let node = FakeNode::default();
        node.services.fail("restart");
        node.services.fail("daemon-reload");
        let ctx = node.context(NodePaths::rooted(dir.path()));

        configure(&["a"]).reconcile(&ctx, false).await.unwrap();
    }

    #[tokio::test]
    async fn test_dry_run_leaves_node_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let paths = NodePaths::rooted(dir.path());
        let node = FakeNode::default();
        let ctx = node.context(paths.clone());

        configure(&["a"])
            .install(&ctx, InstallOptions { dry_run: true })
            .await
            .unwrap();
        assert!(!paths.registry_config_dir.exists());
        assert!(node.services.calls().is_empty());
    }

    #[test]
    fn test_update_step() {
        let mut spec = ClusterSpec {
            kubernetes_version: "v1.28.4".to_string(),
            ..Default::default()
        };
        spec.container_runtime.version = "1.7.13".to_string();
        let registries = RegistrySpec::insecure_pair("a.local");
        let metadata = ExtraMetadata::from_cluster("prod", &spec);
        let nodes = vec![StepNode {
            id: "node-1".to_string(),
            ..Default::default()
        }];

        let configure = ContainerdRegistryConfigure::default()
            .init_step(&metadata, &DesiredState::new(&spec, &registries), &nodes)
            .unwrap();
        let steps = configure.action_steps(StepAction::Install);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].name, "criRegistryUpdate");
        assert_eq!(steps[0].timeout, STEP_TIMEOUT);
        assert_eq!(steps[0].commands[0].identity, "containerd-registry/v1/step");
        assert!(configure.action_steps(StepAction::Uninstall).is_empty());

        let decoded: ContainerdRegistryConfigure =
            serde_json::from_slice(&steps[0].commands[0].custom_command).unwrap();
        assert_eq!(decoded.registries.len(), 1);
        assert_eq!(decoded.containerd.registries, registries.to_vec());
    }
}
