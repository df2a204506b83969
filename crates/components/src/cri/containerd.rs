//! containerd runtime component

use crate::component_registry::RunnableRole;
use crate::constants::{CONTAINERD_SOCKET, CONTAINERD_UNIT, K8S_NAMESPACE, NodePaths};
use crate::cri::trust_store::to_containerd_registry_config;
use crate::error::ComponentError;
use crate::fsutil::{remove_dir_all_if_exists, write_atomic};
use crate::metadata::{DesiredState, ExtraMetadata};
use crate::node::{InstallOptions, NodeContext};
use crate::registries::filter_with_auth;
use crate::runnable::{ActionSteps, Runnable, custom_command, custom_step};
use crate::teardown::teardown_namespace;
use crate::version::Version;
use crds::{RegistrySpec, Step, StepAction, StepNode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tera::{Context, Tera};
use tracing::{debug, info, warn};

/// Component kind
pub const KIND: &str = "containerd";

/// Registry serving the pause image before Kubernetes 1.25
pub const LEGACY_PAUSE_REGISTRY: &str = "k8s.gcr.io";

/// Registry serving the pause image from Kubernetes 1.25
pub const PAUSE_REGISTRY: &str = "registry.k8s.io";

/// Pause tag used when the Kubernetes version is unknown
pub const DEFAULT_PAUSE_VERSION: &str = "3.9";

const STEP_TIMEOUT: Duration = Duration::from_secs(10 * 60);

const CONFIG_V2: &str = include_str!("../../templates/containerd/config-v2.toml");
const CONFIG_V3: &str = include_str!("../../templates/containerd/config-v3.toml");

/// containerd configuration file schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSchema {
    /// `version = 2` (containerd 1.6, 1.7)
    V2,
    /// `version = 3` (containerd 2.0, 2.1)
    V3,
}

impl ConfigSchema {
    /// Schema of a containerd release; unsupported releases are an error
    pub fn for_version(version: &str) -> Result<Self, ComponentError> {
        let unsupported = || ComponentError::UnsupportedVersion {
            kind: KIND.to_string(),
            version: version.to_string(),
        };
        let parsed = Version::parse(version).ok_or_else(unsupported)?;
        match (parsed.major, parsed.minor) {
            (1, 6 | 7) => Ok(ConfigSchema::V2),
            (2, 0 | 1) => Ok(ConfigSchema::V3),
            _ => Err(unsupported()),
        }
    }

    fn template(self) -> (&'static str, &'static str) {
        match self {
            ConfigSchema::V2 => ("containerd/config-v2.toml", CONFIG_V2),
            ConfigSchema::V3 => ("containerd/config-v3.toml", CONFIG_V3),
        }
    }
}

/// Pause image tag and registry matching a Kubernetes version.
///
/// Returns an empty tag when the version is empty, unparseable or outside
/// the known range.
pub fn match_pause_version(kube_version: &str) -> (String, String) {
    let Some(version) = Version::parse(kube_version) else {
        return (String::new(), LEGACY_PAUSE_REGISTRY.to_string());
    };
    let registry = if version >= Version::new(1, 25, 0) {
        PAUSE_REGISTRY
    } else {
        LEGACY_PAUSE_REGISTRY
    };
    let tag = match (version.major, version.minor) {
        (1, 18..=20) => "3.2",
        (1, 21) => "3.4.1",
        (1, 22) => "3.5",
        (1, 23) => "3.6",
        (1, 24) => "3.7",
        (1, 25) => "3.8",
        (1, 26..=30) => "3.9",
        _ => "",
    };
    (tag.to_string(), registry.to_string())
}

/// containerd runtime
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerdRunnable {
    /// containerd release (e.g. "1.7.13")
    pub version: String,

    /// Install from pre-staged artifacts
    #[serde(default)]
    pub offline: bool,

    /// Data root; the node default is used when empty
    #[serde(default)]
    pub data_root_dir: String,

    /// Registry images are pulled from
    #[serde(default)]
    pub local_registry: String,

    /// Kubernetes version the pause image was matched against
    #[serde(default)]
    pub kube_version: String,

    /// Pause image tag
    #[serde(default)]
    pub pause_version: String,

    /// Pause image registry
    #[serde(default)]
    pub pause_registry: String,

    /// Use the systemd cgroup driver (re-detected on the node)
    #[serde(default)]
    pub enable_systemd_cgroup: bool,

    /// Trusted registries, sorted by identity key
    #[serde(default)]
    pub registries: Vec<RegistrySpec>,

    /// Registries carrying credentials
    #[serde(default)]
    pub registry_with_auth: Vec<RegistrySpec>,

    #[serde(skip)]
    pub(crate) steps: ActionSteps,
}

#[derive(Serialize)]
struct AuthView {
    host: String,
    username: String,
    password: String,
}

/// Quote a value as a TOML basic string
fn toml_string(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

impl ContainerdRunnable {
    /// Runtime bound to a cluster's runtime settings and registry set
    pub fn from_desired(metadata: &ExtraMetadata, desired: &DesiredState<'_>) -> Result<Self, ComponentError> {
        let runtime = &desired.cluster.container_runtime;
        ConfigSchema::for_version(&runtime.version)?;

        let mut runnable = Self {
            version: runtime.version.clone(),
            offline: metadata.offline,
            data_root_dir: runtime.data_root_dir.clone(),
            local_registry: metadata.local_registry.clone(),
            registries: desired.registries.to_vec(),
            registry_with_auth: filter_with_auth(desired.registries),
            enable_systemd_cgroup: true,
            ..Default::default()
        };

        let (mut pause_version, mut pause_registry) = match_pause_version(&metadata.kube_version);
        runnable.kube_version = metadata.kube_version.clone();
        if pause_version.is_empty() {
            (pause_version, pause_registry) = match_pause_version(&desired.cluster.kubernetes_version);
            runnable.kube_version = desired.cluster.kubernetes_version.clone();
        }
        runnable.pause_version = pause_version;
        runnable.pause_registry = pause_registry;

        info!(
            "containerd {}: {} registries, {} with auth, pause {}/pause:{}",
            runnable.version,
            runnable.registries.len(),
            runnable.registry_with_auth.len(),
            runnable.pause_registry,
            runnable.pause_version
        );
        Ok(runnable)
    }

    /// Fully qualified sandbox image
    pub fn sandbox_image(&self) -> String {
        let registry = if self.local_registry.is_empty() {
            self.pause_registry.as_str()
        } else {
            self.local_registry.as_str()
        };
        let registry = if registry.is_empty() { PAUSE_REGISTRY } else { registry };
        let tag = if self.pause_version.is_empty() {
            DEFAULT_PAUSE_VERSION
        } else {
            self.pause_version.as_str()
        };
        format!("{registry}/pause:{tag}")
    }

    fn data_root<'a>(&'a self, paths: &'a NodePaths) -> &'a Path {
        if self.data_root_dir.is_empty() {
            &paths.containerd_data_dir
        } else {
            Path::new(&self.data_root_dir)
        }
    }

    /// Render `config.toml` for this release
    pub fn render_config(&self, paths: &NodePaths) -> Result<String, ComponentError> {
        let (name, source) = ConfigSchema::for_version(&self.version)?.template();
        let mut tera = Tera::default();
        tera.add_raw_template(name, source)
            .map_err(|e| ComponentError::template(name, e))?;

        let auth: Vec<AuthView> = self
            .registry_with_auth
            .iter()
            .filter_map(|r| {
                r.registry_auth.as_ref().map(|auth| AuthView {
                    host: toml_string(&r.host),
                    username: toml_string(&auth.username),
                    password: toml_string(&auth.password),
                })
            })
            .collect();

        let mut context = Context::new();
        context.insert("data_root_dir", &toml_string(&self.data_root(paths).to_string_lossy()));
        context.insert("state_dir", &toml_string(&paths.containerd_run_dir.to_string_lossy()));
        context.insert("socket", &toml_string(CONTAINERD_SOCKET));
        context.insert("sandbox_image", &toml_string(&self.sandbox_image()));
        context.insert("systemd_cgroup", &self.enable_systemd_cgroup);
        context.insert(
            "config_path",
            &toml_string(&paths.registry_config_dir.to_string_lossy()),
        );
        context.insert("auth_registries", &auth);

        tera.render(name, &context)
            .map_err(|e| ComponentError::template(name, e))
    }

    /// Write `config.toml` and the per-host trust store
    pub async fn setup_config(&self, paths: &NodePaths, dry_run: bool) -> Result<(), ComponentError> {
        let config = self.render_config(paths)?;
        write_atomic(&paths.containerd_config_file(), config.as_bytes(), dry_run).await?;
        if dry_run {
            return Ok(());
        }
        for registry in to_containerd_registry_config(&self.registries).values() {
            registry.render_configs(&paths.registry_config_dir).await?;
        }
        Ok(())
    }

    async fn enable_service(&self, ctx: &NodeContext, dry_run: bool) -> Result<(), ComponentError> {
        if dry_run {
            debug!("dry run: enable and restart {}", CONTAINERD_UNIT);
            return Ok(());
        }
        ctx.services.daemon_reload().await?;
        ctx.services.enable(CONTAINERD_UNIT).await?;
        ctx.services.restart(CONTAINERD_UNIT).await?;
        debug!("{} enabled and restarted", CONTAINERD_UNIT);
        Ok(())
    }

    async fn disable_service(&self, ctx: &NodeContext) {
        if let Err(e) = ctx.services.stop(CONTAINERD_UNIT).await {
            warn!("Failed to stop {}: {}", CONTAINERD_UNIT, e);
        }
        if let Err(e) = ctx.services.disable(CONTAINERD_UNIT).await {
            warn!("Failed to disable {}: {}", CONTAINERD_UNIT, e);
        }
    }

    fn build_steps(&self, nodes: &[StepNode]) -> Result<ActionSteps, ComponentError> {
        ConfigSchema::for_version(&self.version)?;
        let payload = self.to_payload()?;
        Ok(ActionSteps {
            install: vec![custom_step(
                "installRuntime",
                StepAction::Install,
                STEP_TIMEOUT,
                nodes,
                custom_command(KIND, RunnableRole::AgentStep, payload.clone()),
            )],
            uninstall: vec![custom_step(
                "uninstallRuntime",
                StepAction::Uninstall,
                STEP_TIMEOUT,
                nodes,
                custom_command(KIND, RunnableRole::AgentStep, payload),
            )],
            upgrade: Vec::new(),
        })
    }
}

#[async_trait::async_trait]
impl Runnable for ContainerdRunnable {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn version(&self) -> &str {
        &self.version
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
        let mut runnable = Self::from_desired(metadata, desired)?;
        runnable.steps = runnable.build_steps(nodes)?;
        Ok(Box::new(runnable))
    }

    fn install_steps(&self, nodes: &[StepNode], _kube_version: &str) -> Result<Vec<Step>, ComponentError> {
        Ok(self.build_steps(nodes)?.install)
    }

    fn uninstall_steps(&self, nodes: &[StepNode]) -> Result<Vec<Step>, ComponentError> {
        Ok(self.build_steps(nodes)?.uninstall)
    }

    async fn install(&self, ctx: &NodeContext, opts: InstallOptions) -> Result<(), ComponentError> {
        ctx.check_cancelled()?;
        let instance = ctx
            .downloader
            .instance(KIND, &self.version, &ctx.arch, !self.offline, opts.dry_run)?;
        instance.download_and_unpack_configs().await?;
        ctx.check_cancelled()?;

        let mut runtime = self.clone();
        runtime.enable_systemd_cgroup = ctx.systemd_cgroup;
        if !runtime.offline && runtime.local_registry.is_empty() && !ctx.repo_mirror.is_empty() {
            info!("No local registry configured, using mirror proxy {}", ctx.repo_mirror);
            runtime.local_registry = ctx.repo_mirror.clone();
        }

        runtime.setup_config(&ctx.paths, opts.dry_run).await?;
        ctx.check_cancelled()?;
        runtime.enable_service(ctx, opts.dry_run).await?;

        let endpoint = format!("unix://{CONTAINERD_SOCKET}");
        ctx.commands
            .run(opts.dry_run, "crictl", &["config", "runtime-endpoint", &endpoint])
            .await?;
        info!("containerd {} installed (online: {})", self.version, !self.offline);
        Ok(())
    }

    async fn uninstall(&self, ctx: &NodeContext, opts: InstallOptions) -> Result<(), ComponentError> {
        if opts.dry_run {
            debug!("dry run: uninstall containerd {}", self.version);
            return Ok(());
        }

        if let Err(e) = teardown_namespace(ctx.runtime.as_ref(), K8S_NAMESPACE).await {
            warn!("Failed to tear down containers in {}: {}", K8S_NAMESPACE, e);
        }
        ctx.check_cancelled()?;
        self.disable_service(ctx).await;

        match ctx
            .downloader
            .instance(KIND, &self.version, &ctx.arch, !self.offline, false)
        {
            Ok(instance) => {
                if let Err(e) = instance.remove_configs().await {
                    warn!("Failed to remove containerd configs: {}", e);
                }
            }
            Err(e) => warn!("Failed to resolve containerd artifacts: {}", e),
        }

        let data_root = self.data_root(&ctx.paths).to_path_buf();
        for dir in [
            ctx.paths.containerd_run_dir.as_path(),
            data_root.as_path(),
            ctx.paths.containerd_config_dir.as_path(),
        ] {
            match remove_dir_all_if_exists(dir).await {
                Ok(()) => debug!("Removed {}", dir.display()),
                Err(e) => warn!("Failed to remove {}: {}", dir.display(), e),
            }
        }

        if let Err(e) = ctx.services.daemon_reload().await {
            warn!("Failed to reload systemd daemon: {}", e);
        }
        info!("containerd {} uninstalled", self.version);
        Ok(())
    }

    fn action_steps(&self, action: StepAction) -> &[Step] {
        self.steps.get(action)
    }

    fn to_payload(&self) -> Result<Vec<u8>, ComponentError> {
        Ok(serde_json::to_vec(self)?)
    }
}
