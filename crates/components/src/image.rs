//! Image bundle side-loading
//!
//! Offline clusters without a local registry receive component images as a
//! tarball that is imported straight into the kubelet's containerd namespace.

use crate::component_registry::RunnableRole;
use crate::constants::{CONTAINERD_SOCKET, K8S_NAMESPACE};
use crate::error::ComponentError;
use crate::metadata::{DesiredState, ExtraMetadata};
use crate::node::{InstallOptions, NodeContext};
use crate::runnable::{ActionSteps, Runnable, custom_command, custom_step};
use crds::{Step, StepAction, StepNode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Component kind
pub const KIND: &str = "image";

const STEP_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Loads the image bundle of one component version
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageLoader {
    /// Component whose images are loaded
    pub component: String,
    /// Component version
    pub version: String,
    /// Bundle is pre-staged on the node
    #[serde(default)]
    pub offline: bool,

    #[serde(skip)]
    steps: ActionSteps,
}

impl ImageLoader {
    /// Loader for `component` at `version`
    pub fn new(component: &str, version: &str, offline: bool) -> Self {
        Self {
            component: component.to_string(),
            version: version.to_string(),
            offline,
            steps: ActionSteps::default(),
        }
    }

    fn step(&self, name: &str, action: StepAction, nodes: &[StepNode]) -> Result<Step, ComponentError> {
        Ok(custom_step(
            &format!("{name}-{}", self.component),
            action,
            STEP_TIMEOUT,
            nodes,
            custom_command(KIND, RunnableRole::AgentStep, self.to_payload()?),
        ))
    }

    /// Step importing the bundle
    pub fn load_step(&self, nodes: &[StepNode]) -> Result<Step, ComponentError> {
        self.step("loadImages", StepAction::Install, nodes)
    }

    /// Step removing the staged bundle
    pub fn remove_step(&self, nodes: &[StepNode]) -> Result<Step, ComponentError> {
        self.step("removeImages", StepAction::Uninstall, nodes)
    }
}

#[async_trait::async_trait]
impl Runnable for ImageLoader {
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
        let cni = &desired.cluster.cni;
        let mut loader = Self::new(&cni.cni_type, &cni.version, metadata.offline || cni.offline);
        loader.steps = ActionSteps {
            install: vec![loader.load_step(nodes)?],
            uninstall: vec![loader.remove_step(nodes)?],
            upgrade: Vec::new(),
        };
        Ok(Box::new(loader))
    }

    fn install_steps(&self, nodes: &[StepNode], _kube_version: &str) -> Result<Vec<Step>, ComponentError> {
        Ok(vec![self.load_step(nodes)?])
    }

    fn uninstall_steps(&self, nodes: &[StepNode]) -> Result<Vec<Step>, ComponentError> {
        Ok(vec![self.remove_step(nodes)?])
    }

    async fn install(&self, ctx: &NodeContext, opts: InstallOptions) -> Result<(), ComponentError> {
        ctx.check_cancelled()?;
        let instance = ctx
            .downloader
            .instance(&self.component, &self.version, &ctx.arch, !self.offline, opts.dry_run)?;
        let archive = instance.download_images().await?;
        ctx.check_cancelled()?;

        let archive = archive.to_string_lossy().into_owned();
        ctx.commands
            .run(
                opts.dry_run,
                "ctr",
                &["--address", CONTAINERD_SOCKET, "-n", K8S_NAMESPACE, "images", "import", archive.as_str()],
            )
            .await?;
        info!("Imported {} {} images from {}", self.component, self.version, archive);
        Ok(())
    }

    async fn uninstall(&self, ctx: &NodeContext, opts: InstallOptions) -> Result<(), ComponentError> {
        let instance = ctx
            .downloader
            .instance(&self.component, &self.version, &ctx.arch, !self.offline, opts.dry_run)?;
        if let Err(e) = instance.remove_images().await {
            warn!("Failed to remove {} {} images: {}", self.component, self.version, e);
        }
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
    use crate::node::fake::FakeNode;

    #[tokio::test]
    async fn test_install_imports_bundle() {
        let node = FakeNode::default();
        let ctx = node.context(NodePaths::default());

        ImageLoader::new("calico", "v3.26.1", true)
            .install(&ctx, InstallOptions::default())
            .await
            .unwrap();

        assert_eq!(
            node.downloader.calls(),
            vec!["instance calico v3.26.1 amd64 online=false", "images calico v3.26.1"]
        );
        assert_eq!(
            node.commands.command_lines(),
            vec![
                "ctr --address /run/containerd/containerd.sock -n k8s.io images import /fake/calico/v3.26.1/images.tar.gz"
            ]
        );
    }

    #[tokio::test]
    async fn test_download_failure_skips_import() {
        let node = FakeNode::default();
        node.downloader.fail("images");
        let ctx = node.context(NodePaths::default());

        let err = ImageLoader::new("calico", "v3.26.1", true)
            .install(&ctx, InstallOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ComponentError::Download(_)));
        assert!(node.commands.calls().is_empty());
    }

    #[tokio::test]
    async fn test_uninstall_tolerates_missing_bundle() {
        let node = FakeNode::default();
        node.downloader.fail("remove-images");
        let ctx = node.context(NodePaths::default());

        ImageLoader::new("calico", "v3.26.1", true)
            .uninstall(&ctx, InstallOptions::default())
            .await
            .unwrap();
        assert_eq!(node.downloader.calls().last().map(String::as_str), Some("remove-images calico v3.26.1"));
    }

    #[test]
    fn test_steps_carry_loader_payload() {
        let loader = ImageLoader::new("calico", "v3.26.1", true);
        let step = loader.load_step(&[]).unwrap();
        assert_eq!(step.name, "loadImages-calico");
        assert_eq!(step.commands[0].identity, "image/v1/step");

        let decoded: ImageLoader = serde_json::from_slice(&step.commands[0].custom_command).unwrap();
        assert_eq!(decoded, loader);
        assert_eq!(loader.remove_step(&[]).unwrap().action, StepAction::Uninstall);
    }
}
