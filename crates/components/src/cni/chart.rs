//! Packaged Helm chart staging

use crate::component_registry::RunnableRole;
use crate::constants::NodePaths;
use crate::error::ComponentError;
use crate::metadata::{DesiredState, ExtraMetadata};
use crate::node::download::CHART_ARCHIVE;
use crate::node::{InstallOptions, NodeContext};
use crate::runnable::{ActionSteps, Runnable, custom_command, custom_step};
use crds::{Step, StepAction, StepNode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Component kind
pub const KIND: &str = "chart";

const STEP_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Stages a packaged chart on the node for a later `helm` release
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartRunnable {
    /// Chart package name
    pub pkg_name: String,
    /// Chart version
    pub version: String,
    /// Chart is pre-staged on the node
    #[serde(default)]
    pub offline: bool,

    #[serde(skip)]
    steps: ActionSteps,
}

impl ChartRunnable {
    /// Chart `pkg_name` at `version`
    pub fn new(pkg_name: &str, version: &str, offline: bool) -> Self {
        Self {
            pkg_name: pkg_name.to_string(),
            version: version.to_string(),
            offline,
            steps: ActionSteps::default(),
        }
    }

    /// Where the staged chart lands on a node with layout `paths`
    pub fn chart_path(&self, paths: &NodePaths) -> PathBuf {
        paths.artifact_dir(&self.pkg_name, &self.version).join(CHART_ARCHIVE)
    }

    fn build_steps(&self, nodes: &[StepNode]) -> Result<ActionSteps, ComponentError> {
        let payload = self.to_payload()?;
        Ok(ActionSteps {
            install: vec![custom_step(
                &format!("downloadChart-{}", self.pkg_name),
                StepAction::Install,
                STEP_TIMEOUT,
                nodes,
                custom_command(KIND, RunnableRole::AgentStep, payload.clone()),
            )],
            uninstall: vec![custom_step(
                &format!("removeChart-{}", self.pkg_name),
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
impl Runnable for ChartRunnable {
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
        let mut chart = Self::new(&cni.cni_type, &cni.version, metadata.offline || cni.offline);
        chart.steps = chart.build_steps(nodes)?;
        Ok(Box::new(chart))
    }

    fn install_steps(&self, nodes: &[StepNode], _kube_version: &str) -> Result<Vec<Step>, ComponentError> {
        Ok(self.build_steps(nodes)?.install)
    }

    fn uninstall_steps(&self, nodes: &[StepNode]) -> Result<Vec<Step>, ComponentError> {
        Ok(self.build_steps(nodes)?.uninstall)
    }

    async fn install(&self, ctx: &NodeContext, opts: InstallOptions) -> Result<(), ComponentError> {
        ctx.check_cancelled()?;
        let chart = ctx
            .downloader
            .instance(&self.pkg_name, &self.version, &ctx.arch, !self.offline, opts.dry_run)?
            .download_chart()
            .await?;
        debug!("Chart {} {} staged at {}", self.pkg_name, self.version, chart.display());
        Ok(())
    }

    async fn uninstall(&self, ctx: &NodeContext, opts: InstallOptions) -> Result<(), ComponentError> {
        let instance = ctx
            .downloader
            .instance(&self.pkg_name, &self.version, &ctx.arch, !self.offline, opts.dry_run)?;
        if let Err(e) = instance.remove_chart().await {
            warn!("Failed to remove chart {} {}: {}", self.pkg_name, self.version, e);
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
    use crate::node::fake::FakeNode;
    use std::path::Path;

    #[test]
    fn test_chart_path() {
        let chart = ChartRunnable::new("calico", "v3.26.1", false);
        assert_eq!(
            chart.chart_path(&NodePaths::default()),
            Path::new("/tmp/.nodesmith/.calico/v3.26.1/charts.tgz")
        );
    }

    #[tokio::test]
    async fn test_install_and_uninstall() {
        let node = FakeNode::default();
        let ctx = node.context(NodePaths::default());
        let chart = ChartRunnable::new("calico", "v3.26.1", false);

        chart.install(&ctx, InstallOptions::default()).await.unwrap();
        chart.uninstall(&ctx, InstallOptions::default()).await.unwrap();

        assert_eq!(
            node.downloader.calls(),
            vec![
                "instance calico v3.26.1 amd64 online=true",
                "chart calico v3.26.1",
                "instance calico v3.26.1 amd64 online=true",
                "remove-chart calico v3.26.1",
            ]
        );
    }

    #[test]
    fn test_steps() {
        let steps = ChartRunnable::new("calico", "v3.26.1", true).install_steps(&[], "v1.28.4").unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].name, "downloadChart-calico");
        assert_eq!(steps[0].commands[0].identity, "chart/v1/step");
    }
}
