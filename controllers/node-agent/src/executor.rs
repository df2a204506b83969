//! Step execution with the step's timeout and retry policy.

use crate::error::AgentError;
use components::{ComponentError, ComponentRegistry, InstallOptions, NodeContext};
use crds::Step;
use std::path::Path;
use tracing::{info, warn};

/// Read a step serialized as JSON
pub async fn load_step(path: &Path) -> Result<Step, AgentError> {
    let raw = tokio::fs::read(path).await.map_err(|source| AgentError::StepFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Run `step` on this node.
///
/// Each attempt is bounded by the step timeout and a failed attempt is
/// retried up to `retry_times` times. Cancellation is never retried. A step
/// marked `err_ignore` reports success after its last failed attempt.
pub async fn run_step(
    registry: &ComponentRegistry,
    step: &Step,
    ctx: &NodeContext,
    opts: InstallOptions,
) -> Result<(), AgentError> {
    let attempts = step.retry_times.saturating_add(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        let result = match tokio::time::timeout(step.timeout, registry.execute_step(step, ctx, opts)).await {
            Ok(result) => result.map_err(AgentError::from),
            Err(_) => Err(AgentError::Timeout {
                step: step.name.clone(),
                timeout: step.timeout,
            }),
        };

        match result {
            Ok(()) => {
                info!("Step {} succeeded (attempt {}/{})", step.name, attempt, attempts);
                return Ok(());
            }
            Err(AgentError::Component(ComponentError::Cancelled)) => {
                warn!("Step {} cancelled", step.name);
                return Err(ComponentError::Cancelled.into());
            }
            Err(e) => {
                warn!("Step {} failed (attempt {}/{}): {}", step.name, attempt, attempts, e);
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if step.err_ignore => {
            warn!("(ignored) Step {} failed: {}", step.name, e);
            Ok(())
        }
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use components::NodePaths;
    use components::node::fake::FakeNode;
    use crds::{Command, StepAction};
    use std::time::Duration;

    fn shell_step(args: &[&str]) -> Step {
        Step::new("probe", StepAction::Install, Duration::from_secs(5)).with_command(Command::shell(args.iter().copied()))
    }

    #[tokio::test]
    async fn test_shell_step_runs_once() {
        let node = FakeNode::default();
        let ctx = node.context(NodePaths::default());
        let registry = ComponentRegistry::with_defaults().unwrap();

        run_step(&registry, &shell_step(&["echo", "hi"]), &ctx, InstallOptions::default())
            .await
            .unwrap();
        assert_eq!(node.commands.command_lines(), vec!["echo hi"]);
    }

    #[tokio::test]
    async fn test_failed_step_is_retried() {
        let node = FakeNode::default();
        node.commands.fail_on("false", "exit status 1");
        let ctx = node.context(NodePaths::default());
        let registry = ComponentRegistry::with_defaults().unwrap();

        let step = shell_step(&["false"]).with_retry_times(2);
        assert!(run_step(&registry, &step, &ctx, InstallOptions::default()).await.is_err());
        assert_eq!(node.commands.command_lines().len(), 3);
    }

    #[tokio::test]
    async fn test_ignored_failure_succeeds() {
        let node = FakeNode::default();
        node.commands.fail_on("rm -rf", "permission denied");
        let ctx = node.context(NodePaths::default());
        let registry = ComponentRegistry::with_defaults().unwrap();

        let step = shell_step(&["rm", "-rf", "/etc/kubernetes"]).ignore_errors();
        run_step(&registry, &step, &ctx, InstallOptions::default()).await.unwrap();
        assert_eq!(node.commands.command_lines().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_step_is_not_retried() {
        let node = FakeNode::default();
        let ctx = node.context(NodePaths::default());
        ctx.cancel.cancel();
        let registry = ComponentRegistry::with_defaults().unwrap();

        let step = shell_step(&["echo", "hi"]).with_retry_times(3);
        let err = run_step(&registry, &step, &ctx, InstallOptions::default()).await.unwrap_err();
        assert!(matches!(err, AgentError::Component(ComponentError::Cancelled)));
        assert!(node.commands.command_lines().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_component_fails() {
        let node = FakeNode::default();
        let ctx = node.context(NodePaths::default());
        let registry = ComponentRegistry::with_defaults().unwrap();

        let step = Step::new("custom", StepAction::Install, Duration::from_secs(5))
            .with_command(Command::custom("nothing/v1/step", b"{}".to_vec()));
        let err = run_step(&registry, &step, &ctx, InstallOptions::default()).await.unwrap_err();
        assert!(matches!(err, AgentError::Component(ComponentError::UnknownIdentity(_))));
    }

    #[tokio::test]
    async fn test_load_step_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("step.json");
        let step = shell_step(&["echo", "hi"]);
        std::fs::write(&path, serde_json::to_vec(&step).unwrap()).unwrap();

        assert_eq!(load_step(&path).await.unwrap(), step);
        assert!(matches!(
            load_step(&dir.path().join("missing.json")).await,
            Err(AgentError::StepFile { .. })
        ));
    }
}
