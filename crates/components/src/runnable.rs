//! The installable component contract
//!
//! A [`Runnable`] has two lives. On the controller it is initialised from
//! desired cluster state ([`Runnable::init_step`]) and produces the ordered
//! [`Step`]s of each action. On the node the agent decodes the step payload
//! back into the same concrete type and calls [`Runnable::install`],
//! [`Runnable::uninstall`] or [`Runnable::render`].

use crate::component_registry::{RegisterKey, RunnableRole};
use crate::constants::COMPONENT_VERSION;
use crate::error::ComponentError;
use crate::metadata::{DesiredState, ExtraMetadata};
use crate::node::{InstallOptions, NodeContext};
use crds::{Command, Step, StepAction, StepNode};
use std::time::Duration;

/// An installable node component
#[async_trait::async_trait]
pub trait Runnable: Send + Sync + std::fmt::Debug {
    /// Stable component kind, also the registration key kind
    fn kind(&self) -> &'static str;

    /// Component version carried by this instance
    fn version(&self) -> &str;

    /// Zero-value instance of the same concrete type
    fn new_instance(&self) -> Box<dyn Runnable>;

    /// Instance bound to the desired state, with its action steps computed.
    ///
    /// Calling it twice with the same inputs yields steps with identical
    /// content and fresh ids.
    fn init_step(
        &self,
        metadata: &ExtraMetadata,
        desired: &DesiredState<'_>,
        nodes: &[StepNode],
    ) -> Result<Box<dyn Runnable>, ComponentError>;

    /// Ordered install steps for `nodes`
    fn install_steps(&self, nodes: &[StepNode], kube_version: &str) -> Result<Vec<Step>, ComponentError>;

    /// Ordered uninstall steps for `nodes`
    fn uninstall_steps(&self, nodes: &[StepNode]) -> Result<Vec<Step>, ComponentError>;

    /// Ordered upgrade steps for `nodes`
    fn upgrade_steps(&self, _nodes: &[StepNode]) -> Result<Vec<Step>, ComponentError> {
        Err(ComponentError::Unsupported {
            kind: self.kind().to_string(),
            action: StepAction::Upgrade.to_string(),
        })
    }

    /// Install on the local node. Safe to re-run after a partial failure.
    async fn install(&self, ctx: &NodeContext, opts: InstallOptions) -> Result<(), ComponentError>;

    /// Uninstall from the local node
    async fn uninstall(&self, ctx: &NodeContext, opts: InstallOptions) -> Result<(), ComponentError>;

    /// Render files on the local node (template components only)
    async fn render(&self, _ctx: &NodeContext, _opts: InstallOptions) -> Result<(), ComponentError> {
        Err(ComponentError::Unsupported {
            kind: self.kind().to_string(),
            action: "render".to_string(),
        })
    }

    /// Steps computed by [`Runnable::init_step`] for `action`
    fn action_steps(&self, action: StepAction) -> &[Step];

    /// Serialized snapshot used as custom command payload
    fn to_payload(&self) -> Result<Vec<u8>, ComponentError>;
}

/// Steps computed per action
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionSteps {
    /// Install steps
    pub install: Vec<Step>,
    /// Uninstall steps
    pub uninstall: Vec<Step>,
    /// Upgrade steps
    pub upgrade: Vec<Step>,
}

impl ActionSteps {
    /// Steps of one action
    pub fn get(&self, action: StepAction) -> &[Step] {
        match action {
            StepAction::Install => &self.install,
            StepAction::Uninstall => &self.uninstall,
            StepAction::Upgrade => &self.upgrade,
        }
    }
}

/// Custom command addressed to the built-in handler of `kind` in `role`
pub fn custom_command(kind: &str, role: RunnableRole, payload: Vec<u8>) -> Command {
    let key = RegisterKey::new(kind, COMPONENT_VERSION, role);
    Command::custom(key.identity(), payload)
}

/// Single-command step carrying a component payload
pub fn custom_step(
    name: &str,
    action: StepAction,
    timeout: Duration,
    nodes: &[StepNode],
    command: Command,
) -> Step {
    Step::new(name, action, timeout)
        .with_nodes(nodes)
        .with_retry_times(1)
        .with_command(command)
}

/// Single-command shell step
pub fn shell_step<I, S>(name: &str, action: StepAction, timeout: Duration, nodes: &[StepNode], args: I) -> Step
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Step::new(name, action, timeout)
        .with_nodes(nodes)
        .with_retry_times(1)
        .with_command(Command::shell(args))
}
