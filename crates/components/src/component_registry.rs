//! Component registry
//!
//! Maps the identity carried by a custom command (`kind/version/role`) to the
//! concrete [`Runnable`] type that can decode its payload. The registry is an
//! explicit value built at process start and passed to whatever dispatches
//! steps.

use crate::cni::calico::CalicoRunnable;
use crate::cni::chart::ChartRunnable;
use crate::constants::COMPONENT_VERSION;
use crate::cri::containerd::ContainerdRunnable;
use crate::cri::trust_store::ContainerdRegistryConfigure;
use crate::error::ComponentError;
use crate::image::ImageLoader;
use crate::node::{InstallOptions, NodeContext};
use crate::runnable::Runnable;
use crds::{Command, CommandType, Step, StepAction};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

/// How the agent invokes a registered component
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RunnableRole {
    /// Renders files (`render`)
    Template,
    /// Performs the step action (`install` / `uninstall`)
    AgentStep,
}

impl fmt::Display for RunnableRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnableRole::Template => write!(f, "template"),
            RunnableRole::AgentStep => write!(f, "step"),
        }
    }
}

/// Registration key of a component handler
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegisterKey {
    /// Component kind
    pub kind: String,
    /// Payload schema version
    pub version: String,
    /// Invocation role
    pub role: RunnableRole,
}

impl RegisterKey {
    /// Build a key
    pub fn new(kind: &str, version: &str, role: RunnableRole) -> Self {
        Self {
            kind: kind.to_string(),
            version: version.to_string(),
            role,
        }
    }

    /// Identity string carried by custom commands: `kind/version/role`
    pub fn identity(&self) -> String {
        format!("{}/{}/{}", self.kind, self.version, self.role)
    }

    /// Parse an identity string
    pub fn parse(identity: &str) -> Option<Self> {
        let mut parts = identity.rsplitn(3, '/');
        let role = match parts.next()? {
            "template" => RunnableRole::Template,
            "step" => RunnableRole::AgentStep,
            _ => return None,
        };
        let version = parts.next()?;
        let kind = parts.next()?;
        if kind.is_empty() || version.is_empty() {
            return None;
        }
        Some(Self::new(kind, version, role))
    }
}

type NewFn = fn() -> Box<dyn Runnable>;
type DecodeFn = fn(&[u8]) -> Result<Box<dyn Runnable>, ComponentError>;

#[derive(Clone, Copy)]
struct Entry {
    role: RunnableRole,
    new: NewFn,
    decode: DecodeFn,
}

fn new_as<T: Runnable + Default + 'static>() -> Box<dyn Runnable> {
    Box::new(T::default())
}

fn decode_as<T: Runnable + DeserializeOwned + 'static>(payload: &[u8]) -> Result<Box<dyn Runnable>, ComponentError> {
    Ok(Box::new(serde_json::from_slice::<T>(payload)?))
}

/// Registry of component handlers keyed by identity
#[derive(Default, Clone)]
pub struct ComponentRegistry {
    entries: BTreeMap<String, Entry>,
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("identities", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ComponentRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in component
    pub fn with_defaults() -> Result<Self, ComponentError> {
        let mut registry = Self::new();
        registry.register::<ContainerdRunnable>(RegisterKey::new(
            crate::cri::containerd::KIND,
            COMPONENT_VERSION,
            RunnableRole::AgentStep,
        ))?;
        registry.register::<ContainerdRegistryConfigure>(RegisterKey::new(
            crate::cri::trust_store::KIND,
            COMPONENT_VERSION,
            RunnableRole::AgentStep,
        ))?;
        registry.register::<CalicoRunnable>(RegisterKey::new(
            crate::cni::calico::KIND,
            COMPONENT_VERSION,
            RunnableRole::Template,
        ))?;
        registry.register::<CalicoRunnable>(RegisterKey::new(
            crate::cni::calico::KIND,
            COMPONENT_VERSION,
            RunnableRole::AgentStep,
        ))?;
        registry.register::<ChartRunnable>(RegisterKey::new(
            crate::cni::chart::KIND,
            COMPONENT_VERSION,
            RunnableRole::AgentStep,
        ))?;
        registry.register::<ImageLoader>(RegisterKey::new(
            crate::image::KIND,
            COMPONENT_VERSION,
            RunnableRole::AgentStep,
        ))?;
        info!("Registered {} component handlers", registry.entries.len());
        Ok(registry)
    }

    /// Register `T` under `key`. Fails if the identity is taken.
    pub fn register<T>(&mut self, key: RegisterKey) -> Result<(), ComponentError>
    where
        T: Runnable + DeserializeOwned + Default + 'static,
    {
        let identity = key.identity();
        if self.entries.contains_key(&identity) {
            return Err(ComponentError::DuplicateRegistration(identity));
        }
        debug!("Registering component handler {}", identity);
        self.entries.insert(
            identity,
            Entry {
                role: key.role,
                new: new_as::<T>,
                decode: decode_as::<T>,
            },
        );
        Ok(())
    }

    /// Registered identities, sorted
    pub fn identities(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Zero-value instance registered under `identity`
    pub fn new_instance(&self, identity: &str) -> Result<Box<dyn Runnable>, ComponentError> {
        self.entry(identity).map(|entry| (entry.new)())
    }

    /// Decode a custom command payload into the registered type
    pub fn decode(&self, identity: &str, payload: &[u8]) -> Result<(RunnableRole, Box<dyn Runnable>), ComponentError> {
        let entry = self.entry(identity)?;
        let runnable = (entry.decode)(payload)?;
        Ok((entry.role, runnable))
    }

    fn entry(&self, identity: &str) -> Result<&Entry, ComponentError> {
        self.entries
            .get(identity)
            .ok_or_else(|| ComponentError::UnknownIdentity(identity.to_string()))
    }

    /// Execute one command of a step with the given action
    pub async fn execute(
        &self,
        command: &Command,
        action: StepAction,
        ctx: &NodeContext,
        opts: InstallOptions,
    ) -> Result<(), ComponentError> {
        command.validate().map_err(ComponentError::InvalidCommand)?;
        match command.command_type {
            CommandType::Shell => {
                let (program, args) = command
                    .shell_command
                    .split_first()
                    .ok_or_else(|| ComponentError::InvalidCommand("empty shell command".to_string()))?;
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                let output = ctx.commands.run(opts.dry_run, program, &args).await?;
                debug!("{} output: {}", program, output.combined());
                Ok(())
            }
            CommandType::Custom => {
                let (role, runnable) = self.decode(&command.identity, &command.custom_command)?;
                debug!(
                    "Executing {} {} ({}) as {}",
                    runnable.kind(),
                    runnable.version(),
                    action,
                    role
                );
                match (role, action) {
                    (RunnableRole::Template, _) => runnable.render(ctx, opts).await,
                    (RunnableRole::AgentStep, StepAction::Install) => runnable.install(ctx, opts).await,
                    (RunnableRole::AgentStep, StepAction::Uninstall) => runnable.uninstall(ctx, opts).await,
                    (RunnableRole::AgentStep, StepAction::Upgrade) => Err(ComponentError::Unsupported {
                        kind: runnable.kind().to_string(),
                        action: action.to_string(),
                    }),
                }
            }
        }
    }

    /// Execute every command of a step in order, stopping at the first error
    pub async fn execute_step(&self, step: &Step, ctx: &NodeContext, opts: InstallOptions) -> Result<(), ComponentError> {
        info!("Executing step {} ({}, {} commands)", step.name, step.id, step.commands.len());
        for command in &step.commands {
            ctx.check_cancelled()?;
            self.execute(command, step.action, ctx, opts).await?;
        }
        Ok(())
    }
}
