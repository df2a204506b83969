//! Execution step model
//!
//! A [`Step`] is the unit of work shipped to one or more nodes. Steps are
//! produced by component step generation, recorded on the cluster status and
//! consumed read-only by the dispatch layer and the node agent.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Action a step performs on its nodes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "PascalCase")]
pub enum StepAction {
    /// Install a component
    Install,

    /// Uninstall a component
    Uninstall,

    /// Upgrade a component in place
    Upgrade,
}

impl std::fmt::Display for StepAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepAction::Install => write!(f, "install"),
            StepAction::Uninstall => write!(f, "uninstall"),
            StepAction::Upgrade => write!(f, "upgrade"),
        }
    }
}

/// Command payload discriminator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum CommandType {
    /// Argument vector executed by the node shell
    Shell,

    /// Serialized component state interpreted by a registered component handler
    Custom,
}

/// Target node of a step
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StepNode {
    /// Node identifier (the `Node` resource name)
    pub id: String,

    /// Primary IPv4 address
    #[serde(default)]
    pub ipv4: String,

    /// Hostname
    #[serde(default)]
    pub hostname: String,
}

/// A single command inside a step.
///
/// Exactly one of `shell_command` / `custom_command` is populated, selected by
/// `command_type`. Use [`Command::shell`] or [`Command::custom`] to build one.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    /// Which payload is populated
    #[serde(rename = "type")]
    pub command_type: CommandType,

    /// Argument vector (Shell only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shell_command: Vec<String>,

    /// Serialized component payload (Custom only), base64 on the wire
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "base64_bytes")]
    #[schemars(with = "String")]
    pub custom_command: Vec<u8>,

    /// Registration key of the component handler (Custom only)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub identity: String,
}

impl Command {
    /// Shell command from an argument vector
    pub fn shell<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command_type: CommandType::Shell,
            shell_command: args.into_iter().map(Into::into).collect(),
            custom_command: Vec::new(),
            identity: String::new(),
        }
    }

    /// Custom command interpreted by the handler registered under `identity`
    pub fn custom(identity: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            command_type: CommandType::Custom,
            shell_command: Vec::new(),
            custom_command: payload,
            identity: identity.into(),
        }
    }

    /// Check that exactly the payload matching `command_type` is populated
    pub fn validate(&self) -> Result<(), String> {
        match self.command_type {
            CommandType::Shell => {
                if self.shell_command.is_empty() {
                    return Err("shell command has no arguments".to_string());
                }
                if !self.custom_command.is_empty() {
                    return Err("shell command carries a custom payload".to_string());
                }
            }
            CommandType::Custom => {
                if self.identity.is_empty() {
                    return Err("custom command has no identity".to_string());
                }
                if !self.shell_command.is_empty() {
                    return Err("custom command carries shell arguments".to_string());
                }
            }
        }
        Ok(())
    }
}

/// An atomic, node-targeted unit of work
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Fresh per construction, never reused across reconciliation runs
    #[schemars(with = "String")]
    pub id: Uuid,

    /// Human readable step name
    pub name: String,

    /// Execution timeout, serialized as whole seconds
    #[serde(with = "duration_secs")]
    #[schemars(with = "u64")]
    pub timeout: Duration,

    /// Whether the executor may ignore a failure of this step
    #[serde(default)]
    pub err_ignore: bool,

    /// Number of retries the executor may attempt
    #[serde(default)]
    pub retry_times: u32,

    /// Target nodes, in order
    #[serde(default)]
    pub nodes: Vec<StepNode>,

    /// Action performed
    pub action: StepAction,

    /// Commands executed in order
    #[serde(default)]
    pub commands: Vec<Command>,
}

impl Step {
    /// New step with a freshly generated id, no retries and errors not ignored
    pub fn new(name: impl Into<String>, action: StepAction, timeout: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            timeout,
            err_ignore: false,
            retry_times: 0,
            nodes: Vec::new(),
            action,
            commands: Vec::new(),
        }
    }

    /// Set the target nodes
    #[must_use]
    pub fn with_nodes(mut self, nodes: &[StepNode]) -> Self {
        self.nodes = nodes.to_vec();
        self
    }

    /// Set the retry count
    #[must_use]
    pub fn with_retry_times(mut self, retry_times: u32) -> Self {
        self.retry_times = retry_times;
        self
    }

    /// Mark the step as error tolerant
    #[must_use]
    pub fn ignore_errors(mut self) -> Self {
        self.err_ignore = true;
        self
    }

    /// Append a command
    #[must_use]
    pub fn with_command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Structural comparison that ignores the generated id
    pub fn same_content(&self, other: &Step) -> bool {
        self.name == other.name
            && self.timeout == other.timeout
            && self.err_ignore == other.err_ignore
            && self.retry_times == other.retry_times
            && self.nodes == other.nodes
            && self.action == other.action
            && self.commands == other.commands
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> StepNode {
        StepNode {
            id: id.to_string(),
            ipv4: "10.0.0.1".to_string(),
            hostname: id.to_string(),
        }
    }

    #[test]
    fn test_steps_get_fresh_ids() {
        let a = Step::new("installRuntime", StepAction::Install, Duration::from_secs(600));
        let b = Step::new("installRuntime", StepAction::Install, Duration::from_secs(600));
        assert_ne!(a.id, b.id);
        assert!(a.same_content(&b));
    }

    #[test]
    fn test_custom_command_wire_format() {
        let step = Step::new("installRuntime", StepAction::Install, Duration::from_secs(600))
            .with_nodes(&[node("node-1")])
            .with_retry_times(1)
            .with_command(Command::custom("containerd/v1/step", b"{\"version\":\"1.7.13\"}".to_vec()));

        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["timeout"], 600);
        assert_eq!(value["action"], "Install");
        assert_eq!(value["commands"][0]["type"], "Custom");
        assert!(value["commands"][0]["customCommand"].is_string());
        assert!(value["commands"][0].get("shellCommand").is_none());

        let decoded: Step = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, step);
    }

    #[test]
    fn test_command_validate() {
        assert!(Command::shell(["rm", "-rf", "/tmp/x"]).validate().is_ok());
        assert!(Command::custom("calico/v1/step", vec![1]).validate().is_ok());

        let empty_shell = Command::shell(Vec::<String>::new());
        assert!(empty_shell.validate().is_err());

        let mut mixed = Command::custom("calico/v1/step", vec![1]);
        mixed.shell_command.push("ls".to_string());
        assert!(mixed.validate().is_err());

        let anonymous = Command::custom("", vec![1]);
        assert!(anonymous.validate().is_err());
    }
}
