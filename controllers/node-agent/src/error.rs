//! Agent error types.

use components::ComponentError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while executing a step on this node.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Component execution failed
    #[error("Component error: {0}")]
    Component(#[from] ComponentError),

    /// A step attempt exceeded the step timeout
    #[error("step {step} timed out after {timeout:?}")]
    Timeout {
        /// Step name
        step: String,
        /// Step timeout
        timeout: Duration,
    },

    /// The step file could not be read
    #[error("failed to read step file {path}: {source}")]
    StepFile {
        /// Step file path
        path: PathBuf,
        /// Read failure
        #[source]
        source: std::io::Error,
    },

    /// The step file is not a valid step
    #[error("failed to decode step: {0}")]
    Decode(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
