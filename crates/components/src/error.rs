//! Error types for component step generation and node-side execution

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by components
#[derive(Debug, Error)]
pub enum ComponentError {
    /// Version outside the closed set a component supports
    #[error("{kind} does not support version {version}")]
    UnsupportedVersion {
        /// Component kind
        kind: String,
        /// Requested version
        version: String,
    },

    /// Desired state a component cannot be built from
    #[error("Invalid {kind} spec: {message}")]
    InvalidSpec {
        /// Component kind
        kind: String,
        /// What is wrong
        message: String,
    },

    /// No handler registered under a command identity
    #[error("No component registered for identity {0}")]
    UnknownIdentity(String),

    /// A handler is already registered under this identity
    #[error("Component already registered for identity {0}")]
    DuplicateRegistration(String),

    /// Malformed step command
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Payload (de)serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Template rendering failure
    #[error("Template error in {name}: {source}")]
    Template {
        /// Template name
        name: String,
        /// Underlying error
        #[source]
        source: tera::Error,
    },

    /// TOML encoding failure
    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// Filesystem failure
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Command exited unsuccessfully
    #[error("Command {program} failed: {output}")]
    Command {
        /// Program name
        program: String,
        /// Combined output or spawn error
        output: String,
    },

    /// Service manager failure
    #[error("Service {unit} {operation} failed: {message}")]
    Service {
        /// Unit name
        unit: String,
        /// Operation attempted (enable, restart, ...)
        operation: String,
        /// Failure detail
        message: String,
    },

    /// Artifact download or unpack failure
    #[error("Download error: {0}")]
    Download(String),

    /// Container runtime failure
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Execution cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Action not supported by a component
    #[error("{kind} does not support {action}")]
    Unsupported {
        /// Component kind
        kind: String,
        /// Action requested
        action: String,
    },
}

impl ComponentError {
    /// Filesystem error with the path that failed
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ComponentError::Io {
            path: path.into(),
            source,
        }
    }

    /// Invalid spec error for a component kind
    pub fn invalid_spec(kind: &str, message: impl Into<String>) -> Self {
        ComponentError::InvalidSpec {
            kind: kind.to_string(),
            message: message.into(),
        }
    }

    /// Template error with the template name
    pub fn template(name: &str, source: tera::Error) -> Self {
        ComponentError::Template {
            name: name.to_string(),
            source,
        }
    }
}

/// Errors raised by the container runtime client
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The container or task no longer exists
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other runtime failure
    #[error("Runtime command failed: {0}")]
    Command(String),
}

impl RuntimeError {
    /// Whether the runtime reported the object as missing
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound(_))
    }
}
