//! Node-side collaborators
//!
//! Components executed by the node agent reach the host only through these
//! traits, so every install/uninstall path can run against fakes.

pub mod command;
pub mod download;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod runtime;
pub mod service;

pub use command::{CommandOutput, CommandRunner, HostCommandRunner};
pub use download::{ArtifactInstance, Downloader, LocalArtifactStore};
pub use runtime::{CtrRuntimeClient, RuntimeClient, TaskStatus};
pub use service::{ServiceManager, SystemctlServiceManager};

use crate::constants::NodePaths;
use crate::error::ComponentError;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Options of one install/uninstall/render invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOptions {
    /// Log the work without mutating the node
    pub dry_run: bool,
}

/// Everything a component needs to act on the local node
#[derive(Clone)]
pub struct NodeContext {
    /// Artifact download service
    pub downloader: Arc<dyn Downloader>,

    /// Init system
    pub services: Arc<dyn ServiceManager>,

    /// Local command execution
    pub commands: Arc<dyn CommandRunner>,

    /// Container runtime client used for teardown
    pub runtime: Arc<dyn RuntimeClient>,

    /// Filesystem layout
    pub paths: NodePaths,

    /// CPU architecture of the node
    pub arch: String,

    /// Whether systemd manages cgroups on this node
    pub systemd_cgroup: bool,

    /// Mirror proxy used when online without a local registry
    pub repo_mirror: String,

    /// Cancellation signal of the running step
    pub cancel: CancellationToken,
}

impl std::fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContext")
            .field("paths", &self.paths)
            .field("arch", &self.arch)
            .field("systemd_cgroup", &self.systemd_cgroup)
            .field("repo_mirror", &self.repo_mirror)
            .finish_non_exhaustive()
    }
}

impl NodeContext {
    /// Fail with [`ComponentError::Cancelled`] once the step was cancelled
    pub fn check_cancelled(&self) -> Result<(), ComponentError> {
        if self.cancel.is_cancelled() {
            return Err(ComponentError::Cancelled);
        }
        Ok(())
    }
}

/// Whether systemd is the init system (it then owns the root cgroup)
pub fn running_systemd() -> bool {
    Path::new("/run/systemd/system").is_dir()
}

/// Map the Rust target architecture to the artifact naming convention
pub fn host_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    }
}
