//! kubeadm helpers
//!
//! `kubeadm init` prints the commands other nodes run to join the cluster,
//! wrapped over several lines. [`extract_join_commands`] recovers them as
//! single-line strings.

use crate::constants::ADMIN_KUBECONFIG;
use crate::error::ComponentError;
use crate::node::ServiceManager;
use crds::{Command, Step, StepAction, StepNode};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

const REMOVE_TIMEOUT: Duration = Duration::from_secs(5);

#[allow(clippy::expect_used, reason = "patterns are literals")]
static CONTROL_PLANE_JOIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"kubeadm join.*?--control-plane.*?--certificate-key\s+\S+").expect("valid control plane pattern")
});

#[allow(clippy::expect_used, reason = "patterns are literals")]
static WORKER_JOIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"kubeadm join.*?--token\s+\S+.*?--discovery-token-ca-cert-hash\s+\S+")
        .expect("valid worker pattern")
});

/// Join shell line continuations and collapse whitespace runs
pub fn sanitize_command(input: &str) -> String {
    input
        .replace("\\\n", " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Control plane and worker join commands from `kubeadm init` output.
///
/// Either is empty when not found. The worker command never carries
/// `--control-plane`.
pub fn extract_join_commands(output: &str) -> (String, String) {
    let cleaned = sanitize_command(output);

    let master = CONTROL_PLANE_JOIN
        .find(&cleaned)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let worker = WORKER_JOIN
        .find_iter(&cleaned)
        .map(|m| m.as_str())
        .find(|m| !m.contains("--control-plane"))
        .map(str::to_string)
        .unwrap_or_default();

    debug!(
        "Extracted join commands (control plane: {}, worker: {})",
        !master.is_empty(),
        !worker.is_empty()
    );
    (master, worker)
}

/// Best-effort step removing `dirs` on every node
pub fn remove_dirs_step<S: AsRef<str>>(name: &str, nodes: &[StepNode], dirs: &[S]) -> Step {
    let args = ["rm", "-rf"]
        .into_iter()
        .chain(dirs.iter().map(|d| d.as_ref()))
        .map(str::to_string);
    Step::new(name, StepAction::Uninstall, REMOVE_TIMEOUT)
        .with_nodes(nodes)
        .with_retry_times(1)
        .ignore_errors()
        .with_command(Command::shell(args))
}

/// Copy the admin kubeconfig to `<home>/.kube/config`
pub async fn generate_kube_config(src: &Path, home: &Path) -> Result<PathBuf, ComponentError> {
    let dst = home.join(".kube").join("config");
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ComponentError::io(parent, e))?;
    }
    tokio::fs::copy(src, &dst)
        .await
        .map_err(|e| ComponentError::io(src, e))?;
    debug!("Copied {} to {}", src.display(), dst.display());
    Ok(dst)
}

/// [`generate_kube_config`] from the kubeadm admin kubeconfig
pub async fn generate_admin_kube_config(home: &Path) -> Result<PathBuf, ComponentError> {
    generate_kube_config(Path::new(ADMIN_KUBECONFIG), home).await
}

/// Whether a systemd unit is running
pub async fn is_service_active(services: &dyn ServiceManager, unit: &str) -> Result<bool, ComponentError> {
    services.is_active(unit).await
}
