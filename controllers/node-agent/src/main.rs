//! Node Agent
//!
//! Executes one provisioning step on the local node. The step is read from
//! `STEP_FILE`; its commands are dispatched through the component registry
//! to shell execution or to the registered component handlers.

mod error;
mod executor;

use crate::error::AgentError;
use anyhow::Context;
use components::node::{
    CtrRuntimeClient, HostCommandRunner, LocalArtifactStore, SystemctlServiceManager, host_arch, running_systemd,
};
use components::constants::{TASK_EXIT_TIMEOUT, TASK_POLL_INTERVAL};
use components::{ComponentRegistry, InstallOptions, NodeContext, NodePaths};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn env_flag(name: &str) -> Result<bool, AgentError> {
    match env::var(name) {
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "" | "0" | "false" | "no" => Ok(false),
            other => Err(AgentError::InvalidConfig(format!("{}: unexpected value '{}'", name, other))),
        },
        Err(_) => Ok(false),
    }
}

fn env_seconds(name: &str, default: Duration) -> Result<Duration, AgentError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Duration::from_secs)
            .map_err(|e| AgentError::InvalidConfig(format!("{}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Node Agent");

    let step_file = env::var("STEP_FILE")
        .map(PathBuf::from)
        .map_err(|_| AgentError::InvalidConfig("STEP_FILE environment variable is required".to_string()))?;
    let dry_run = env_flag("DRY_RUN")?;
    let socket = env::var("CONTAINERD_SOCKET").ok();
    let artifact_dir = env::var("ARTIFACT_DIR").map_or_else(|_| PathBuf::from("/opt/nodesmith/artifacts"), PathBuf::from);
    let repo_mirror = env::var("REPO_MIRROR").unwrap_or_default();
    let task_exit_timeout = env_seconds("TASK_EXIT_TIMEOUT_SECONDS", TASK_EXIT_TIMEOUT)?;

    info!("Configuration:");
    info!("  Step file: {}", step_file.display());
    info!("  Dry run: {}", dry_run);
    info!("  Artifact directory: {}", artifact_dir.display());
    info!("  Task exit timeout: {:?}", task_exit_timeout);

    let paths = NodePaths::default();
    let commands = Arc::new(HostCommandRunner);
    let runtime = match socket {
        Some(address) => CtrRuntimeClient::new(commands.clone(), address),
        None => CtrRuntimeClient::with_default_socket(commands.clone()),
    }
    .with_wait(TASK_POLL_INTERVAL, task_exit_timeout);
    let cancel = CancellationToken::new();
    let ctx = NodeContext {
        downloader: Arc::new(LocalArtifactStore::new(artifact_dir, paths.clone(), commands.clone())),
        services: Arc::new(SystemctlServiceManager::new(commands.clone())),
        commands,
        runtime: Arc::new(runtime),
        paths,
        arch: host_arch().to_string(),
        systemd_cgroup: running_systemd(),
        repo_mirror,
        cancel: cancel.clone(),
    };

    let step = executor::load_step(&step_file).await?;
    let registry = ComponentRegistry::with_defaults().context("building component registry")?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling step");
            cancel.cancel();
        }
    });

    executor::run_step(&registry, &step, &ctx, InstallOptions { dry_run })
        .await
        .with_context(|| format!("step {} ({})", step.name, step.id))?;

    info!("Step {} completed", step.name);
    Ok(())
}
