//! In-memory node collaborators for unit testing
//!
//! Every fake records the calls it receives so tests can assert on the exact
//! sequence of host operations, and failures can be injected per operation.

use crate::constants::NodePaths;
use crate::error::{ComponentError, RuntimeError};
use crate::node::command::{CommandOutput, CommandRunner};
use crate::node::download::{ArtifactInstance, CHART_ARCHIVE, Downloader, IMAGES_ARCHIVE};
use crate::node::runtime::{RuntimeClient, TaskStatus};
use crate::node::service::ServiceManager;
use crate::node::NodeContext;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Command runner that records every invocation
#[derive(Debug, Default)]
pub struct RecordingCommandRunner {
    calls: Mutex<Vec<Vec<String>>>,
    stdout: Mutex<Vec<(String, String)>>,
    failures: Mutex<Vec<(String, String)>>,
}

impl RecordingCommandRunner {
    /// Recorded invocations, program first
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded invocations joined with spaces
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.join(" ")).collect()
    }

    /// Return `stdout` for command lines containing `pattern`
    pub fn stdout_for(&self, pattern: &str, stdout: &str) {
        self.stdout
            .lock()
            .unwrap()
            .push((pattern.to_string(), stdout.to_string()));
    }

    /// Fail command lines containing `pattern` with `output`
    pub fn fail_on(&self, pattern: &str, output: &str) {
        self.failures
            .lock()
            .unwrap()
            .push((pattern.to_string(), output.to_string()));
    }
}

#[async_trait::async_trait]
impl CommandRunner for RecordingCommandRunner {
    async fn run(
        &self,
        dry_run: bool,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, ComponentError> {
        if dry_run {
            return Ok(CommandOutput::default());
        }
        let mut call = vec![program.to_string()];
        call.extend(args.iter().map(|a| (*a).to_string()));
        let line = call.join(" ");
        self.calls.lock().unwrap().push(call);

        if let Some((_, output)) = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
        {
            return Err(ComponentError::Command {
                program: program.to_string(),
                output: output.clone(),
            });
        }
        let stdout = self
            .stdout
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();
        Ok(CommandOutput {
            stdout,
            stderr: String::new(),
        })
    }
}

/// Service manager that records operations (`"restart containerd.service"`)
#[derive(Debug, Default)]
pub struct FakeServiceManager {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    active: Mutex<HashSet<String>>,
}

impl FakeServiceManager {
    /// Recorded operations
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Make an operation (`"daemon-reload"`, `"restart"`, ...) fail
    pub fn fail(&self, operation: &str) {
        self.failing.lock().unwrap().insert(operation.to_string());
    }

    /// Mark a unit as running
    pub fn set_active(&self, unit: &str) {
        self.active.lock().unwrap().insert(unit.to_string());
    }

    fn record(&self, operation: &str, unit: Option<&str>) -> Result<(), ComponentError> {
        let entry = match unit {
            Some(unit) => format!("{operation} {unit}"),
            None => operation.to_string(),
        };
        self.calls.lock().unwrap().push(entry);
        if self.failing.lock().unwrap().contains(operation) {
            return Err(ComponentError::Service {
                unit: unit.unwrap_or("systemd").to_string(),
                operation: operation.to_string(),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ServiceManager for FakeServiceManager {
    async fn daemon_reload(&self) -> Result<(), ComponentError> {
        self.record("daemon-reload", None)
    }

    async fn enable(&self, unit: &str) -> Result<(), ComponentError> {
        self.record("enable", Some(unit))
    }

    async fn disable(&self, unit: &str) -> Result<(), ComponentError> {
        self.record("disable", Some(unit))
    }

    async fn stop(&self, unit: &str) -> Result<(), ComponentError> {
        self.record("stop", Some(unit))?;
        self.active.lock().unwrap().remove(unit);
        Ok(())
    }

    async fn restart(&self, unit: &str) -> Result<(), ComponentError> {
        self.record("restart", Some(unit))?;
        self.active.lock().unwrap().insert(unit.to_string());
        Ok(())
    }

    async fn is_active(&self, unit: &str) -> Result<bool, ComponentError> {
        Ok(self.active.lock().unwrap().contains(unit))
    }
}

/// Downloader that records artifact operations (`"configs containerd 1.7.13"`)
#[derive(Debug, Default, Clone)]
pub struct FakeDownloader {
    calls: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl FakeDownloader {
    /// Recorded operations
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Make an operation (`"configs"`, `"remove-configs"`, `"images"`, ...) fail
    pub fn fail(&self, operation: &str) {
        self.failing.lock().unwrap().insert(operation.to_string());
    }
}

impl Downloader for FakeDownloader {
    fn instance(
        &self,
        kind: &str,
        version: &str,
        arch: &str,
        online: bool,
        _dry_run: bool,
    ) -> Result<Box<dyn ArtifactInstance>, ComponentError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("instance {kind} {version} {arch} online={online}"));
        Ok(Box::new(FakeArtifact {
            label: format!("{kind} {version}"),
            root: PathBuf::from("/fake").join(kind).join(version),
            calls: Arc::clone(&self.calls),
            failing: Arc::clone(&self.failing),
        }))
    }
}

struct FakeArtifact {
    label: String,
    root: PathBuf,
    calls: Arc<Mutex<Vec<String>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl FakeArtifact {
    fn record(&self, operation: &str) -> Result<(), ComponentError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{operation} {}", self.label));
        if self.failing.lock().unwrap().contains(operation) {
            return Err(ComponentError::Download(format!(
                "injected {operation} failure for {}",
                self.label
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ArtifactInstance for FakeArtifact {
    async fn download_and_unpack_configs(&self) -> Result<PathBuf, ComponentError> {
        self.record("configs")?;
        Ok(self.root.join("configs.tar.gz"))
    }

    async fn remove_configs(&self) -> Result<(), ComponentError> {
        self.record("remove-configs")
    }

    async fn download_images(&self) -> Result<PathBuf, ComponentError> {
        self.record("images")?;
        Ok(self.root.join(IMAGES_ARCHIVE))
    }

    async fn remove_images(&self) -> Result<(), ComponentError> {
        self.record("remove-images")
    }

    async fn download_chart(&self) -> Result<PathBuf, ComponentError> {
        self.record("chart")?;
        Ok(self.root.join(CHART_ARCHIVE))
    }

    async fn remove_chart(&self) -> Result<(), ComponentError> {
        self.record("remove-chart")
    }
}

/// Outcome of killing a fake task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KillOutcome {
    /// Kill succeeds
    #[default]
    Killed,
    /// Task vanished before the kill
    NotFound,
    /// Unexpected runtime failure
    Fail,
}

/// Behaviour of a fake container's task
#[derive(Debug, Clone, Default)]
pub struct FakeTask {
    /// What `kill_task` returns
    pub kill: KillOutcome,
    /// Whether `wait_task` fails
    pub wait_fails: bool,
    /// Whether `delete_task` fails
    pub delete_fails: bool,
}

#[derive(Debug, Clone)]
struct FakeContainer {
    id: String,
    task: Option<FakeTask>,
    delete_fails: bool,
}

/// Runtime client over a scripted set of containers.
///
/// Events are recorded as `"kill <id>"`, `"wait <id>"`, `"delete-task <id>"`
/// and `"delete-container <id>"`.
#[derive(Debug, Default)]
pub struct FakeRuntimeClient {
    containers: Mutex<Vec<FakeContainer>>,
    events: Mutex<Vec<String>>,
    list_fails: Mutex<bool>,
}

impl FakeRuntimeClient {
    /// Add a container with a task
    pub fn with_task(self, id: &str, task: FakeTask) -> Self {
        self.push(id, Some(task), false)
    }

    /// Add a container without a task
    pub fn without_task(self, id: &str) -> Self {
        self.push(id, None, false)
    }

    /// Add a container whose deletion fails
    pub fn undeletable(self, id: &str, task: Option<FakeTask>) -> Self {
        self.push(id, task, true)
    }

    /// Make container listing fail
    pub fn failing_list(self) -> Self {
        *self.list_fails.lock().unwrap() = true;
        self
    }

    fn push(self, id: &str, task: Option<FakeTask>, delete_fails: bool) -> Self {
        self.containers.lock().unwrap().push(FakeContainer {
            id: id.to_string(),
            task,
            delete_fails,
        });
        self
    }

    /// Recorded events
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: &str, container: &str) {
        self.events.lock().unwrap().push(format!("{event} {container}"));
    }

    fn container(&self, id: &str) -> Result<FakeContainer, RuntimeError> {
        self.containers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(format!("container {id} not found")))
    }

    fn task(&self, id: &str) -> Result<FakeTask, RuntimeError> {
        self.container(id)?
            .task
            .ok_or_else(|| RuntimeError::NotFound(format!("task {id} not found")))
    }
}

#[async_trait::async_trait]
impl RuntimeClient for FakeRuntimeClient {
    async fn list_containers(&self, _namespace: &str) -> Result<Vec<String>, RuntimeError> {
        if *self.list_fails.lock().unwrap() {
            return Err(RuntimeError::Command("listing failed".to_string()));
        }
        Ok(self
            .containers
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.id.clone())
            .collect())
    }

    async fn task_status(&self, _namespace: &str, container: &str) -> Result<TaskStatus, RuntimeError> {
        self.task(container).map(|_| TaskStatus::Running)
    }

    async fn kill_task(&self, _namespace: &str, container: &str) -> Result<(), RuntimeError> {
        self.record("kill", container);
        match self.task(container)?.kill {
            KillOutcome::Killed => Ok(()),
            KillOutcome::NotFound => Err(RuntimeError::NotFound(format!("task {container} not found"))),
            KillOutcome::Fail => Err(RuntimeError::Command(format!("kill {container} failed"))),
        }
    }

    async fn wait_task(&self, _namespace: &str, container: &str) -> Result<(), RuntimeError> {
        self.record("wait", container);
        if self.task(container)?.wait_fails {
            return Err(RuntimeError::Command(format!("wait {container} failed")));
        }
        Ok(())
    }

    async fn delete_task(&self, _namespace: &str, container: &str) -> Result<(), RuntimeError> {
        self.record("delete-task", container);
        if self.task(container)?.delete_fails {
            return Err(RuntimeError::Command(format!("delete task {container} failed")));
        }
        Ok(())
    }

    async fn delete_container(&self, _namespace: &str, container: &str) -> Result<(), RuntimeError> {
        self.record("delete-container", container);
        if self.container(container)?.delete_fails {
            return Err(RuntimeError::Command(format!("delete container {container} failed")));
        }
        Ok(())
    }
}

/// Bundle of fakes wired into a [`NodeContext`]
#[derive(Debug, Clone, Default)]
pub struct FakeNode {
    /// Artifact downloads
    pub downloader: FakeDownloader,
    /// Service operations
    pub services: Arc<FakeServiceManager>,
    /// Commands
    pub commands: Arc<RecordingCommandRunner>,
    /// Runtime
    pub runtime: Arc<FakeRuntimeClient>,
}

impl FakeNode {
    /// Fakes with a scripted runtime
    pub fn with_runtime(runtime: FakeRuntimeClient) -> Self {
        Self {
            runtime: Arc::new(runtime),
            ..Self::default()
        }
    }

    /// Node context over these fakes and `paths`
    pub fn context(&self, paths: NodePaths) -> NodeContext {
        NodeContext {
            downloader: Arc::new(self.downloader.clone()),
            services: self.services.clone(),
            commands: self.commands.clone(),
            runtime: self.runtime.clone(),
            paths,
            arch: "amd64".to_string(),
            systemd_cgroup: true,
            repo_mirror: String::new(),
            cancel: CancellationToken::new(),
        }
    }
}

/// Map of file name to contents below `dir`, one level deep (test helper)
pub fn read_dir_files(dir: &std::path::Path) -> HashMap<String, String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.path().is_file())
                .map(|e| {
                    let name = e.file_name().to_string_lossy().into_owned();
                    let contents = std::fs::read_to_string(e.path()).unwrap_or_default();
                    (name, contents)
                })
                .collect()
        })
        .unwrap_or_default()
}
