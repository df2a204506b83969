//! Container runtime client used by the teardown sequence

use crate::constants::{CONTAINERD_SOCKET, TASK_EXIT_TIMEOUT, TASK_POLL_INTERVAL};
use crate::error::{ComponentError, RuntimeError};
use crate::node::command::CommandRunner;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::debug;

/// State of a container's task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Created but not started
    Created,
    /// Running
    Running,
    /// Paused
    Paused,
    /// Exited
    Stopped,
    /// Any other state reported by the runtime
    Unknown(String),
}

impl TaskStatus {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "CREATED" => TaskStatus::Created,
            "RUNNING" => TaskStatus::Running,
            "PAUSED" => TaskStatus::Paused,
            "STOPPED" => TaskStatus::Stopped,
            other => TaskStatus::Unknown(other.to_string()),
        }
    }
}

/// Operations on containers and their tasks within a runtime namespace.
///
/// Missing objects are reported as [`RuntimeError::NotFound`].
#[async_trait::async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Container ids in a namespace
    async fn list_containers(&self, namespace: &str) -> Result<Vec<String>, RuntimeError>;

    /// Status of a container's task
    async fn task_status(&self, namespace: &str, container: &str) -> Result<TaskStatus, RuntimeError>;

    /// Send SIGKILL to a container's task
    async fn kill_task(&self, namespace: &str, container: &str) -> Result<(), RuntimeError>;

    /// Block until a container's task exits
    async fn wait_task(&self, namespace: &str, container: &str) -> Result<(), RuntimeError>;

    /// Delete an exited task
    async fn delete_task(&self, namespace: &str, container: &str) -> Result<(), RuntimeError>;

    /// Delete a container
    async fn delete_container(&self, namespace: &str, container: &str) -> Result<(), RuntimeError>;
}

/// [`RuntimeClient`] driving the containerd `ctr` CLI
#[derive(Clone)]
pub struct CtrRuntimeClient {
    runner: Arc<dyn CommandRunner>,
    address: String,
    poll_interval: Duration,
    wait_timeout: Duration,
}

impl std::fmt::Debug for CtrRuntimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CtrRuntimeClient")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl CtrRuntimeClient {
    /// Client talking to the containerd socket at `address`
    pub fn new(runner: Arc<dyn CommandRunner>, address: impl Into<String>) -> Self {
        Self {
            runner,
            address: address.into(),
            poll_interval: TASK_POLL_INTERVAL,
            wait_timeout: TASK_EXIT_TIMEOUT,
        }
    }

    /// Client talking to the default containerd socket
    pub fn with_default_socket(runner: Arc<dyn CommandRunner>) -> Self {
        Self::new(runner, CONTAINERD_SOCKET)
    }

    /// Override how long `wait_task` polls before giving up
    #[must_use]
    pub fn with_wait(mut self, poll_interval: Duration, wait_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.wait_timeout = wait_timeout;
        self
    }

    async fn ctr(&self, namespace: &str, args: &[&str]) -> Result<String, RuntimeError> {
        let mut full = vec!["--address", self.address.as_str(), "-n", namespace];
        full.extend_from_slice(args);
        self.runner
            .run(false, "ctr", &full)
            .await
            .map(|out| out.stdout)
            .map_err(classify)
    }
}

/// `ctr` reports missing objects as "not found" in its error output
fn classify(err: ComponentError) -> RuntimeError {
    let message = err.to_string();
    if message.to_ascii_lowercase().contains("not found") {
        RuntimeError::NotFound(message)
    } else {
        RuntimeError::Command(message)
    }
}

/// Parse `ctr tasks ls` output (`TASK PID STATUS` table)
fn parse_task_table(output: &str) -> Vec<(String, TaskStatus)> {
    output
        .lines()
        .skip_while(|line| line.trim_start().starts_with("TASK"))
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let id = cols.next()?;
            let _pid = cols.next()?;
            let status = cols.next()?;
            Some((id.to_string(), TaskStatus::parse(status)))
        })
        .collect()
}

#[async_trait::async_trait]
impl RuntimeClient for CtrRuntimeClient {
    async fn list_containers(&self, namespace: &str) -> Result<Vec<String>, RuntimeError> {
        let out = self.ctr(namespace, &["containers", "ls", "-q"]).await?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn task_status(&self, namespace: &str, container: &str) -> Result<TaskStatus, RuntimeError> {
        let out = self.ctr(namespace, &["tasks", "ls"]).await?;
        parse_task_table(&out)
            .into_iter()
            .find(|(id, _)| id == container)
            .map(|(_, status)| status)
            .ok_or_else(|| RuntimeError::NotFound(format!("task {} not found", container)))
    }

    async fn kill_task(&self, namespace: &str, container: &str) -> Result<(), RuntimeError> {
        self.ctr(namespace, &["tasks", "kill", "-s", "SIGKILL", container])
            .await
            .map(|_| ())
    }

    async fn wait_task(&self, namespace: &str, container: &str) -> Result<(), RuntimeError> {
        let deadline = Instant::now() + self.wait_timeout;
        loop {
            match self.task_status(namespace, container).await {
                Ok(TaskStatus::Stopped) | Err(RuntimeError::NotFound(_)) => return Ok(()),
                Ok(status) => debug!("Task {} is {:?}, waiting", container, status),
                Err(e) => return Err(e),
            }
            if Instant::now() >= deadline {
                return Err(RuntimeError::Command(format!(
                    "task {} did not exit within {:?}",
                    container, self.wait_timeout
                )));
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn delete_task(&self, namespace: &str, container: &str) -> Result<(), RuntimeError> {
        self.ctr(namespace, &["tasks", "delete", container]).await.map(|_| ())
    }

    async fn delete_container(&self, namespace: &str, container: &str) -> Result<(), RuntimeError> {
        self.ctr(namespace, &["containers", "delete", container])
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::fake::RecordingCommandRunner;

    const TASKS: &str = "TASK      PID     STATUS\nabc       1234    RUNNING\ndef       0       STOPPED\n";

    #[test]
    fn test_parse_task_table() {
        let rows = parse_task_table(TASKS);
        assert_eq!(
            rows,
            vec![
                ("abc".to_string(), TaskStatus::Running),
                ("def".to_string(), TaskStatus::Stopped),
            ]
        );
        assert!(parse_task_table("TASK PID STATUS\n").is_empty());
    }

    #[tokio::test]
    async fn test_missing_task_is_not_found() {
        let runner = Arc::new(RecordingCommandRunner::default());
        runner.stdout_for("tasks ls", TASKS);
        let client = CtrRuntimeClient::with_default_socket(runner.clone());

        assert_eq!(client.task_status("k8s.io", "abc").await.unwrap(), TaskStatus::Running);
        assert!(client.task_status("k8s.io", "zzz").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_kill_not_found_is_classified() {
        let runner = Arc::new(RecordingCommandRunner::default());
        runner.fail_on("tasks kill", "ctr: task abc: not found");
        runner.fail_on("tasks delete", "ctr: permission denied");
        let client = CtrRuntimeClient::new(runner.clone(), "/tmp/containerd.sock");

        assert!(client.kill_task("k8s.io", "abc").await.unwrap_err().is_not_found());
        assert!(!client.delete_task("k8s.io", "abc").await.unwrap_err().is_not_found());

        let calls = runner.calls();
        assert_eq!(
            calls[0],
            vec!["ctr", "--address", "/tmp/containerd.sock", "-n", "k8s.io", "tasks", "kill", "-s", "SIGKILL", "abc"]
        );
    }

    #[test]
    fn test_default_wait_bounds() {
        let client = CtrRuntimeClient::with_default_socket(Arc::new(RecordingCommandRunner::default()));
        assert_eq!(client.wait_timeout, TASK_EXIT_TIMEOUT);
        assert_eq!(client.poll_interval, TASK_POLL_INTERVAL);

        let patient = client.with_wait(Duration::from_secs(1), Duration::from_secs(300));
        assert_eq!(patient.wait_timeout, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_wait_returns_once_stopped() {
        let runner = Arc::new(RecordingCommandRunner::default());
        runner.stdout_for("tasks ls", TASKS);
        let client = CtrRuntimeClient::with_default_socket(runner)
            .with_wait(Duration::from_millis(1), Duration::from_millis(20));

        client.wait_task("k8s.io", "def").await.unwrap();
        let err = client.wait_task("k8s.io", "abc").await.unwrap_err();
        assert!(err.to_string().contains("did not exit"));
    }
}
