//! Local command execution

use crate::error::ComponentError;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Captured output of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Stdout followed by stderr
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (_, true) => self.stdout.trim().to_string(),
            (true, false) => self.stderr.trim().to_string(),
            (false, false) => format!("{}\n{}", self.stdout.trim(), self.stderr.trim()),
        }
    }
}

/// Runs programs on the local node
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`.
    ///
    /// A non-zero exit status is reported as [`ComponentError::Command`]
    /// carrying the combined output. In dry-run mode nothing is executed and
    /// an empty output is returned.
    async fn run(
        &self,
        dry_run: bool,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, ComponentError>;
}

/// [`CommandRunner`] backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct HostCommandRunner;

#[async_trait::async_trait]
impl CommandRunner for HostCommandRunner {
    async fn run(
        &self,
        dry_run: bool,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, ComponentError> {
        if dry_run {
            debug!("dry run: {} {}", program, args.join(" "));
            return Ok(CommandOutput::default());
        }

        debug!("Running {} {}", program, args.join(" "));
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ComponentError::Command {
                program: program.to_string(),
                output: format!("failed to spawn: {}", e),
            })?;

        let captured = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        if !output.status.success() {
            return Err(ComponentError::Command {
                program: program.to_string(),
                output: format!("{}: {}", output.status, captured.combined()),
            });
        }
        Ok(captured)
    }
}
