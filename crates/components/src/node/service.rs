//! Init system control

use crate::error::ComponentError;
use crate::node::command::CommandRunner;
use std::sync::Arc;

/// Controls system service units. Every operation is idempotent.
#[async_trait::async_trait]
pub trait ServiceManager: Send + Sync {
    /// Reload unit files
    async fn daemon_reload(&self) -> Result<(), ComponentError>;

    /// Enable a unit at boot
    async fn enable(&self, unit: &str) -> Result<(), ComponentError>;

    /// Disable a unit at boot
    async fn disable(&self, unit: &str) -> Result<(), ComponentError>;

    /// Stop a unit
    async fn stop(&self, unit: &str) -> Result<(), ComponentError>;

    /// Restart a unit
    async fn restart(&self, unit: &str) -> Result<(), ComponentError>;

    /// Whether a unit exists and is running
    async fn is_active(&self, unit: &str) -> Result<bool, ComponentError>;
}

/// [`ServiceManager`] driving `systemctl`
#[derive(Clone)]
pub struct SystemctlServiceManager {
    runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for SystemctlServiceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemctlServiceManager").finish_non_exhaustive()
    }
}

impl SystemctlServiceManager {
    /// Manager running `systemctl` through `runner`
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    async fn systemctl(&self, unit: &str, operation: &str, args: &[&str]) -> Result<(), ComponentError> {
        self.runner
            .run(false, "systemctl", args)
            .await
            .map(|_| ())
            .map_err(|e| ComponentError::Service {
                unit: unit.to_string(),
                operation: operation.to_string(),
                message: e.to_string(),
            })
    }
}

#[async_trait::async_trait]
impl ServiceManager for SystemctlServiceManager {
    async fn daemon_reload(&self) -> Result<(), ComponentError> {
        self.systemctl("systemd", "daemon-reload", &["daemon-reload"]).await
    }

    async fn enable(&self, unit: &str) -> Result<(), ComponentError> {
        self.systemctl(unit, "enable", &["enable", unit]).await
    }

    async fn disable(&self, unit: &str) -> Result<(), ComponentError> {
        self.systemctl(unit, "disable", &["disable", unit]).await
    }

    async fn stop(&self, unit: &str) -> Result<(), ComponentError> {
        self.systemctl(unit, "stop", &["stop", unit]).await
    }

    async fn restart(&self, unit: &str) -> Result<(), ComponentError> {
        self.systemctl(unit, "restart", &["restart", unit]).await
    }

    async fn is_active(&self, unit: &str) -> Result<bool, ComponentError> {
        // `is-active` exits non-zero for inactive and unknown units
        match self.runner.run(false, "systemctl", &["is-active", unit]).await {
            Ok(output) => Ok(output.stdout.trim() == "active"),
            Err(ComponentError::Command { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
