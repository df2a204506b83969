//! Container teardown sequence
//!
//! Stops every container of a runtime namespace before the runtime is
//! uninstalled. Containers are processed one at a time: kill the task, wait
//! for it to exit, delete the task, delete the container. Only an unexpected
//! kill or wait failure aborts; everything else degrades to logging so the
//! uninstall can always make progress.

use crate::error::RuntimeError;
use crate::node::RuntimeClient;
use tracing::{debug, error, info, warn};

/// Tear down every container in `namespace`
pub async fn teardown_namespace(client: &dyn RuntimeClient, namespace: &str) -> Result<(), RuntimeError> {
    let containers = client.list_containers(namespace).await?;
    info!(
        "Tearing down {} containers in namespace {}",
        containers.len(),
        namespace
    );

    for container in &containers {
        debug!("Attempt to kill and delete task of container {}", container);
        match client.task_status(namespace, container).await {
            Err(e) => {
                warn!(
                    "Failed to get task of container {}, it may have no task at all: {}",
                    container, e
                );
            }
            Ok(status) => {
                debug!("Killing task {} ({:?})", container, status);
                if let Err(e) = client.kill_task(namespace, container).await {
                    if e.is_not_found() {
                        warn!("Task {} disappeared before kill: {}", container, e);
                        continue;
                    }
                    error!("Failed to kill task {}: {}", container, e);
                    return Err(e);
                }

                if let Err(e) = client.wait_task(namespace, container).await {
                    error!("Failed to wait for task {} to exit: {}", container, e);
                    return Err(e);
                }
                debug!("Task {} exited", container);

                match client.delete_task(namespace, container).await {
                    Ok(()) => debug!("Task {} deleted", container),
                    Err(e) => warn!("(ignored) Failed to delete killed task {}: {}", container, e),
                }
            }
        }

        debug!("Attempt to delete container {}", container);
        if let Err(e) = client.delete_container(namespace, container).await {
            warn!("(ignored) Failed to delete container {}: {}", container, e);
        }
    }

    Ok(())
}
