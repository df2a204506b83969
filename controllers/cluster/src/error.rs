//! Controller-specific error types.
//!
//! Errors raised while reconciling `Cluster` resources that are not covered
//! by the store or component crates.

use crate::backoff::RetryClass;
use cluster_store::StoreError;
use components::ComponentError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the Cluster Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Cluster store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Step generation failed
    #[error("Component error: {0}")]
    Component(#[from] ComponentError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A referenced registry could not be resolved
    #[error("get registry {name}: {source}")]
    Registry {
        /// Referenced registry name
        name: String,
        /// Lookup failure
        #[source]
        source: StoreError,
    },

    /// Nodes of a cluster could not be listed
    #[error("list nodes of cluster {cluster}: {source}")]
    ListNodes {
        /// Cluster name
        cluster: String,
        /// Listing failure
        #[source]
        source: StoreError,
    },

    /// Resource watch or probe server failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl ControllerError {
    /// How a reconciliation that failed with this error is retried
    pub fn retry_class(&self) -> RetryClass {
        match self {
            ControllerError::InvalidConfig(_) => RetryClass::Configuration,
            ControllerError::Component(e) => match e {
                ComponentError::UnsupportedVersion { .. }
                | ComponentError::InvalidSpec { .. }
                | ComponentError::InvalidCommand(_)
                | ComponentError::Serialization(_)
                | ComponentError::Template { .. } => RetryClass::Configuration,
                _ => RetryClass::Transient,
            },
            ControllerError::Store(StoreError::InvalidQuery(_))
            | ControllerError::ListNodes {
                source: StoreError::InvalidQuery(_),
                ..
            } => RetryClass::Configuration,
            ControllerError::Kube(_)
            | ControllerError::Store(_)
            | ControllerError::Registry { .. }
            | ControllerError::ListNodes { .. }
            | ControllerError::Watch(_) => RetryClass::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_class() {
        let unsupported = ControllerError::Component(ComponentError::UnsupportedVersion {
            kind: "containerd".to_string(),
            version: "1.5.0".to_string(),
        });
        assert_eq!(unsupported.retry_class(), RetryClass::Configuration);
        assert_eq!(
            ControllerError::InvalidConfig("no step".to_string()).retry_class(),
            RetryClass::Configuration
        );

        let lookup = ControllerError::Registry {
            name: "harbor".to_string(),
            source: StoreError::Unavailable("down".to_string()),
        };
        assert_eq!(lookup.retry_class(), RetryClass::Transient);

        let listing = |source| ControllerError::ListNodes {
            cluster: "prod".to_string(),
            source,
        };
        assert_eq!(
            listing(StoreError::Unavailable("down".to_string())).retry_class(),
            RetryClass::Transient
        );
        assert_eq!(
            listing(StoreError::InvalidQuery("bad selector".to_string())).retry_class(),
            RetryClass::Configuration
        );
    }
}
