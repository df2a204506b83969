//! Cluster store errors

use thiserror::Error;

/// Errors that can occur when reading from the cluster store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid query (e.g. malformed label selector)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Store unavailable (used by test doubles to simulate outages)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether this error means the object does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NotFound(_) => true,
            StoreError::Kube(kube::Error::Api(response)) => response.code == 404,
            _ => false,
        }
    }
}
