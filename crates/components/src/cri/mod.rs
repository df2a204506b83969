//! Container runtime components

pub mod containerd;
pub mod trust_store;

pub use containerd::{ConfigSchema, ContainerdRunnable, match_pause_version};
pub use trust_store::{ContainerdHost, ContainerdRegistry, ContainerdRegistryConfigure, HostFile, HostFileConfig};
