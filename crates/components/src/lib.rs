//! Installable node components
//!
//! A component (container runtime, CNI plugin, chart, image bundle) is modeled
//! as a [`Runnable`]: on the controller side it turns desired cluster state into
//! [`crds::Step`]s, on the node side the agent decodes the step payload back
//! into the same runnable through the [`ComponentRegistry`] and executes it.
//!
//! The pure registry merge used by the cluster controller lives in
//! [`registries`].

pub mod cni;
pub mod component_registry;
pub mod constants;
pub mod cri;
pub mod error;
pub mod fsutil;
pub mod image;
pub mod kubeadm;
pub mod metadata;
pub mod node;
pub mod registries;
pub mod runnable;
pub mod teardown;
pub mod version;

pub use component_registry::{ComponentRegistry, RegisterKey, RunnableRole};
pub use constants::NodePaths;
pub use error::{ComponentError, RuntimeError};
pub use metadata::{DesiredState, ExtraMetadata};
pub use node::{InstallOptions, NodeContext};
pub use registries::{RegistrySet, needs_update};
pub use runnable::Runnable;
