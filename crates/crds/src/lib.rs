//! nodesmith CRD Definitions
//!
//! Kubernetes Custom Resource Definitions and shared wire types for the
//! nodesmith cluster controller and node agent.

pub mod cluster;
pub mod node;
pub mod registry;
pub mod step;

pub use cluster::*;
pub use node::*;
pub use registry::*;
pub use step::*;
