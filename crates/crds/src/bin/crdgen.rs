//! Prints the nodesmith CRDs as a multi-document YAML stream.

use crds::{Cluster, Node, Registry};
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    let crds = [Cluster::crd(), Registry::crd(), Node::crd()];
    for crd in crds {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
