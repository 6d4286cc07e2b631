//! Prints the IPAM CustomResourceDefinitions as a multi-document YAML stream.
//!
//! ```sh
//! cargo run -p crds --bin crdgen > deploy/crds.yaml
//! ```

use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    for crd in [crds::IPPool::crd(), crds::IPClaim::crd()] {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
