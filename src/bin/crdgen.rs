//! Print the operator's CustomResourceDefinitions as YAML.
//!
//! ```sh
//! cargo run --bin crdgen > config/crd/rekor.yaml
//! ```

use kube::CustomResourceExt;
use signstack_operator::crd::Rekor;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&Rekor::crd())?);
    Ok(())
}
