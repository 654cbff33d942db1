//! # CRD Generator
//!
//! Prints the `CassandraCluster` CustomResourceDefinition as YAML.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/cassandracluster.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use cassandra_controller::crd::CassandraCluster;
use kube::core::CustomResourceExt;

fn main() {
    let crd = CassandraCluster::crd();

    match serde_yaml::to_string(&crd) {
        Ok(yaml) => {
            print!("{yaml}");
        }
        Err(e) => {
            eprintln!("Failed to serialize CRD to YAML: {e}");
            std::process::exit(1);
        }
    }
}
