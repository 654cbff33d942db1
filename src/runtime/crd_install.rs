//! # CRD Installation
//!
//! Server-side applies the `CassandraCluster` CRD and waits until the API server
//! reports it as Established.

use crate::constants::CONTROLLER_NAME;
use crate::crd::CassandraCluster;
use anyhow::{Context, Result};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::core::CustomResourceExt;
use kube::Client;
use kube_runtime::wait::{await_condition, conditions};
use std::time::Duration;
use tracing::info;

pub async fn ensure_crd(client: &Client, timeout: Duration) -> Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let crd = CassandraCluster::crd();
    let name = CassandraCluster::crd_name();

    info!("Applying CRD {}", name);
    crds.patch(
        name,
        &PatchParams::apply(CONTROLLER_NAME).force(),
        &Patch::Apply(&crd),
    )
    .await
    .with_context(|| format!("Failed to apply CRD {name}"))?;

    tokio::time::timeout(
        timeout,
        await_condition(crds, name, conditions::is_crd_established()),
    )
    .await
    .with_context(|| format!("Timed out waiting for CRD {name} to become Established"))?
    .with_context(|| format!("Failed to watch CRD {name}"))?;

    info!("CRD {} established", name);
    Ok(())
}
