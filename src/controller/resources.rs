//! # Derived Resource Templates
//!
//! Desired shapes of the StatefulSet and the two headless Services that back a
//! `CassandraCluster`. Every derived object carries the selector labels and a
//! controller owner reference to the cluster.

use crate::constants::UNREADY_SERVICE_SUFFIX;
use crate::controller::owner::controller_reference;
use crate::crd::CassandraCluster;
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Capabilities, Container, ContainerPort, EnvVar, EnvVarSource, ExecAction, Lifecycle,
    LifecycleHandler, ObjectFieldSelector, PodSpec, PodTemplateSpec, Probe, SecurityContext,
    Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use std::collections::BTreeMap;

pub const CASSANDRA_IMAGE: &str = "gcr.io/google-samples/cassandra:v13";
pub const CQL_PORT: i32 = 9042;
pub const INTRA_NODE_PORT: i32 = 7001;
pub const JMX_PORT: i32 = 7099;
pub const TOLERATE_UNREADY_ENDPOINTS_ANNOTATION: &str =
    "service.alpha.kubernetes.io/tolerate-unready-endpoints";

/// Selector labels shared by the pods and both Services
#[must_use]
pub fn labels(cluster: &CassandraCluster) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), "cassandra".to_string()),
        ("controller".to_string(), cluster.name_any()),
    ])
}

/// Name of the Service that publishes every pod, ready or not
#[must_use]
pub fn unready_service_name(statefulset_name: &str) -> String {
    format!("{statefulset_name}{UNREADY_SERVICE_SUFFIX}")
}

/// Seed address of the first pod, resolved through the unready Service
#[must_use]
pub fn seed_address(statefulset_name: &str, namespace: &str) -> String {
    format!(
        "{statefulset_name}-0.{}.{namespace}.svc.cluster.local",
        unready_service_name(statefulset_name)
    )
}

fn derived_metadata(cluster: &CassandraCluster, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: cluster.namespace(),
        labels: Some(labels(cluster)),
        owner_references: Some(vec![controller_reference(cluster)]),
        ..ObjectMeta::default()
    }
}

fn cql_service_spec(cluster: &CassandraCluster) -> ServiceSpec {
    ServiceSpec {
        type_: Some("ClusterIP".to_string()),
        cluster_ip: Some("None".to_string()),
        selector: Some(labels(cluster)),
        ports: Some(vec![ServicePort {
            name: Some("cql".to_string()),
            port: CQL_PORT,
            target_port: Some(IntOrString::Int(CQL_PORT)),
            protocol: Some("TCP".to_string()),
            ..ServicePort::default()
        }]),
        ..ServiceSpec::default()
    }
}

/// Headless Service named after the StatefulSet, routing CQL to ready pods
#[must_use]
pub fn new_headless_service(cluster: &CassandraCluster) -> Service {
    Service {
        metadata: derived_metadata(cluster, cluster.spec.statefulset_name.clone()),
        spec: Some(cql_service_spec(cluster)),
        ..Service::default()
    }
}

/// Headless Service that also publishes not-ready pods so peers can find the seed
/// before it passes its readiness probe
#[must_use]
pub fn new_unready_service(cluster: &CassandraCluster) -> Service {
    let mut metadata = derived_metadata(
        cluster,
        unready_service_name(&cluster.spec.statefulset_name),
    );
    metadata.annotations = Some(BTreeMap::from([(
        TOLERATE_UNREADY_ENDPOINTS_ANNOTATION.to_string(),
        "true".to_string(),
    )]));

    let mut spec = cql_service_spec(cluster);
    spec.publish_not_ready_addresses = Some(true);

    Service {
        metadata,
        spec: Some(spec),
        ..Service::default()
    }
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..EnvVar::default()
    }
}

fn container_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        ..ContainerPort::default()
    }
}

fn exec(command: &[&str]) -> ExecAction {
    ExecAction {
        command: Some(command.iter().map(|part| (*part).to_string()).collect()),
    }
}

fn cassandra_container(cluster: &CassandraCluster) -> Container {
    let statefulset_name = &cluster.spec.statefulset_name;
    let namespace = cluster.namespace().unwrap_or_default();

    Container {
        name: "cassandra".to_string(),
        image: Some(CASSANDRA_IMAGE.to_string()),
        image_pull_policy: Some("Always".to_string()),
        ports: Some(vec![
            container_port("cql", CQL_PORT),
            container_port("intra-node", INTRA_NODE_PORT),
            container_port("jmx", JMX_PORT),
        ]),
        env: Some(vec![
            env(
                "CASSANDRA_SEEDS",
                seed_address(statefulset_name, &namespace),
            ),
            env("MAX_HEAP_SIZE", "512M"),
            env("HEAP_NEWSIZE", "100M"),
            EnvVar {
                name: "POD_IP".to_string(),
                value_from: Some(EnvVarSource {
                    field_ref: Some(ObjectFieldSelector {
                        field_path: "status.podIP".to_string(),
                        ..ObjectFieldSelector::default()
                    }),
                    ..EnvVarSource::default()
                }),
                ..EnvVar::default()
            },
        ]),
        security_context: Some(SecurityContext {
            capabilities: Some(Capabilities {
                add: Some(vec!["IPC_LOCK".to_string()]),
                ..Capabilities::default()
            }),
            ..SecurityContext::default()
        }),
        readiness_probe: Some(Probe {
            exec: Some(exec(&["/bin/bash", "-c", "/ready-probe.sh"])),
            initial_delay_seconds: Some(15),
            timeout_seconds: Some(5),
            ..Probe::default()
        }),
        lifecycle: Some(Lifecycle {
            pre_stop: Some(LifecycleHandler {
                exec: Some(exec(&["/bin/sh", "-c", "nodetool drain"])),
                ..LifecycleHandler::default()
            }),
            ..Lifecycle::default()
        }),
        ..Container::default()
    }
}

/// StatefulSet running `spec.replicas` Cassandra pods behind the unready Service
#[must_use]
pub fn new_stateful_set(cluster: &CassandraCluster) -> StatefulSet {
    let statefulset_name = &cluster.spec.statefulset_name;

    StatefulSet {
        metadata: derived_metadata(cluster, statefulset_name.clone()),
        spec: Some(StatefulSetSpec {
            replicas: cluster.spec.replicas,
            service_name: unready_service_name(statefulset_name).into(),
            selector: LabelSelector {
                match_labels: Some(labels(cluster)),
                ..LabelSelector::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels(cluster)),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![cassandra_container(cluster)],
                    ..PodSpec::default()
                }),
            },
            ..StatefulSetSpec::default()
        }),
        ..StatefulSet::default()
    }
}
