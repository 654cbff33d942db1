//! # Resource Manager
//!
//! Thin CRUD façade over one derived resource kind. The sync handler only talks to
//! derived resources through this trait so tests can swap in an in-memory store.

use crate::constants::CONTROLLER_NAME;
use crate::observability::metrics;
use anyhow::{Context, Result};
use async_trait::async_trait;
use kube::api::{Api, PostParams};
use kube::core::NamespaceResourceScope;
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::marker::PhantomData;
use tracing::debug;

/// CRUD operations on one namespaced kind
#[async_trait]
pub trait ResourceManager<K>: Send + Sync
where
    K: Resource + Clone + Send + Sync + 'static,
{
    /// Fetch an object, `None` when it does not exist
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    async fn create(&self, namespace: &str, obj: &K) -> Result<K>;

    /// Replace an object. `obj` must carry the `resourceVersion` it was read at.
    async fn update(&self, namespace: &str, obj: &K) -> Result<K>;

    /// Create `obj`, or replace the existing object of the same name
    ///
    /// The existing object's `resourceVersion` is carried over so the replace is
    /// accepted by the API server.
    async fn create_or_update(&self, namespace: &str, obj: &K) -> Result<K> {
        let name = obj.name_any();
        match self.get(namespace, &name).await? {
            None => self.create(namespace, obj).await,
            Some(existing) => {
                let mut desired = obj.clone();
                desired.meta_mut().resource_version = existing.resource_version();
                self.update(namespace, &desired).await
            }
        }
    }
}

/// [`ResourceManager`] backed by the Kubernetes API
pub struct KubeResourceManager<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> std::fmt::Debug for KubeResourceManager<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeResourceManager")
            .field("kind", &std::any::type_name::<K>())
            .finish_non_exhaustive()
    }
}

impl<K> KubeResourceManager<K> {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K> KubeResourceManager<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn kind() -> String {
        K::kind(&K::DynamicType::default()).to_string()
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..PostParams::default()
        }
    }
}

#[async_trait]
impl<K> ResourceManager<K> for KubeResourceManager<K>
where
    K: Resource<Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static,
    K::DynamicType: Default,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        let kind = Self::kind();
        metrics::increment_resource_operations(&kind, "get");
        self.api(namespace)
            .get_opt(name)
            .await
            .with_context(|| format!("Failed to get {kind} {namespace}/{name}"))
    }

    async fn create(&self, namespace: &str, obj: &K) -> Result<K> {
        let kind = Self::kind();
        let name = obj.name_any();
        metrics::increment_resource_operations(&kind, "create");
        debug!(kind = %kind, namespace = %namespace, name = %name, "Creating resource");
        self.api(namespace)
            .create(&Self::post_params(), obj)
            .await
            .with_context(|| format!("Failed to create {kind} {namespace}/{name}"))
    }

    async fn update(&self, namespace: &str, obj: &K) -> Result<K> {
        let kind = Self::kind();
        let name = obj.name_any();
        metrics::increment_resource_operations(&kind, "update");
        debug!(kind = %kind, namespace = %namespace, name = %name, "Replacing resource");
        self.api(namespace)
            .replace(&name, &Self::post_params(), obj)
            .await
            .with_context(|| format!("Failed to update {kind} {namespace}/{name}"))
    }
}
