//! Resource store client
//!
//! [`ResourceStore`] is the object-safe seam between the control loop and the
//! Kubernetes API: it works on [`DynamicObject`]s keyed by an [`ApiResource`],
//! which keeps it mockable. [`Store`] is the typed facade the rest of the
//! operator uses.

mod kube_store;
#[cfg(test)]
pub mod memory;

pub use kube_store::KubeStore;

use crate::error::{OperatorError, Result};
use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject};
use kube::core::TypeMeta;
use kube::{Resource, ResourceExt};
#[cfg(test)]
use mockall::automock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Low-level access to namespaced objects of any kind.
///
/// Not-found is not an error: `get` returns `None` and `delete` succeeds.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch one object
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>>;

    /// Create an object
    async fn create(&self, resource: &ApiResource, obj: &DynamicObject) -> Result<()>;

    /// Replace an object, spec only; fails on a stale resourceVersion
    async fn update(&self, resource: &ApiResource, obj: &DynamicObject) -> Result<()>;

    /// Delete an object
    async fn delete(&self, resource: &ApiResource, namespace: &str, name: &str) -> Result<()>;

    /// List every object of a kind in a namespace
    async fn list(&self, resource: &ApiResource, namespace: &str) -> Result<Vec<DynamicObject>>;

    /// Write the status subresource only
    async fn update_status(&self, resource: &ApiResource, obj: &DynamicObject) -> Result<()>;
}

/// Types the typed [`Store`] can carry.
pub trait StoreObject:
    Resource<DynamicType = ()> + Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
}

impl<K> StoreObject for K where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
}

/// Typed, cheaply cloneable handle on a [`ResourceStore`].
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn ResourceStore>,
}

impl Store {
    pub fn new(backend: Arc<dyn ResourceStore>) -> Self {
        Self { backend }
    }

    pub async fn get<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        let found = self
            .backend
            .get(&ApiResource::erase::<K>(&()), namespace, name)
            .await?;
        found.map(from_dynamic).transpose()
    }

    pub async fn create<K: StoreObject>(&self, obj: &K) -> Result<()> {
        self.backend
            .create(&ApiResource::erase::<K>(&()), &to_dynamic(obj)?)
            .await
    }

    pub async fn update<K: StoreObject>(&self, obj: &K) -> Result<()> {
        self.backend
            .update(&ApiResource::erase::<K>(&()), &to_dynamic(obj)?)
            .await
    }

    pub async fn delete<K: StoreObject>(&self, obj: &K) -> Result<()> {
        let (namespace, name) = identity(obj)?;
        self.backend
            .delete(&ApiResource::erase::<K>(&()), &namespace, &name)
            .await
    }

    pub async fn list<K: StoreObject>(&self, namespace: &str) -> Result<Vec<K>> {
        self.backend
            .list(&ApiResource::erase::<K>(&()), namespace)
            .await?
            .into_iter()
            .map(from_dynamic)
            .collect()
    }

    pub async fn update_status<K: StoreObject>(&self, obj: &K) -> Result<()> {
        self.backend
            .update_status(&ApiResource::erase::<K>(&()), &to_dynamic(obj)?)
            .await
    }
}

/// Namespace and name of a namespaced object.
pub fn identity<K: StoreObject>(obj: &K) -> Result<(String, String)> {
    let namespace = obj.namespace().ok_or_else(|| {
        OperatorError::Reconciliation(format!("{} {} has no namespace", K::kind(&()), obj.name_any()))
    })?;
    let name = obj.meta().name.clone().ok_or_else(|| {
        OperatorError::Reconciliation(format!("{} in {} has no name", K::kind(&()), namespace))
    })?;
    Ok((namespace, name))
}

fn type_meta<K: StoreObject>() -> TypeMeta {
    TypeMeta {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
    }
}

fn to_dynamic<K: StoreObject>(obj: &K) -> Result<DynamicObject> {
    let mut dynamic: DynamicObject = serde_json::from_value(serde_json::to_value(obj)?)?;
    if dynamic.types.is_none() {
        dynamic.types = Some(type_meta::<K>());
    }
    Ok(dynamic)
}

// List responses omit apiVersion/kind on items
fn from_dynamic<K: StoreObject>(mut obj: DynamicObject) -> Result<K> {
    if obj.types.is_none() {
        obj.types = Some(type_meta::<K>());
    }
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}
