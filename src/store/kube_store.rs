//! [`ResourceStore`] backed by the Kubernetes API server.

use super::ResourceStore;
use crate::error::{OperatorError, Result};
use async_trait::async_trait;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams,
};
use kube::{Client, ResourceExt};
use tracing::debug;

/// Direct API-server access through a [`kube::Client`].
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, resource: &ApiResource, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, resource)
    }

    fn namespaced(&self, resource: &ApiResource, obj: &DynamicObject) -> Result<Api<DynamicObject>> {
        let namespace = obj.namespace().ok_or_else(|| {
            OperatorError::Reconciliation(format!(
                "{} {} has no namespace",
                resource.kind,
                obj.name_any()
            ))
        })?;
        Ok(self.api(resource, &namespace))
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        Ok(self.api(resource, namespace).get_opt(name).await?)
    }

    async fn create(&self, resource: &ApiResource, obj: &DynamicObject) -> Result<()> {
        debug!(kind = %resource.kind, name = %obj.name_any(), "Creating object");
        self.namespaced(resource, obj)?
            .create(&PostParams::default(), obj)
            .await?;
        Ok(())
    }

    async fn update(&self, resource: &ApiResource, obj: &DynamicObject) -> Result<()> {
        debug!(kind = %resource.kind, name = %obj.name_any(), "Updating object");
        self.namespaced(resource, obj)?
            .replace(&obj.name_any(), &PostParams::default(), obj)
            .await?;
        Ok(())
    }

    async fn delete(&self, resource: &ApiResource, namespace: &str, name: &str) -> Result<()> {
        debug!(kind = %resource.kind, name = %name, "Deleting object");
        match self
            .api(resource, namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, resource: &ApiResource, namespace: &str) -> Result<Vec<DynamicObject>> {
        let list = self
            .api(resource, namespace)
            .list(&ListParams::default())
            .await?;
        Ok(list.items)
    }

    async fn update_status(&self, resource: &ApiResource, obj: &DynamicObject) -> Result<()> {
        debug!(kind = %resource.kind, name = %obj.name_any(), "Updating status");
        let status = obj
            .data
            .get("status")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let patch = serde_json::json!({ "status": status });
        self.namespaced(resource, obj)?
            .patch_status(&obj.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}
