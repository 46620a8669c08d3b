//! In-memory [`ResourceStore`] with call counters, for tests.

use super::{from_dynamic, identity, to_dynamic, ResourceStore, StoreObject};
use crate::error::{OperatorError, Result};
use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject};
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Mutex;

type Key = (String, String, String, String);

/// Number of calls made per store operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub get: usize,
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub list: usize,
    pub update_status: usize,
}

impl CallCounts {
    /// Every call that writes.
    pub fn writes(&self) -> usize {
        self.create + self.update + self.delete + self.update_status
    }
}

/// Mimics the API server closely enough for reconcile tests: uids and
/// resourceVersions are assigned, stale updates conflict, spec updates keep
/// the stored status and status updates keep the stored spec.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<Key, DynamicObject>>,
    calls: Mutex<CallCounts>,
    sequence: Mutex<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without counting a call.
    pub fn insert<K: StoreObject>(&self, obj: &K) {
        let mut dynamic = to_dynamic(obj).expect("serializable object");
        let (namespace, name) = identity(obj).expect("namespaced object");
        let resource = ApiResource::erase::<K>(&());
        if dynamic.metadata.uid.is_none() {
            dynamic.metadata.uid = Some(format!("uid-{}", self.next_sequence()));
        }
        dynamic.metadata.resource_version = Some(self.next_sequence().to_string());
        self.objects
            .lock()
            .unwrap()
            .insert(key(&resource, &namespace, &name), dynamic);
    }

    /// Read an object without counting a call.
    pub fn peek<K: StoreObject>(&self, namespace: &str, name: &str) -> Option<K> {
        let resource = ApiResource::erase::<K>(&());
        self.objects
            .lock()
            .unwrap()
            .get(&key(&resource, namespace, name))
            .cloned()
            .map(|obj| from_dynamic(obj).expect("stored object parses"))
    }

    /// Names of every stored object of a kind in a namespace.
    pub fn names<K: StoreObject>(&self, namespace: &str) -> Vec<String> {
        let resource = ApiResource::erase::<K>(&());
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(group, kind, ns, _)| {
                *group == resource.group && *kind == resource.kind && ns == namespace
            })
            .map(|(_, _, _, name)| name.clone())
            .collect()
    }

    pub fn calls(&self) -> CallCounts {
        self.calls.lock().unwrap().clone()
    }

    pub fn reset_calls(&self) {
        *self.calls.lock().unwrap() = CallCounts::default();
    }

    fn next_sequence(&self) -> u64 {
        let mut sequence = self.sequence.lock().unwrap();
        *sequence += 1;
        *sequence
    }

    fn count(&self, f: impl FnOnce(&mut CallCounts)) {
        f(&mut self.calls.lock().unwrap());
    }
}

fn key(resource: &ApiResource, namespace: &str, name: &str) -> Key {
    (
        resource.group.clone(),
        resource.kind.clone(),
        namespace.to_string(),
        name.to_string(),
    )
}

fn object_key(resource: &ApiResource, obj: &DynamicObject) -> Key {
    key(
        resource,
        obj.metadata.namespace.as_deref().unwrap_or_default(),
        &obj.name_any(),
    )
}

fn set_status(obj: &mut DynamicObject, status: Option<serde_json::Value>) {
    if let Some(fields) = obj.data.as_object_mut() {
        match status {
            Some(status) => {
                fields.insert("status".to_string(), status);
            }
            None => {
                fields.remove("status");
            }
        }
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(
        &self,
        resource: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        self.count(|c| c.get += 1);
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(&key(resource, namespace, name))
            .cloned())
    }

    async fn create(&self, resource: &ApiResource, obj: &DynamicObject) -> Result<()> {
        self.count(|c| c.create += 1);
        let k = object_key(resource, obj);
        let mut stored = obj.clone();
        stored.metadata.uid = Some(format!("uid-{}", self.next_sequence()));
        stored.metadata.resource_version = Some(self.next_sequence().to_string());

        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&k) {
            return Err(OperatorError::KubeApi(format!(
                "{} {} already exists",
                resource.kind,
                obj.name_any()
            )));
        }
        objects.insert(k, stored);
        Ok(())
    }

    async fn update(&self, resource: &ApiResource, obj: &DynamicObject) -> Result<()> {
        self.count(|c| c.update += 1);
        let k = object_key(resource, obj);
        let version = self.next_sequence().to_string();

        let mut objects = self.objects.lock().unwrap();
        let current = objects.get(&k).ok_or_else(|| {
            OperatorError::KubeApi(format!("{} {} not found", resource.kind, obj.name_any()))
        })?;
        if obj.metadata.resource_version.is_some()
            && obj.metadata.resource_version != current.metadata.resource_version
        {
            return Err(OperatorError::KubeApi(format!(
                "conflict updating {} {}: stale resourceVersion",
                resource.kind,
                obj.name_any()
            )));
        }

        let mut stored = obj.clone();
        stored.metadata.uid = current.metadata.uid.clone();
        stored.metadata.resource_version = Some(version);
        set_status(&mut stored, current.data.get("status").cloned());
        objects.insert(k, stored);
        Ok(())
    }

    async fn delete(&self, resource: &ApiResource, namespace: &str, name: &str) -> Result<()> {
        self.count(|c| c.delete += 1);
        self.objects
            .lock()
            .unwrap()
            .remove(&key(resource, namespace, name));
        Ok(())
    }

    async fn list(&self, resource: &ApiResource, namespace: &str) -> Result<Vec<DynamicObject>> {
        self.count(|c| c.list += 1);
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((group, kind, ns, _), _)| {
                *group == resource.group && *kind == resource.kind && ns == namespace
            })
            .map(|(_, obj)| {
                let mut item = obj.clone();
                item.types = None;
                item
            })
            .collect())
    }

    async fn update_status(&self, resource: &ApiResource, obj: &DynamicObject) -> Result<()> {
        self.count(|c| c.update_status += 1);
        let k = object_key(resource, obj);
        let version = self.next_sequence().to_string();

        let mut objects = self.objects.lock().unwrap();
        let current = objects.get_mut(&k).ok_or_else(|| {
            OperatorError::KubeApi(format!("{} {} not found", resource.kind, obj.name_any()))
        })?;
        set_status(current, obj.data.get("status").cloned());
        current.metadata.resource_version = Some(version);
        Ok(())
    }
}
