//! Convergence engine
//!
//! [`reconcile_resource`] drives one managed object toward its desired state:
//! it creates what is missing, lets a mutator decide which fields of an
//! existing object should move, and deletes objects whose desired state
//! carries the delete tag.

mod mutators;

pub use mutators::{
    configmap_data_mutator, create_only_mutator, deployment_mutator, secret_missing_keys_mutator,
    service_mutator,
};

use crate::error::Result;
use crate::store::{identity, Store, StoreObject};
use kube::ResourceExt;
use tracing::{debug, info};

/// Annotation marking a desired object for removal.
pub const DELETE_TAG_ANNOTATION: &str = "apps.3scale.net/delete";

/// Mark a desired object for removal instead of creation or update.
pub fn tag_object_to_delete<K: StoreObject>(obj: &mut K) {
    obj.annotations_mut()
        .insert(DELETE_TAG_ANNOTATION.to_string(), "true".to_string());
}

pub fn is_object_tagged_to_delete<K: StoreObject>(obj: &K) -> bool {
    obj.annotations()
        .get(DELETE_TAG_ANNOTATION)
        .is_some_and(|v| v == "true")
}

/// Converge the stored object identified by `desired` toward `desired`.
///
/// `mutate(existing, desired)` edits `existing` in place and reports whether
/// it changed anything; only then is `existing` written back. Store errors are
/// returned as they are.
pub async fn reconcile_resource<K, F>(store: &Store, desired: K, mutate: F) -> Result<()>
where
    K: StoreObject,
    F: Fn(&mut K, &K) -> Result<bool> + Send + Sync,
{
    let (namespace, name) = identity(&desired)?;
    let kind = K::kind(&());
    let tagged = is_object_tagged_to_delete(&desired);

    let Some(mut existing) = store.get::<K>(&namespace, &name).await? else {
        if tagged {
            return Ok(());
        }
        info!(kind = %kind, namespace = %namespace, name = %name, "Created object");
        return store.create(&desired).await;
    };

    if tagged {
        info!(kind = %kind, namespace = %namespace, name = %name, "Deleted object");
        return store.delete(&existing).await;
    }

    if mutate(&mut existing, &desired)? {
        debug!(kind = %kind, namespace = %namespace, name = %name, "Updated object");
        store.update(&existing).await?;
    }

    Ok(())
}
