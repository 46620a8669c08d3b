//! Platform components
//!
//! Each component reconciler owns one slice of the platform (gateway,
//! backend, data tiers...) and converges it once per pass. [`pipeline`]
//! returns them in the order the dispatcher must run them.

pub mod common;

mod apicast;
mod backend;
mod images;
mod memcached;
mod redis;
mod system;
mod system_database;
mod zync;

pub use apicast::ApicastReconciler;
pub use backend::{BackendReconciler, BACKEND_REDIS_SECRET, REDIS_QUEUES_URL, REDIS_STORAGE_URL};
pub use images::AmpImagesReconciler;
pub use memcached::MemcachedReconciler;
pub use redis::RedisReconciler;
pub use system::SystemReconciler;
pub use system_database::{
    SystemMySQLImageReconciler, SystemMySQLReconciler, SystemPostgreSQLImageReconciler,
    SystemPostgreSQLReconciler,
};
pub use zync::ZyncReconciler;

use crate::controllers::Outcome;
use crate::crd::{APIManager, APIManagerSpec, DatabaseEngine};
use crate::error::Result;
use crate::reconcilers::reconcile_resource;
use crate::store::{Store, StoreObject};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::Span;

/// One platform component, reconciled once per pass.
#[async_trait]
pub trait ComponentReconciler: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Converge every object of the component once.
    async fn reconcile(&self) -> Result<Outcome>;
}

/// Everything a component needs during one pass: the store, a snapshot of
/// the defaulted resource and the pass span.
#[derive(Clone)]
pub struct LogicContext {
    store: Store,
    cr: Arc<APIManager>,
    span: Span,
}

impl LogicContext {
    pub fn new(store: Store, cr: Arc<APIManager>, span: Span) -> Self {
        Self { store, cr, span }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn cr(&self) -> &APIManager {
        &self.cr
    }

    pub fn spec(&self) -> &APIManagerSpec {
        &self.cr.spec
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn namespace(&self) -> String {
        self.cr.namespace().unwrap_or_default()
    }

    /// Converge `desired` through the store. See [`reconcile_resource`].
    pub async fn reconcile<K, F>(&self, desired: K, mutate: F) -> Result<()>
    where
        K: StoreObject,
        F: Fn(&mut K, &K) -> Result<bool> + Send + Sync,
    {
        reconcile_resource(&self.store, desired, mutate).await
    }

    /// Whether deployment `name` exists and is owned by this resource.
    pub async fn owns_deployment(&self, name: &str) -> Result<bool> {
        let uid = self.cr.metadata.uid.clone().unwrap_or_default();
        let found = self
            .store
            .get::<Deployment>(&self.namespace(), name)
            .await?;
        Ok(found.is_some_and(|d| common::is_owned_by(&d.metadata, &uid)))
    }
}

/// Database engine the system application runs on.
pub fn select_database(spec: &APIManagerSpec) -> DatabaseEngine {
    spec.database_engine()
}

/// Component reconcilers of one pass, in dispatch order.
pub fn pipeline(ctx: &LogicContext) -> Vec<Box<dyn ComponentReconciler>> {
    let mut components: Vec<Box<dyn ComponentReconciler>> = vec![
        Box::new(AmpImagesReconciler::new(ctx.clone())),
        Box::new(RedisReconciler::new(ctx.clone())),
        Box::new(BackendReconciler::new(ctx.clone())),
    ];

    match select_database(ctx.spec()) {
        DatabaseEngine::PostgreSQL => {
            components.push(Box::new(SystemPostgreSQLReconciler::new(ctx.clone())));
            components.push(Box::new(SystemPostgreSQLImageReconciler::new(ctx.clone())));
        }
        DatabaseEngine::MySQL => {
            components.push(Box::new(SystemMySQLReconciler::new(ctx.clone())));
            components.push(Box::new(SystemMySQLImageReconciler::new(ctx.clone())));
        }
    }

    components.push(Box::new(MemcachedReconciler::new(ctx.clone())));
    components.push(Box::new(SystemReconciler::new(ctx.clone())));
    components.push(Box::new(ZyncReconciler::new(ctx.clone())));
    components.push(Box::new(ApicastReconciler::new(ctx.clone())));
    components
}
