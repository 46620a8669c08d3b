use super::common::configmap;
use super::{ComponentReconciler, LogicContext};
use crate::controllers::Outcome;
use crate::error::Result;
use crate::reconcilers::configmap_data_mutator;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use std::collections::BTreeMap;

/// Publishes the image of every platform component in the `amp-images`
/// ConfigMap.
pub struct AmpImagesReconciler {
    ctx: LogicContext,
}

impl AmpImagesReconciler {
    pub fn new(ctx: LogicContext) -> Self {
        Self { ctx }
    }

    fn catalog(&self) -> ConfigMap {
        let spec = self.ctx.spec();
        let backend = spec.backend();
        let system = spec.system();
        let data = BTreeMap::from([
            ("amp-apicast".to_string(), spec.apicast().image()),
            ("amp-backend".to_string(), backend.image()),
            ("amp-system".to_string(), system.image()),
            ("amp-zync".to_string(), spec.zync().image()),
            ("backend-redis".to_string(), backend.redis_image()),
            ("system-redis".to_string(), system.redis_image()),
            ("system-memcached".to_string(), system.memcached_image()),
            ("system-database".to_string(), spec.database_image()),
            ("zync-database".to_string(), spec.zync().database_image()),
        ]);
        configmap(&self.ctx, "amp-images", "images", data)
    }
}

#[async_trait]
impl ComponentReconciler for AmpImagesReconciler {
    fn name(&self) -> &'static str {
        "amp-images"
    }

    async fn reconcile(&self) -> Result<Outcome> {
        self.ctx
            .reconcile(self.catalog(), configmap_data_mutator)
            .await?;
        Ok(Outcome::Done)
    }
}
