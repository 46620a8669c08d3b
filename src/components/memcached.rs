use super::common::{deployment, service, DeploymentParams, Resources};
use super::{ComponentReconciler, LogicContext};
use crate::controllers::Outcome;
use crate::error::Result;
use crate::reconcilers::{deployment_mutator, service_mutator};
use async_trait::async_trait;

const MEMCACHE: &str = "system-memcache";
const MEMCACHE_PORT: i32 = 11211;

/// Cache in front of the system database.
pub struct MemcachedReconciler {
    ctx: LogicContext,
}

impl MemcachedReconciler {
    pub fn new(ctx: LogicContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ComponentReconciler for MemcachedReconciler {
    fn name(&self) -> &'static str {
        "memcached"
    }

    async fn reconcile(&self) -> Result<Outcome> {
        let desired = deployment(
            &self.ctx,
            DeploymentParams {
                name: MEMCACHE,
                component: "system",
                image: self.ctx.spec().system().memcached_image(),
                replicas: 1,
                port: Some(MEMCACHE_PORT),
                mounts: vec![],
                args: ["memcached", "-m", "64"].map(String::from).to_vec(),
                env: vec![],
                resources: Resources {
                    cpu_request: "50m",
                    memory_request: "64Mi",
                    cpu_limit: "250m",
                    memory_limit: "96Mi",
                },
            },
        );
        self.ctx.reconcile(desired, deployment_mutator).await?;

        let svc = service(&self.ctx, MEMCACHE, "system", MEMCACHE, MEMCACHE_PORT);
        self.ctx.reconcile(svc, service_mutator).await?;

        Ok(Outcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::tests::{context, sample_apimanager, NAMESPACE};
    use crate::store::memory::MemoryStore;
    use k8s_openapi::api::apps::v1::Deployment;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_memcached_image_update() {
        let backend = Arc::new(MemoryStore::new());
        MemcachedReconciler::new(context(backend.clone(), sample_apimanager()))
            .reconcile()
            .await
            .unwrap();

        let mut cr = sample_apimanager();
        cr.spec.system.as_mut().unwrap().memcached_image = Some("memcached:1.6".to_string());
        backend.reset_calls();
        MemcachedReconciler::new(context(backend.clone(), cr))
            .reconcile()
            .await
            .unwrap();

        assert_eq!(backend.calls().update, 1);
        let stored = backend.peek::<Deployment>(NAMESPACE, MEMCACHE).unwrap();
        let container = &stored.spec.unwrap().template.spec.unwrap().containers[0];
        assert_eq!(container.image.as_deref(), Some("memcached:1.6"));
    }
}
