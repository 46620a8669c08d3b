use super::common::{
    configmap, decommission_if, deployment, service, ConfigMapMount, DeploymentParams, Resources,
};
use super::{ComponentReconciler, LogicContext};
use crate::controllers::Outcome;
use crate::error::Result;
use crate::reconcilers::{configmap_data_mutator, deployment_mutator, service_mutator};
use async_trait::async_trait;
use std::collections::BTreeMap;

const REDIS_PORT: i32 = 6379;
const REDIS_CONFIGMAP: &str = "redis-config";
const REDIS_CONFIG_DIR: &str = "/etc/redis.d";

const REDIS_RESOURCES: Resources = Resources {
    cpu_request: "150m",
    memory_request: "256Mi",
    cpu_limit: "2",
    memory_limit: "32Gi",
};

const REDIS_CONF: &str = "protected-mode no\n\
port 6379\n\
timeout 0\n\
tcp-keepalive 300\n\
daemonize no\n\
supervised no\n\
loglevel notice\n\
databases 16\n\
save 900 1\n\
save 300 10\n\
save 60 10000\n\
stop-writes-on-bgsave-error yes\n\
rdbcompression yes\n\
rdbchecksum yes\n\
dbfilename dump.rdb\n\
dir /var/lib/redis/data\n\
appendonly yes\n\
appendfilename appendonly.aof\n";

/// In-cluster Redis instances of backend and system.
///
/// With high availability enabled the data tier is external, so the
/// in-cluster instances are decommissioned instead.
pub struct RedisReconciler {
    ctx: LogicContext,
}

impl RedisReconciler {
    pub fn new(ctx: LogicContext) -> Self {
        Self { ctx }
    }
}

fn redis_deployment<'a>(name: &'a str, component: &'a str, image: String) -> DeploymentParams<'a> {
    DeploymentParams {
        name,
        component,
        image,
        replicas: 1,
        port: Some(REDIS_PORT),
        mounts: vec![ConfigMapMount {
            configmap: REDIS_CONFIGMAP,
            path: REDIS_CONFIG_DIR,
        }],
        args: vec![format!("{REDIS_CONFIG_DIR}/redis.conf")],
        env: vec![],
        resources: REDIS_RESOURCES,
    }
}

#[async_trait]
impl ComponentReconciler for RedisReconciler {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn reconcile(&self) -> Result<Outcome> {
        let remove = self.ctx.spec().high_availability_enabled();

        let conf = configmap(
            &self.ctx,
            REDIS_CONFIGMAP,
            "redis",
            BTreeMap::from([("redis.conf".to_string(), REDIS_CONF.to_string())]),
        );
        self.ctx
            .reconcile(decommission_if(conf, remove), configmap_data_mutator)
            .await?;

        let instances = [
            ("backend-redis", "backend", self.ctx.spec().backend().redis_image()),
            ("system-redis", "system", self.ctx.spec().system().redis_image()),
        ];
        for (name, component, image) in instances {
            let desired = deployment(&self.ctx, redis_deployment(name, component, image));
            self.ctx
                .reconcile(decommission_if(desired, remove), deployment_mutator)
                .await?;

            let svc = service(&self.ctx, name, component, name, REDIS_PORT);
            self.ctx
                .reconcile(decommission_if(svc, remove), service_mutator)
                .await?;
        }

        Ok(Outcome::Done)
    }
}
