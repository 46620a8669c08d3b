use super::common::{
    deployment, env, generate_password, secret, secret_env, service, DeploymentParams, Resources,
};
use super::{ComponentReconciler, LogicContext};
use crate::controllers::Outcome;
use crate::crd::replicas;
use crate::error::Result;
use crate::reconcilers::{deployment_mutator, secret_missing_keys_mutator, service_mutator};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::EnvVar;
use std::collections::BTreeMap;

pub const BACKEND_REDIS_SECRET: &str = "backend-redis";
pub const REDIS_STORAGE_URL: &str = "REDIS_STORAGE_URL";
pub const REDIS_QUEUES_URL: &str = "REDIS_QUEUES_URL";

const INTERNAL_API_SECRET: &str = "backend-internal-api";
const LISTENER_PORT: i32 = 3000;

const LISTENER_RESOURCES: Resources = Resources {
    cpu_request: "500m",
    memory_request: "550Mi",
    cpu_limit: "1",
    memory_limit: "700Mi",
};

const WORKER_RESOURCES: Resources = Resources {
    cpu_request: "150m",
    memory_request: "50Mi",
    cpu_limit: "1",
    memory_limit: "300Mi",
};

const CRON_RESOURCES: Resources = Resources {
    cpu_request: "50m",
    memory_request: "40Mi",
    cpu_limit: "150m",
    memory_limit: "80Mi",
};

/// Apisonator: listener, worker, cron and their connection secrets.
pub struct BackendReconciler {
    ctx: LogicContext,
}

impl BackendReconciler {
    pub fn new(ctx: LogicContext) -> Self {
        Self { ctx }
    }

    fn common_env(&self) -> Vec<EnvVar> {
        vec![
            env("RACK_ENV", "production"),
            secret_env("CONFIG_REDIS_PROXY", BACKEND_REDIS_SECRET, REDIS_STORAGE_URL),
            secret_env("CONFIG_QUEUES_MASTER_NAME", BACKEND_REDIS_SECRET, REDIS_QUEUES_URL),
            secret_env("CONFIG_INTERNAL_API_USER", INTERNAL_API_SECRET, "username"),
            secret_env("CONFIG_INTERNAL_API_PASSWORD", INTERNAL_API_SECRET, "password"),
        ]
    }
}

#[async_trait]
impl ComponentReconciler for BackendReconciler {
    fn name(&self) -> &'static str {
        "backend"
    }

    async fn reconcile(&self) -> Result<Outcome> {
        let spec = self.ctx.spec().backend();

        let redis = secret(
            &self.ctx,
            BACKEND_REDIS_SECRET,
            "backend",
            BTreeMap::from([
                (
                    REDIS_STORAGE_URL.to_string(),
                    "redis://backend-redis:6379/0".to_string(),
                ),
                (
                    REDIS_QUEUES_URL.to_string(),
                    "redis://backend-redis:6379/1".to_string(),
                ),
            ]),
        );
        self.ctx
            .reconcile(redis, secret_missing_keys_mutator)
            .await?;

        let internal_api = secret(
            &self.ctx,
            INTERNAL_API_SECRET,
            "backend",
            BTreeMap::from([
                ("username".to_string(), "3scale_api_user".to_string()),
                ("password".to_string(), generate_password(8)),
            ]),
        );
        self.ctx
            .reconcile(internal_api, secret_missing_keys_mutator)
            .await?;

        let workloads = [
            (
                "backend-listener",
                replicas(&spec.listener_spec),
                vec!["bin/3scale_backend", "start", "-e", "production", "-p", "3000", "-x", "/dev/stdout"],
                LISTENER_RESOURCES,
            ),
            (
                "backend-worker",
                replicas(&spec.worker_spec),
                vec!["bin/3scale_backend_worker", "run"],
                WORKER_RESOURCES,
            ),
            (
                "backend-cron",
                replicas(&spec.cron_spec),
                vec!["backend-cron"],
                CRON_RESOURCES,
            ),
        ];
        for (name, count, args, resources) in workloads {
            let desired = deployment(
                &self.ctx,
                DeploymentParams {
                    name,
                    component: "backend",
                    image: spec.image(),
                    replicas: count,
                    port: (name == "backend-listener").then_some(LISTENER_PORT),
                    mounts: vec![],
                    args: args.into_iter().map(String::from).collect(),
                    env: self.common_env(),
                    resources,
                },
            );
            self.ctx.reconcile(desired, deployment_mutator).await?;
        }

        let listener = service(
            &self.ctx,
            "backend-listener",
            "backend",
            "backend-listener",
            LISTENER_PORT,
        );
        self.ctx.reconcile(listener, service_mutator).await?;

        Ok(Outcome::Done)
    }
}
