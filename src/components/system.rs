use super::common::{
    configmap, configmap_env, deployment, env, generate_password, secret, secret_env, service,
    DeploymentParams, Resources,
};
use super::system_database::SYSTEM_DATABASE_SECRET;
use super::{ComponentReconciler, LogicContext};
use crate::controllers::Outcome;
use crate::crd::replicas;
use crate::error::Result;
use crate::reconcilers::{
    configmap_data_mutator, deployment_mutator, secret_missing_keys_mutator, service_mutator,
};
use crate::version::THREESCALE_RELEASE;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::EnvVar;
use std::collections::BTreeMap;

const SEED_SECRET: &str = "system-seed";
/// Connection Secret of the system Redis. Kept under high availability,
/// where it points at the external instance.
pub const SYSTEM_REDIS_SECRET: &str = "system-redis";
const ENVIRONMENT: &str = "system-environment";
const PROVIDER_PORT: i32 = 3000;

/// Seed credentials, shared environment and the system application with
/// its sidekiq workers.
pub struct SystemReconciler {
    ctx: LogicContext,
}

impl SystemReconciler {
    pub fn new(ctx: LogicContext) -> Self {
        Self { ctx }
    }

    fn seed(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("MASTER_DOMAIN".to_string(), "master".to_string()),
            ("MASTER_USER".to_string(), "master".to_string()),
            ("MASTER_PASSWORD".to_string(), generate_password(8)),
            ("MASTER_ACCESS_TOKEN".to_string(), generate_password(8)),
            ("TENANT_NAME".to_string(), self.ctx.spec().tenant_name()),
            ("ADMIN_USER".to_string(), "admin".to_string()),
            ("ADMIN_PASSWORD".to_string(), generate_password(8)),
            ("ADMIN_ACCESS_TOKEN".to_string(), generate_password(16)),
        ])
    }

    fn environment(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("AMP_RELEASE".to_string(), THREESCALE_RELEASE.to_string()),
            (
                "APICAST_REGISTRY_URL".to_string(),
                "http://apicast-staging:8090/policies".to_string(),
            ),
            ("FORCE_SSL".to_string(), "true".to_string()),
            ("PROVIDER_PLUGIN".to_string(), "3scale".to_string()),
            ("RAILS_ENV".to_string(), "production".to_string()),
            ("RAILS_LOG_LEVEL".to_string(), "info".to_string()),
            ("RAILS_LOG_TO_STDOUT".to_string(), "true".to_string()),
            ("THINKING_SPHINX_PORT".to_string(), "9306".to_string()),
            (
                "THREESCALE_SUPERDOMAIN".to_string(),
                self.ctx.spec().wildcard_domain.clone(),
            ),
        ])
    }

    fn app_env(&self) -> Vec<EnvVar> {
        let mut vars: Vec<EnvVar> = self
            .environment()
            .keys()
            .map(|key| configmap_env(key, ENVIRONMENT, key))
            .collect();
        vars.extend([
            secret_env("DATABASE_URL", SYSTEM_DATABASE_SECRET, "URL"),
            secret_env("REDIS_URL", SYSTEM_REDIS_SECRET, "URL"),
            env("MEMCACHE_SERVERS", "system-memcache:11211"),
            env("BACKEND_ROUTE", "http://backend-listener:3000"),
            secret_env("MASTER_USER", SEED_SECRET, "MASTER_USER"),
            secret_env("MASTER_PASSWORD", SEED_SECRET, "MASTER_PASSWORD"),
            secret_env("USER_LOGIN", SEED_SECRET, "ADMIN_USER"),
            secret_env("USER_PASSWORD", SEED_SECRET, "ADMIN_PASSWORD"),
            secret_env("TENANT_NAME", SEED_SECRET, "TENANT_NAME"),
        ]);
        vars
    }
}

#[async_trait]
impl ComponentReconciler for SystemReconciler {
    fn name(&self) -> &'static str {
        "system"
    }

    async fn reconcile(&self) -> Result<Outcome> {
        let spec = self.ctx.spec().system();

        let seed = secret(&self.ctx, SEED_SECRET, "system", self.seed());
        self.ctx.reconcile(seed, secret_missing_keys_mutator).await?;

        let redis = secret(
            &self.ctx,
            SYSTEM_REDIS_SECRET,
            "system",
            BTreeMap::from([("URL".to_string(), "redis://system-redis:6379/1".to_string())]),
        );
        self.ctx.reconcile(redis, secret_missing_keys_mutator).await?;

        let environment = configmap(&self.ctx, ENVIRONMENT, "system", self.environment());
        self.ctx
            .reconcile(environment, configmap_data_mutator)
            .await?;

        let app = deployment(
            &self.ctx,
            DeploymentParams {
                name: "system-app",
                component: "system",
                image: spec.image(),
                replicas: replicas(&spec.app_spec),
                port: Some(PROVIDER_PORT),
                mounts: vec![],
                args: vec![],
                env: self.app_env(),
                resources: Resources {
                    cpu_request: "50m",
                    memory_request: "600Mi",
                    cpu_limit: "1",
                    memory_limit: "800Mi",
                },
            },
        );
        self.ctx.reconcile(app, deployment_mutator).await?;

        let sidekiq = deployment(
            &self.ctx,
            DeploymentParams {
                name: "system-sidekiq",
                component: "system",
                image: spec.image(),
                replicas: replicas(&spec.sidekiq_spec),
                port: None,
                mounts: vec![],
                args: ["rake", "sidekiq:worker", "RAILS_MAX_THREADS=25"]
                    .map(String::from)
                    .to_vec(),
                env: self.app_env(),
                resources: Resources {
                    cpu_request: "100m",
                    memory_request: "500Mi",
                    cpu_limit: "1",
                    memory_limit: "2Gi",
                },
            },
        );
        self.ctx.reconcile(sidekiq, deployment_mutator).await?;

        let provider = service(
            &self.ctx,
            "system-provider",
            "system",
            "system-app",
            PROVIDER_PORT,
        );
        self.ctx.reconcile(provider, service_mutator).await?;

        Ok(Outcome::Done)
    }
}
