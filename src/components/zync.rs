use super::common::{
    deployment, env, generate_password, secret, secret_env, service, DeploymentParams, Resources,
};
use super::{ComponentReconciler, LogicContext};
use crate::controllers::Outcome;
use crate::crd::replicas;
use crate::error::Result;
use crate::reconcilers::{deployment_mutator, secret_missing_keys_mutator, service_mutator};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{EnvVar, Secret};
use std::collections::BTreeMap;

const ZYNC_SECRET: &str = "zync";
const ZYNC_PORT: i32 = 8080;
const ZYNC_DATABASE_PORT: i32 = 5432;

/// Zync, its que worker and its dedicated PostgreSQL.
pub struct ZyncReconciler {
    ctx: LogicContext,
}

impl ZyncReconciler {
    pub fn new(ctx: LogicContext) -> Self {
        Self { ctx }
    }

    fn secret(&self) -> Secret {
        let password = generate_password(16);
        secret(
            &self.ctx,
            ZYNC_SECRET,
            "zync",
            BTreeMap::from([
                (
                    "DATABASE_URL".to_string(),
                    format!(
                        "postgresql://zync:{}@zync-database:{}/zync_production",
                        password, ZYNC_DATABASE_PORT
                    ),
                ),
                ("ZYNC_DATABASE_PASSWORD".to_string(), password),
                ("SECRET_KEY_BASE".to_string(), generate_password(16)),
                ("ZYNC_AUTHENTICATION_TOKEN".to_string(), generate_password(16)),
            ]),
        )
    }

    fn app_env(&self) -> Vec<EnvVar> {
        vec![
            env("RAILS_LOG_TO_STDOUT", "true"),
            env("RAILS_ENV", "production"),
            secret_env("DATABASE_URL", ZYNC_SECRET, "DATABASE_URL"),
            secret_env("SECRET_KEY_BASE", ZYNC_SECRET, "SECRET_KEY_BASE"),
            secret_env("ZYNC_AUTHENTICATION_TOKEN", ZYNC_SECRET, "ZYNC_AUTHENTICATION_TOKEN"),
        ]
    }
}

#[async_trait]
impl ComponentReconciler for ZyncReconciler {
    fn name(&self) -> &'static str {
        "zync"
    }

    async fn reconcile(&self) -> Result<Outcome> {
        let spec = self.ctx.spec().zync();

        self.ctx
            .reconcile(self.secret(), secret_missing_keys_mutator)
            .await?;

        let app = deployment(
            &self.ctx,
            DeploymentParams {
                name: "zync",
                component: "zync",
                image: spec.image(),
                replicas: replicas(&spec.app_spec),
                port: Some(ZYNC_PORT),
                mounts: vec![],
                args: vec![],
                env: self.app_env(),
                resources: Resources {
                    cpu_request: "150m",
                    memory_request: "250M",
                    cpu_limit: "1",
                    memory_limit: "512Mi",
                },
            },
        );
        self.ctx.reconcile(app, deployment_mutator).await?;

        let que = deployment(
            &self.ctx,
            DeploymentParams {
                name: "zync-que",
                component: "zync",
                image: spec.image(),
                replicas: replicas(&spec.que_spec),
                port: None,
                mounts: vec![],
                args: ["/usr/bin/bash", "-c", "bundle exec rake 'que[--worker-count 10]'"]
                    .map(String::from)
                    .to_vec(),
                env: self.app_env(),
                resources: Resources {
                    cpu_request: "250m",
                    memory_request: "250M",
                    cpu_limit: "1",
                    memory_limit: "512Mi",
                },
            },
        );
        self.ctx.reconcile(que, deployment_mutator).await?;

        let database = deployment(
            &self.ctx,
            DeploymentParams {
                name: "zync-database",
                component: "zync",
                image: spec.database_image(),
                replicas: 1,
                port: Some(ZYNC_DATABASE_PORT),
                mounts: vec![],
                args: vec![],
                env: vec![
                    env("POSTGRESQL_USER", "zync"),
                    secret_env("POSTGRESQL_PASSWORD", ZYNC_SECRET, "ZYNC_DATABASE_PASSWORD"),
                    env("POSTGRESQL_DATABASE", "zync_production"),
                ],
                resources: Resources {
                    cpu_request: "50m",
                    memory_request: "250M",
                    cpu_limit: "250m",
                    memory_limit: "2G",
                },
            },
        );
        self.ctx.reconcile(database, deployment_mutator).await?;

        for (name, port) in [("zync", ZYNC_PORT), ("zync-database", ZYNC_DATABASE_PORT)] {
            let svc = service(&self.ctx, name, "zync", name, port);
            self.ctx.reconcile(svc, service_mutator).await?;
        }

        Ok(Outcome::Done)
    }
}
