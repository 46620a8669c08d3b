//! System database tier, MySQL or PostgreSQL.
//!
//! Exactly one engine is provisioned per APIManager. Both engine reconcilers
//! refuse to run while the other engine's deployment, owned by the same
//! resource, still exists.

use super::common::{
    configmap, decommission_if, deployment, env, generate_password, secret, secret_env, service,
    DeploymentParams, Resources,
};
use super::{ComponentReconciler, LogicContext};
use crate::controllers::Outcome;
use crate::crd::DatabaseEngine;
use crate::error::{OperatorError, Result};
use crate::reconcilers::{
    configmap_data_mutator, deployment_mutator, secret_missing_keys_mutator, service_mutator,
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{EnvVar, Secret};
use std::collections::BTreeMap;
use tracing::warn;

pub const SYSTEM_DATABASE_SECRET: &str = "system-database";

struct Flavor {
    deployment: &'static str,
    image_catalog: &'static str,
    port: i32,
    resources: Resources,
}

const MYSQL: Flavor = Flavor {
    deployment: "system-mysql",
    image_catalog: "system-mysql-image",
    port: 3306,
    resources: Resources {
        cpu_request: "250m",
        memory_request: "512Mi",
        cpu_limit: "2",
        memory_limit: "2Gi",
    },
};

const POSTGRESQL: Flavor = Flavor {
    deployment: "system-postgresql",
    image_catalog: "system-postgresql-image",
    port: 5432,
    resources: Resources {
        cpu_request: "250m",
        memory_request: "512Mi",
        cpu_limit: "2",
        memory_limit: "2Gi",
    },
};

fn flavor(engine: DatabaseEngine) -> &'static Flavor {
    match engine {
        DatabaseEngine::MySQL => &MYSQL,
        DatabaseEngine::PostgreSQL => &POSTGRESQL,
    }
}

fn other(engine: DatabaseEngine) -> DatabaseEngine {
    match engine {
        DatabaseEngine::MySQL => DatabaseEngine::PostgreSQL,
        DatabaseEngine::PostgreSQL => DatabaseEngine::MySQL,
    }
}

/// Fail when the other engine is already provisioned for this resource.
async fn ensure_no_engine_change(ctx: &LogicContext, declared: DatabaseEngine) -> Result<()> {
    let existing = other(declared);
    if ctx.owns_deployment(flavor(existing).deployment).await? {
        warn!(
            declared = %declared,
            existing = %existing,
            "Declared database engine differs from the provisioned one"
        );
        return Err(OperatorError::DatabaseEngineChange {
            declared: declared.to_string(),
            existing: existing.to_string(),
        });
    }
    Ok(())
}

fn connection_secret(ctx: &LogicContext, engine: DatabaseEngine) -> Secret {
    let password = generate_password(8);
    let data = match engine {
        DatabaseEngine::MySQL => {
            let root_password = generate_password(8);
            BTreeMap::from([
                (
                    "URL".to_string(),
                    format!("mysql2://root:{}@system-mysql/prod", root_password),
                ),
                ("DB_USER".to_string(), "mysql".to_string()),
                ("DB_PASSWORD".to_string(), password),
                ("DB_ROOT_PASSWORD".to_string(), root_password),
            ])
        }
        DatabaseEngine::PostgreSQL => BTreeMap::from([
            (
                "URL".to_string(),
                format!("postgresql://system:{}@system-postgresql/system", password),
            ),
            ("DB_USER".to_string(), "system".to_string()),
            ("DB_PASSWORD".to_string(), password),
        ]),
    };
    secret(ctx, SYSTEM_DATABASE_SECRET, "system", data)
}

fn database_env(engine: DatabaseEngine) -> Vec<EnvVar> {
    match engine {
        DatabaseEngine::MySQL => vec![
            secret_env("MYSQL_USER", SYSTEM_DATABASE_SECRET, "DB_USER"),
            secret_env("MYSQL_PASSWORD", SYSTEM_DATABASE_SECRET, "DB_PASSWORD"),
            secret_env("MYSQL_ROOT_PASSWORD", SYSTEM_DATABASE_SECRET, "DB_ROOT_PASSWORD"),
            env("MYSQL_DATABASE", "prod"),
        ],
        DatabaseEngine::PostgreSQL => vec![
            secret_env("POSTGRESQL_USER", SYSTEM_DATABASE_SECRET, "DB_USER"),
            secret_env("POSTGRESQL_PASSWORD", SYSTEM_DATABASE_SECRET, "DB_PASSWORD"),
            env("POSTGRESQL_DATABASE", "system"),
        ],
    }
}

async fn reconcile_database(ctx: &LogicContext, engine: DatabaseEngine) -> Result<Outcome> {
    ensure_no_engine_change(ctx, engine).await?;

    let remove = ctx.spec().high_availability_enabled();
    let flavor = flavor(engine);

    ctx.reconcile(connection_secret(ctx, engine), secret_missing_keys_mutator)
        .await?;

    let desired = deployment(
        ctx,
        DeploymentParams {
            name: flavor.deployment,
            component: "system",
            image: ctx.spec().database_image(),
            replicas: 1,
            port: Some(flavor.port),
            mounts: vec![],
            args: vec![],
            env: database_env(engine),
            resources: flavor.resources,
        },
    );
    ctx.reconcile(decommission_if(desired, remove), deployment_mutator)
        .await?;

    let svc = service(ctx, flavor.deployment, "system", flavor.deployment, flavor.port);
    ctx.reconcile(decommission_if(svc, remove), service_mutator)
        .await?;

    Ok(Outcome::Done)
}

async fn reconcile_image(ctx: &LogicContext, engine: DatabaseEngine) -> Result<Outcome> {
    let remove = ctx.spec().high_availability_enabled();
    let catalog = configmap(
        ctx,
        flavor(engine).image_catalog,
        "system",
        BTreeMap::from([("image".to_string(), ctx.spec().database_image())]),
    );
    ctx.reconcile(decommission_if(catalog, remove), configmap_data_mutator)
        .await?;
    Ok(Outcome::Done)
}

pub struct SystemMySQLReconciler {
    ctx: LogicContext,
}

impl SystemMySQLReconciler {
    pub fn new(ctx: LogicContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ComponentReconciler for SystemMySQLReconciler {
    fn name(&self) -> &'static str {
        "system-mysql"
    }

    async fn reconcile(&self) -> Result<Outcome> {
        reconcile_database(&self.ctx, DatabaseEngine::MySQL).await
    }
}

pub struct SystemMySQLImageReconciler {
    ctx: LogicContext,
}

impl SystemMySQLImageReconciler {
    pub fn new(ctx: LogicContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ComponentReconciler for SystemMySQLImageReconciler {
    fn name(&self) -> &'static str {
        "system-mysql-image"
    }

    async fn reconcile(&self) -> Result<Outcome> {
        reconcile_image(&self.ctx, DatabaseEngine::MySQL).await
    }
}

pub struct SystemPostgreSQLReconciler {
    ctx: LogicContext,
}

impl SystemPostgreSQLReconciler {
    pub fn new(ctx: LogicContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ComponentReconciler for SystemPostgreSQLReconciler {
    fn name(&self) -> &'static str {
        "system-postgresql"
    }

    async fn reconcile(&self) -> Result<Outcome> {
        reconcile_database(&self.ctx, DatabaseEngine::PostgreSQL).await
    }
}

pub struct SystemPostgreSQLImageReconciler {
    ctx: LogicContext,
}

impl SystemPostgreSQLImageReconciler {
    pub fn new(ctx: LogicContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ComponentReconciler for SystemPostgreSQLImageReconciler {
    fn name(&self) -> &'static str {
        "system-postgresql-image"
    }

    async fn reconcile(&self) -> Result<Outcome> {
        reconcile_image(&self.ctx, DatabaseEngine::PostgreSQL).await
    }
}
