use super::common::{
    configmap, configmap_env, deployment, env, service, DeploymentParams, Resources,
};
use super::{ComponentReconciler, LogicContext};
use crate::controllers::Outcome;
use crate::crd::replicas;
use crate::error::Result;
use crate::reconcilers::{configmap_data_mutator, deployment_mutator, service_mutator};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::EnvVar;
use std::collections::BTreeMap;

const ENVIRONMENT: &str = "apicast-environment";
const GATEWAY_PORT: i32 = 8080;

const GATEWAY_RESOURCES: Resources = Resources {
    cpu_request: "50m",
    memory_request: "64Mi",
    cpu_limit: "100m",
    memory_limit: "128Mi",
};

/// Staging and production gateways.
pub struct ApicastReconciler {
    ctx: LogicContext,
}

struct Gateway {
    name: &'static str,
    environment: &'static str,
    loader: &'static str,
    cache_ttl: &'static str,
}

const GATEWAYS: [Gateway; 2] = [
    Gateway {
        name: "apicast-staging",
        environment: "staging",
        loader: "lazy",
        cache_ttl: "0",
    },
    Gateway {
        name: "apicast-production",
        environment: "production",
        loader: "boot",
        cache_ttl: "300",
    },
];

impl ApicastReconciler {
    pub fn new(ctx: LogicContext) -> Self {
        Self { ctx }
    }

    fn environment(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("APICAST_MANAGEMENT_API".to_string(), "status".to_string()),
            ("OPENSSL_VERIFY".to_string(), "false".to_string()),
            ("APICAST_RESPONSE_CODES".to_string(), "true".to_string()),
        ])
    }

    fn gateway_env(&self, gateway: &Gateway) -> Vec<EnvVar> {
        let mut vars = vec![
            env("THREESCALE_DEPLOYMENT_ENV", gateway.environment),
            env("APICAST_CONFIGURATION_LOADER", gateway.loader),
            env("APICAST_CONFIGURATION_CACHE", gateway.cache_ttl),
            env(
                "THREESCALE_PORTAL_ENDPOINT",
                "http://system-provider:3000/master/api/proxy/configs",
            ),
        ];
        vars.extend(
            self.environment()
                .keys()
                .map(|key| configmap_env(key, ENVIRONMENT, key)),
        );
        vars
    }
}

#[async_trait]
impl ComponentReconciler for ApicastReconciler {
    fn name(&self) -> &'static str {
        "apicast"
    }

    async fn reconcile(&self) -> Result<Outcome> {
        let spec = self.ctx.spec().apicast();

        let environment = configmap(&self.ctx, ENVIRONMENT, "apicast", self.environment());
        self.ctx
            .reconcile(environment, configmap_data_mutator)
            .await?;

        for gateway in &GATEWAYS {
            let count = if gateway.environment == "staging" {
                replicas(&spec.staging_spec)
            } else {
                replicas(&spec.production_spec)
            };
            let desired = deployment(
                &self.ctx,
                DeploymentParams {
                    name: gateway.name,
                    component: "apicast",
                    image: spec.image(),
                    replicas: count,
                    port: Some(GATEWAY_PORT),
                    mounts: vec![],
                    args: vec![],
                    env: self.gateway_env(gateway),
                    resources: GATEWAY_RESOURCES,
                },
            );
            self.ctx.reconcile(desired, deployment_mutator).await?;

            let svc = service(&self.ctx, gateway.name, "apicast", gateway.name, GATEWAY_PORT);
            self.ctx.reconcile(svc, service_mutator).await?;
        }

        Ok(Outcome::Done)
    }
}
