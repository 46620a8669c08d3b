//! Object builders shared by the component reconcilers.

use super::LogicContext;
use crate::crd::APIManager;
use crate::reconcilers::tag_object_to_delete;
use crate::store::StoreObject;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapKeySelector, ConfigMapVolumeSource, Container, ContainerPort, EnvVar,
    EnvVarSource, PodSpec, PodTemplateSpec, ResourceRequirements, Secret, SecretKeySelector,
    Service, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::ByteString;
use kube::{Resource, ResourceExt};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::BTreeMap;

pub const MANAGED_BY: &str = "apimanager-operator";

/// Labels put on every object of a component.
pub fn common_labels(cr: &APIManager, component: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), cr.spec.app_label());
    labels.insert("threescale_component".to_string(), component.to_string());
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        MANAGED_BY.to_string(),
    );
    labels
}

/// Pod selector of one deployment.
pub fn pod_selector(deployment: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("deployment".to_string(), deployment.to_string())])
}

pub fn owner_reference(cr: &APIManager) -> OwnerReference {
    OwnerReference {
        api_version: APIManager::api_version(&()).to_string(),
        kind: APIManager::kind(&()).to_string(),
        name: cr.name_any(),
        uid: cr.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Whether `meta` carries an owner reference to the object with `uid`.
pub fn is_owned_by(meta: &ObjectMeta, uid: &str) -> bool {
    meta.owner_references
        .iter()
        .flatten()
        .any(|owner| owner.uid == uid)
}

/// Tag `obj` for removal when `remove` is set.
pub fn decommission_if<K: StoreObject>(mut obj: K, remove: bool) -> K {
    if remove {
        tag_object_to_delete(&mut obj);
    }
    obj
}

pub fn object_meta(ctx: &LogicContext, name: &str, component: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(ctx.namespace()),
        labels: Some(common_labels(ctx.cr(), component)),
        owner_references: Some(vec![owner_reference(ctx.cr())]),
        ..Default::default()
    }
}

pub fn configmap(
    ctx: &LogicContext,
    name: &str,
    component: &str,
    data: BTreeMap<String, String>,
) -> ConfigMap {
    ConfigMap {
        metadata: object_meta(ctx, name, component),
        data: Some(data),
        ..Default::default()
    }
}

pub fn secret(
    ctx: &LogicContext,
    name: &str,
    component: &str,
    data: BTreeMap<String, String>,
) -> Secret {
    Secret {
        metadata: object_meta(ctx, name, component),
        data: Some(
            data.into_iter()
                .map(|(k, v)| (k, ByteString(v.into_bytes())))
                .collect(),
        ),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

/// Service `name` in front of the pods of `deployment`.
pub fn service(
    ctx: &LogicContext,
    name: &str,
    component: &str,
    deployment: &str,
    port: i32,
) -> Service {
    Service {
        metadata: object_meta(ctx, name, component),
        spec: Some(ServiceSpec {
            selector: Some(pod_selector(deployment)),
            ports: Some(vec![ServicePort {
                name: Some(format!("{}-port", port)),
                port,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// CPU and memory requests/limits of a container.
#[derive(Debug, Clone, Copy)]
pub struct Resources {
    pub cpu_request: &'static str,
    pub memory_request: &'static str,
    pub cpu_limit: &'static str,
    pub memory_limit: &'static str,
}

impl Resources {
    fn build(&self) -> ResourceRequirements {
        let requests = BTreeMap::from([
            ("cpu".to_string(), Quantity(self.cpu_request.to_string())),
            ("memory".to_string(), Quantity(self.memory_request.to_string())),
        ]);
        let limits = BTreeMap::from([
            ("cpu".to_string(), Quantity(self.cpu_limit.to_string())),
            ("memory".to_string(), Quantity(self.memory_limit.to_string())),
        ]);
        ResourceRequirements {
            limits: Some(limits),
            requests: Some(requests),
            ..Default::default()
        }
    }
}

/// A ConfigMap mounted as a directory in the container.
#[derive(Debug, Clone, Copy)]
pub struct ConfigMapMount<'a> {
    pub configmap: &'a str,
    pub path: &'a str,
}

impl ConfigMapMount<'_> {
    fn volume(&self) -> Volume {
        Volume {
            name: self.configmap.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: self.configmap.to_string(),
                // API server default, set so the mutator sees no drift
                default_mode: Some(0o644),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn volume_mount(&self) -> VolumeMount {
        VolumeMount {
            name: self.configmap.to_string(),
            mount_path: self.path.to_string(),
            ..Default::default()
        }
    }
}

/// Parameters of a single-container deployment.
pub struct DeploymentParams<'a> {
    pub name: &'a str,
    pub component: &'a str,
    pub image: String,
    pub replicas: i32,
    pub port: Option<i32>,
    pub mounts: Vec<ConfigMapMount<'a>>,
    pub args: Vec<String>,
    pub env: Vec<EnvVar>,
    pub resources: Resources,
}

pub fn deployment(ctx: &LogicContext, params: DeploymentParams<'_>) -> Deployment {
    let selector = pod_selector(params.name);
    let mut pod_labels = common_labels(ctx.cr(), params.component);
    pod_labels.extend(selector.clone());
    let (volumes, volume_mounts): (Vec<_>, Vec<_>) = params
        .mounts
        .iter()
        .map(|mount| (mount.volume(), mount.volume_mount()))
        .unzip();

    let container = Container {
        name: params.name.to_string(),
        image: Some(params.image),
        args: if params.args.is_empty() {
            None
        } else {
            Some(params.args)
        },
        env: if params.env.is_empty() {
            None
        } else {
            Some(params.env)
        },
        volume_mounts: (!volume_mounts.is_empty()).then_some(volume_mounts),
        ports: params.port.map(|port| {
            vec![ContainerPort {
                container_port: port,
                ..Default::default()
            }]
        }),
        resources: ctx
            .cr()
            .spec
            .resource_requirements_enabled()
            .then(|| params.resources.build()),
        ..Default::default()
    };

    Deployment {
        metadata: object_meta(ctx, params.name, params.component),
        spec: Some(DeploymentSpec {
            replicas: Some(params.replicas),
            selector: LabelSelector {
                match_labels: Some(selector),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: (!volumes.is_empty()).then_some(volumes),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

pub fn secret_env(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn configmap_env(name: &str, configmap: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            config_map_key_ref: Some(ConfigMapKeySelector {
                name: configmap.to_string(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Random alphanumeric credential.
pub fn generate_password(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
