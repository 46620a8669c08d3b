//! Stock mutators for the convergence engine.
//!
//! A mutator compares the stored object with the desired one, edits the
//! stored copy toward it and returns `true` when it changed something. Each
//! one owns only the fields it compares, so values defaulted by the API server
//! or set by other actors are left alone.

use crate::error::Result;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Container, Secret, Service, ServicePort};

/// Never changes an existing object; creation only.
pub fn create_only_mutator<K>(_existing: &mut K, _desired: &K) -> Result<bool> {
    Ok(false)
}

/// Overwrite ConfigMap data with the desired data.
pub fn configmap_data_mutator(existing: &mut ConfigMap, desired: &ConfigMap) -> Result<bool> {
    if existing.data == desired.data {
        return Ok(false);
    }
    existing.data = desired.data.clone();
    Ok(true)
}

/// Add desired Secret keys that are missing; never rewrite present ones.
///
/// Generated credentials are only ever written once.
pub fn secret_missing_keys_mutator(existing: &mut Secret, desired: &Secret) -> Result<bool> {
    let mut changed = false;
    for (key, value) in desired.data.iter().flatten() {
        let present = existing.data.as_ref().is_some_and(|d| d.contains_key(key))
            || existing
                .string_data
                .as_ref()
                .is_some_and(|d| d.contains_key(key));
        if !present {
            existing
                .data
                .get_or_insert_with(Default::default)
                .insert(key.clone(), value.clone());
            changed = true;
        }
    }
    Ok(changed)
}

/// Sync Service ports (by name and number) and selector.
pub fn service_mutator(existing: &mut Service, desired: &Service) -> Result<bool> {
    let Some(desired_spec) = desired.spec.as_ref() else {
        return Ok(false);
    };
    let spec = existing.spec.get_or_insert_with(Default::default);
    let mut changed = false;

    let port_keys = |ports: &Option<Vec<ServicePort>>| -> Vec<(Option<String>, i32)> {
        ports.iter().flatten().map(|p| (p.name.clone(), p.port)).collect()
    };
    if port_keys(&spec.ports) != port_keys(&desired_spec.ports) {
        spec.ports = desired_spec.ports.clone();
        changed = true;
    }

    if spec.selector != desired_spec.selector {
        spec.selector = desired_spec.selector.clone();
        changed = true;
    }

    Ok(changed)
}

/// Sync Deployment containers and, when the desired object sets one, the
/// replica count. A desired `replicas: None` leaves scaling to whoever owns it.
pub fn deployment_mutator(existing: &mut Deployment, desired: &Deployment) -> Result<bool> {
    let Some(desired_spec) = desired.spec.as_ref() else {
        return Ok(false);
    };
    let spec = existing.spec.get_or_insert_with(Default::default);
    let mut changed = false;

    if desired_spec.replicas.is_some() && spec.replicas != desired_spec.replicas {
        spec.replicas = desired_spec.replicas;
        changed = true;
    }

    let desired_pod = desired_spec.template.spec.as_ref();
    let desired_containers = desired_pod
        .map(|p| p.containers.as_slice())
        .unwrap_or_default();
    let desired_volumes = desired_pod.and_then(|p| p.volumes.as_ref());
    let pod_spec = spec.template.spec.get_or_insert_with(Default::default);

    if pod_spec.volumes.as_ref() != desired_volumes {
        pod_spec.volumes = desired_volumes.cloned();
        changed = true;
    }

    let same_names = pod_spec.containers.len() == desired_containers.len()
        && pod_spec
            .containers
            .iter()
            .zip(desired_containers)
            .all(|(a, b)| a.name == b.name);
    if !same_names {
        pod_spec.containers = desired_containers.to_vec();
        return Ok(true);
    }

    for (container, wanted) in pod_spec.containers.iter_mut().zip(desired_containers) {
        changed |= sync_container(container, wanted);
    }

    Ok(changed)
}

fn sync_container(container: &mut Container, desired: &Container) -> bool {
    let mut changed = false;
    if container.image != desired.image {
        container.image = desired.image.clone();
        changed = true;
    }
    if container.env != desired.env {
        container.env = desired.env.clone();
        changed = true;
    }
    if container.resources != desired.resources {
        container.resources = desired.resources.clone();
        changed = true;
    }
    if container.args != desired.args {
        container.args = desired.args.clone();
        changed = true;
    }
    if container.volume_mounts != desired.volume_mounts {
        container.volume_mounts = desired.volume_mounts.clone();
        changed = true;
    }
    changed
}
