//! Status aggregator
//!
//! Rolls the deployments owned by an APIManager up into its status and
//! writes the status subresource only when the rollup differs from what is
//! recorded.

use crate::components::common::is_owned_by;
use crate::conditions::{
    build_condition, set_condition, ConditionFields, APIMANAGER_CONDITION_AVAILABLE,
    CONDITION_FALSE, CONDITION_TRUE,
};
use crate::crd::{APIManager, APIManagerStatus, DeploymentStatus};
use crate::error::Result;
use crate::store::Store;
use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;
use tracing::{debug, info};

/// Group deployments by readiness. Names are sorted within each group.
pub fn derive_deployment_status(deployments: &[Deployment]) -> DeploymentStatus {
    let mut status = DeploymentStatus::default();
    for deployment in deployments {
        let name = deployment.name_any();
        // The API server defaults an unset replica count to 1
        let desired = deployment
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(1);
        let ready = deployment
            .status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0);

        if desired == 0 {
            status.stopped.push(name);
        } else if ready < desired {
            status.starting.push(name);
        } else {
            status.ready.push(name);
        }
    }
    status.ready.sort();
    status.starting.sort();
    status.stopped.sort();
    status
}

/// Status for `cr` given the deployments it owns.
pub fn build_status(cr: &APIManager, owned: &[Deployment]) -> APIManagerStatus {
    let deployments = derive_deployment_status(owned);
    let previous = cr.status.clone().unwrap_or_default();

    let mut conditions: Vec<ConditionFields> = previous
        .conditions
        .into_iter()
        .map(ConditionFields::from)
        .collect();

    let total = deployments.ready.len() + deployments.starting.len() + deployments.stopped.len();
    let available = deployments.starting.is_empty() && !deployments.ready.is_empty();
    let (status, reason) = if available {
        (CONDITION_TRUE, "DeploymentsReady")
    } else {
        (CONDITION_FALSE, "DeploymentsNotReady")
    };
    let message = format!("{}/{} deployments ready", deployments.ready.len(), total);
    set_condition(
        &mut conditions,
        build_condition(APIMANAGER_CONDITION_AVAILABLE, status, reason, &message),
    );

    APIManagerStatus {
        deployments,
        conditions: conditions
            .into_iter()
            .map(|c| c.into_apimanager_condition())
            .collect(),
    }
}

/// Recompute the status of `cr` and persist it when it changed.
pub async fn compute_and_persist(store: &Store, cr: &APIManager) -> Result<()> {
    let namespace = cr.namespace().unwrap_or_default();
    let uid = cr.metadata.uid.clone().unwrap_or_default();

    let owned: Vec<Deployment> = store
        .list::<Deployment>(&namespace)
        .await?
        .into_iter()
        .filter(|d| is_owned_by(&d.metadata, &uid))
        .collect();

    let status = build_status(cr, &owned);
    if cr.status.as_ref() == Some(&status) {
        debug!(name = %cr.name_any(), namespace = %namespace, "Status unchanged");
        return Ok(());
    }

    info!(
        name = %cr.name_any(),
        namespace = %namespace,
        ready = status.deployments.ready.len(),
        starting = status.deployments.starting.len(),
        stopped = status.deployments.stopped.len(),
        "Updating status"
    );
    let mut updated = cr.clone();
    updated.status = Some(status);
    store.update_status(&updated).await
}
