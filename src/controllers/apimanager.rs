//! APIManager Controller
//!
//! Drives one APIManager through a pass of the control loop: defaulting,
//! version bootstrap, upgrade, component dispatch and status rollup. Every
//! step that writes the resource ends the pass with a requeue, so the next
//! pass starts from what the API server actually stored.

use super::dispatch::{dispatch, Outcome};
use super::status;
use crate::components::{self, ComponentReconciler, LogicContext};
use crate::crd::APIManager;
use crate::error::{OperatorError, Result};
use crate::store::{KubeStore, Store};
use crate::upgrade;
use crate::version::{self, VersionInfo};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::{Client, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

/// Builds the component reconcilers of one pass.
pub type PipelineFactory =
    Arc<dyn Fn(&LogicContext) -> Vec<Box<dyn ComponentReconciler>> + Send + Sync>;

/// One-pass state machine over an APIManager, independent of the watch loop.
pub struct ApiManagerReconciler {
    store: Store,
    versions: VersionInfo,
    pipeline: PipelineFactory,
}

impl ApiManagerReconciler {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            versions: VersionInfo::compiled(),
            pipeline: Arc::new(components::pipeline),
        }
    }

    /// Run as if compiled with `versions`.
    pub fn with_versions(mut self, versions: VersionInfo) -> Self {
        self.versions = versions;
        self
    }

    pub fn with_pipeline<F>(mut self, pipeline: F) -> Self
    where
        F: Fn(&LogicContext) -> Vec<Box<dyn ComponentReconciler>> + Send + Sync + 'static,
    {
        self.pipeline = Arc::new(pipeline);
        self
    }

    /// Run one pass for the APIManager `namespace/name`.
    pub async fn reconcile_pass(&self, namespace: &str, name: &str) -> Result<Outcome> {
        let span = info_span!("reconcile", namespace, name);
        self.pass(namespace, name, span.clone())
            .instrument(span)
            .await
    }

    async fn pass(&self, namespace: &str, name: &str, span: Span) -> Result<Outcome> {
        let Some(mut cr) = self.store.get::<APIManager>(namespace, name).await? else {
            debug!("APIManager not found, nothing to do");
            return Ok(Outcome::Done);
        };

        if cr.apply_defaults()? {
            info!("Applied spec defaults");
            self.store.update(&cr).await?;
            return Ok(Outcome::Requeue);
        }

        let Some(installed) = version::installed(cr.metadata.annotations.as_ref()) else {
            info!(
                operator = %self.versions.operator,
                release = %self.versions.release,
                "Recording installed versions"
            );
            self.versions.stamp(cr.annotations_mut());
            self.store.update(&cr).await?;
            return Ok(Outcome::Requeue);
        };

        let ctx = LogicContext::new(self.store.clone(), Arc::new(cr.clone()), span);

        if installed.operator != self.versions.operator {
            let outcome = upgrade::run(&ctx, &installed.operator, &self.versions.operator).await?;
            if outcome == Outcome::Requeue {
                return Ok(Outcome::Requeue);
            }
            info!(
                from = %installed.operator,
                to = %self.versions.operator,
                "Upgrade complete"
            );
            self.versions.stamp(cr.annotations_mut());
            self.store.update(&cr).await?;
            return Ok(Outcome::Requeue);
        }

        let pipeline = (self.pipeline)(&ctx);
        if dispatch(&pipeline).await? == Outcome::Requeue {
            return Ok(Outcome::Requeue);
        }

        status::compute_and_persist(&self.store, &cr).await?;
        Ok(Outcome::Done)
    }
}

/// Timing and scope of the watch loop.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub namespace: Option<String>,
    /// Delay before a pass that asked for a requeue runs again
    pub requeue_interval: Duration,
    /// Delay after a transient error
    pub error_backoff: Duration,
    /// Delay after an error that needs user action
    pub blocked_backoff: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            requeue_interval: Duration::from_secs(5),
            error_backoff: Duration::from_secs(30),
            blocked_backoff: Duration::from_secs(300),
        }
    }
}

impl ControllerConfig {
    pub fn action(&self, outcome: Outcome) -> Action {
        match outcome {
            Outcome::Done => Action::await_change(),
            Outcome::Requeue => Action::requeue(self.requeue_interval),
        }
    }

    pub fn error_policy(&self, apimanager: &APIManager, error: &OperatorError) -> Action {
        let name = apimanager.name_any();
        let namespace = apimanager.namespace().unwrap_or_default();
        if error.is_blocking() {
            warn!(%name, %namespace, %error, "Reconciliation blocked until the APIManager changes");
            Action::requeue(self.blocked_backoff)
        } else {
            error!(%name, %namespace, %error, "Reconciliation error");
            Action::requeue(self.error_backoff)
        }
    }
}

/// Watch loop for APIManager resources and the deployments they own.
pub struct ApiManagerController {
    client: Client,
    reconciler: ApiManagerReconciler,
    config: ControllerConfig,
}

impl ApiManagerController {
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        let store = Store::new(Arc::new(KubeStore::new(client.clone())));
        Self {
            client,
            reconciler: ApiManagerReconciler::new(store),
            config,
        }
    }

    /// Run the controller until shutdown is signalled
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let (apimanagers, deployments): (Api<APIManager>, Api<Deployment>) =
            match self.config.namespace.as_deref() {
                Some(namespace) => (
                    Api::namespaced(self.client.clone(), namespace),
                    Api::namespaced(self.client.clone(), namespace),
                ),
                None => (Api::all(self.client.clone()), Api::all(self.client.clone())),
            };

        info!(
            namespace = self.config.namespace.as_deref().unwrap_or("all"),
            "Starting APIManager controller"
        );

        Controller::new(apimanagers, Config::default())
            .owns(deployments, Config::default())
            .shutdown_on_signal()
            .run(
                |apimanager, ctx| async move { ctx.reconcile(apimanager).await },
                |apimanager, error, ctx| ctx.config.error_policy(&apimanager, error),
                Arc::clone(&self),
            )
            .for_each(|result| async move {
                match result {
                    Ok((obj, _action)) => {
                        debug!(name = %obj.name, "Reconciled APIManager");
                    }
                    Err(e) => {
                        debug!(error = ?e, "Reconciliation failed");
                    }
                }
            })
            .await;

        Ok(())
    }

    async fn reconcile(&self, apimanager: Arc<APIManager>) -> Result<Action> {
        let name = apimanager.name_any();
        let namespace = apimanager.namespace().unwrap_or_default();
        let outcome = self.reconciler.reconcile_pass(&namespace, &name).await?;
        Ok(self.config.action(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::tests::{postgresql_apimanager, sample_apimanager, NAMESPACE};
    use crate::crd::APIManagerSpec;
    use crate::store::memory::MemoryStore;
    use crate::version::{OPERATOR_VERSION_ANNOTATION, THREESCALE_VERSION_ANNOTATION};
    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const NAME: &str = "example-apimanager";

    fn running() -> VersionInfo {
        VersionInfo::new("0.5.0", "2.7")
    }

    fn stamped(mut cr: APIManager, operator: &str, release: &str) -> APIManager {
        VersionInfo::new(operator, release).stamp(cr.annotations_mut());
        cr
    }

    fn reconciler(backend: &Arc<MemoryStore>) -> ApiManagerReconciler {
        ApiManagerReconciler::new(Store::new(backend.clone())).with_versions(running())
    }

    fn stored(backend: &MemoryStore) -> APIManager {
        backend.peek::<APIManager>(NAMESPACE, NAME).unwrap()
    }

    #[tokio::test]
    async fn test_missing_apimanager_is_done() {
        let backend = Arc::new(MemoryStore::new());
        let outcome = reconciler(&backend)
            .reconcile_pass(NAMESPACE, NAME)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Done);
        assert_eq!(backend.calls().writes(), 0);
    }

    #[tokio::test]
    async fn test_defaulting_requeues() {
        let backend = Arc::new(MemoryStore::new());
        let spec: APIManagerSpec =
            serde_json::from_str(r#"{"wildcardDomain":"test.3scale.net"}"#).unwrap();
        let mut cr = APIManager::new(NAME, spec);
        cr.metadata.namespace = Some(NAMESPACE.to_string());
        backend.insert(&cr);

        let outcome = reconciler(&backend)
            .reconcile_pass(NAMESPACE, NAME)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Requeue);
        assert_eq!(backend.calls().update, 1);
        assert!(stored(&backend).spec.apicast.is_some());
        assert!(backend.names::<Deployment>(NAMESPACE).is_empty());
    }

    #[tokio::test]
    async fn test_invalid_spec_is_blocking() {
        let backend = Arc::new(MemoryStore::new());
        let mut cr = sample_apimanager();
        cr.spec.wildcard_domain = String::new();
        backend.insert(&cr);

        let err = reconciler(&backend)
            .reconcile_pass(NAMESPACE, NAME)
            .await
            .unwrap_err();

        assert!(matches!(err, OperatorError::Validation(_)));
        assert!(err.is_blocking());
        assert_eq!(backend.calls().writes(), 0);
    }

    #[tokio::test]
    async fn test_version_bootstrap_runs_no_components() {
        let backend = Arc::new(MemoryStore::new());
        backend.insert(&sample_apimanager());

        let outcome = reconciler(&backend)
            .reconcile_pass(NAMESPACE, NAME)
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Requeue);
        let annotations = stored(&backend).metadata.annotations.unwrap();
        assert_eq!(annotations[OPERATOR_VERSION_ANNOTATION], "0.5.0");
        assert_eq!(annotations[THREESCALE_VERSION_ANNOTATION], "2.7");
        assert_eq!(backend.calls().create, 0);
        assert_eq!(backend.calls().update_status, 0);
    }

    #[tokio::test]
    async fn test_full_pass_settles() {
        let backend = Arc::new(MemoryStore::new());
        backend.insert(&stamped(sample_apimanager(), "0.5.0", "2.7"));
        let reconciler = reconciler(&backend);

        let outcome = reconciler.reconcile_pass(NAMESPACE, NAME).await.unwrap();
        assert_eq!(outcome, Outcome::Done);
        assert_eq!(backend.calls().update_status, 1);

        let status = stored(&backend).status.unwrap();
        assert!(status.deployments.ready.is_empty());
        assert!(status
            .deployments
            .starting
            .contains(&"system-app".to_string()));

        backend.reset_calls();
        let outcome = reconciler.reconcile_pass(NAMESPACE, NAME).await.unwrap();
        assert_eq!(outcome, Outcome::Done);
        assert_eq!(backend.calls().writes(), 0);
    }

    #[tokio::test]
    async fn test_only_declared_database_engine_is_provisioned() {
        let backend = Arc::new(MemoryStore::new());
        backend.insert(&stamped(postgresql_apimanager(), "0.5.0", "2.7"));

        reconciler(&backend)
            .reconcile_pass(NAMESPACE, NAME)
            .await
            .unwrap();

        let deployments = backend.names::<Deployment>(NAMESPACE);
        assert!(deployments.contains(&"system-postgresql".to_string()));
        assert!(!deployments.contains(&"system-mysql".to_string()));
        assert!(backend
            .peek::<ConfigMap>(NAMESPACE, "system-mysql-image")
            .is_none());
    }

    #[tokio::test]
    async fn test_upgrade_flow() {
        let backend = Arc::new(MemoryStore::new());
        backend.insert(&stamped(sample_apimanager(), "0.4.0", "2.6"));
        backend.insert(&ConfigMap {
            metadata: ObjectMeta {
                name: Some("backend-redis-config".to_string()),
                namespace: Some(NAMESPACE.to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                "storage_url".to_string(),
                "redis://legacy:6379/0".to_string(),
            )])),
            ..Default::default()
        });
        let reconciler = reconciler(&backend);

        // Migration runs, versions stay until it reports nothing left
        assert_eq!(
            reconciler.reconcile_pass(NAMESPACE, NAME).await.unwrap(),
            Outcome::Requeue
        );
        let annotations = stored(&backend).metadata.annotations.unwrap();
        assert_eq!(annotations[OPERATOR_VERSION_ANNOTATION], "0.4.0");
        assert!(backend
            .peek::<ConfigMap>(NAMESPACE, "backend-redis-config")
            .is_none());

        // Nothing left to migrate: versions advance
        assert_eq!(
            reconciler.reconcile_pass(NAMESPACE, NAME).await.unwrap(),
            Outcome::Requeue
        );
        let annotations = stored(&backend).metadata.annotations.unwrap();
        assert_eq!(annotations[OPERATOR_VERSION_ANNOTATION], "0.5.0");
        assert_eq!(annotations[THREESCALE_VERSION_ANNOTATION], "2.7");
        assert!(backend.names::<Deployment>(NAMESPACE).is_empty());

        // Regular pass
        assert_eq!(
            reconciler.reconcile_pass(NAMESPACE, NAME).await.unwrap(),
            Outcome::Done
        );
    }

    #[tokio::test]
    async fn test_unsupported_upgrade_keeps_annotations() {
        let backend = Arc::new(MemoryStore::new());
        backend.insert(&stamped(sample_apimanager(), "0.3.0", "2.5"));

        let err = reconciler(&backend)
            .reconcile_pass(NAMESPACE, NAME)
            .await
            .unwrap_err();

        assert!(matches!(err, OperatorError::UnsupportedUpgrade { .. }));
        assert!(err.is_blocking());
        assert_eq!(backend.calls().writes(), 0);
        let annotations = stored(&backend).metadata.annotations.unwrap();
        assert_eq!(annotations[OPERATOR_VERSION_ANNOTATION], "0.3.0");
    }

    struct Counting {
        requeue: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ComponentReconciler for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn reconcile(&self) -> Result<Outcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(if self.requeue {
                Outcome::Requeue
            } else {
                Outcome::Done
            })
        }
    }

    #[tokio::test]
    async fn test_component_requeue_skips_rest_and_status() {
        let backend = Arc::new(MemoryStore::new());
        backend.insert(&stamped(sample_apimanager(), "0.5.0", "2.7"));
        let counters: Vec<Arc<AtomicUsize>> = (0..5).map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let factory_counters = counters.clone();

        let reconciler = reconciler(&backend).with_pipeline(move |_ctx: &LogicContext| {
            factory_counters
                .iter()
                .enumerate()
                .map(|(i, calls)| {
                    Box::new(Counting {
                        requeue: i == 2,
                        calls: calls.clone(),
                    }) as Box<dyn ComponentReconciler>
                })
                .collect()
        });

        let outcome = reconciler.reconcile_pass(NAMESPACE, NAME).await.unwrap();

        assert_eq!(outcome, Outcome::Requeue);
        let calls: Vec<usize> = counters.iter().map(|c| c.load(Ordering::SeqCst)).collect();
        assert_eq!(calls, vec![1, 1, 1, 0, 0]);
        assert_eq!(backend.calls().update_status, 0);
    }

    #[test]
    fn test_outcome_to_action() {
        let config = ControllerConfig::default();
        assert_eq!(config.action(Outcome::Done), Action::await_change());
        assert_eq!(
            config.action(Outcome::Requeue),
            Action::requeue(Duration::from_secs(5))
        );
    }

    #[test]
    fn test_error_policy_backoff() {
        let config = ControllerConfig::default();
        let cr = sample_apimanager();

        let transient = OperatorError::KubeApi("timeout".to_string());
        assert_eq!(
            config.error_policy(&cr, &transient),
            Action::requeue(Duration::from_secs(30))
        );

        let blocked = OperatorError::DatabaseEngineChange {
            declared: "postgresql".to_string(),
            existing: "mysql".to_string(),
        };
        assert_eq!(
            config.error_policy(&cr, &blocked),
            Action::requeue(Duration::from_secs(300))
        );
    }
}
