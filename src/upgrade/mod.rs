//! Upgrade orchestrator
//!
//! Runs the migration registered for an exact (installed, running) operator
//! version pair. Pairs without a registered procedure are refused.

mod v26_to_27;

pub use v26_to_27::Upgrade26To27;

use crate::components::LogicContext;
use crate::controllers::Outcome;
use crate::error::{OperatorError, Result};
use async_trait::async_trait;
use tracing::{info, info_span, warn, Instrument};

/// One version-pair-specific migration. Must be idempotent: it may run
/// again after a partial failure.
#[async_trait]
pub trait UpgradeProcedure: Send + Sync {
    fn name(&self) -> &'static str;

    async fn upgrade(&self) -> Result<Outcome>;
}

/// Select the procedure for `from` -> `to`.
pub fn procedure_for(
    ctx: &LogicContext,
    from: &str,
    to: &str,
) -> Result<Box<dyn UpgradeProcedure>> {
    match (from, to) {
        (v26_to_27::FROM, v26_to_27::TO) => Ok(Box::new(Upgrade26To27::new(ctx.clone()))),
        _ => Err(OperatorError::UnsupportedUpgrade {
            from: from.to_string(),
            to: to.to_string(),
        }),
    }
}

/// Failures inside a procedure surface as [`OperatorError::Upgrade`] naming
/// the procedure. The versions are not advanced, so the pass retries it.
pub async fn run(ctx: &LogicContext, from: &str, to: &str) -> Result<Outcome> {
    let procedure = procedure_for(ctx, from, to)?;
    let span = info_span!(parent: ctx.span(), "upgrade", procedure = procedure.name(), from, to);
    async {
        info!("Running upgrade procedure");
        let outcome = procedure.upgrade().await.map_err(|err| {
            warn!(error = %err, "Upgrade procedure failed");
            OperatorError::Upgrade(format!("{}: {}", procedure.name(), err))
        })?;
        info!(outcome = ?outcome, "Upgrade procedure finished");
        Ok(outcome)
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::tests::{context, sample_apimanager};
    use crate::store::memory::{CallCounts, MemoryStore};
    use crate::store::{MockResourceStore, Store};
    use std::sync::Arc;
    use tracing::Span;

    #[test]
    fn test_registered_pair() {
        let ctx = context(Arc::new(MemoryStore::new()), sample_apimanager());
        let procedure = procedure_for(&ctx, "0.4.0", "0.5.0").unwrap();
        assert_eq!(procedure.name(), "upgrade-2.6-to-2.7");
    }

    #[tokio::test]
    async fn test_unknown_pair_fails_closed() {
        let backend = Arc::new(MemoryStore::new());
        let ctx = context(backend.clone(), sample_apimanager());

        let err = run(&ctx, "0.3.0", "0.5.0").await.unwrap_err();
        match err {
            OperatorError::UnsupportedUpgrade { from, to } => {
                assert_eq!(from, "0.3.0");
                assert_eq!(to, "0.5.0");
            }
            unexpected => panic!("unexpected error: {unexpected}"),
        }
        assert_eq!(backend.calls(), CallCounts::default());
    }

    #[test]
    fn test_downgrade_is_unsupported() {
        let ctx = context(Arc::new(MemoryStore::new()), sample_apimanager());
        assert!(procedure_for(&ctx, "0.5.0", "0.4.0").is_err());
    }

    #[tokio::test]
    async fn test_procedure_failure_is_reported_as_upgrade_error() {
        let mut backend = MockResourceStore::new();
        backend
            .expect_get()
            .returning(|_, _, _| Err(OperatorError::KubeApi("etcd timeout".to_string())));
        backend.expect_create().never();
        backend.expect_update().never();
        backend.expect_delete().never();
        let ctx = LogicContext::new(
            Store::new(Arc::new(backend)),
            Arc::new(sample_apimanager()),
            Span::none(),
        );

        let err = run(&ctx, "0.4.0", "0.5.0").await.unwrap_err();
        assert!(matches!(err, OperatorError::Upgrade(_)));
        assert!(!err.is_blocking());
        assert_eq!(
            err.to_string(),
            "Upgrade error: upgrade-2.6-to-2.7: Kubernetes API error: etcd timeout"
        );
    }
}
