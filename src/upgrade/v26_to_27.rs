//! 2.6 -> 2.7
//!
//! Backend Redis URLs moved from the `backend-redis-config` ConfigMap into
//! the `backend-redis` Secret.

use super::UpgradeProcedure;
use crate::components::common::{configmap, secret};
use crate::components::{LogicContext, BACKEND_REDIS_SECRET, REDIS_QUEUES_URL, REDIS_STORAGE_URL};
use crate::controllers::Outcome;
use crate::error::Result;
use crate::reconcilers::{create_only_mutator, secret_missing_keys_mutator, tag_object_to_delete};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use std::collections::BTreeMap;
use tracing::info;

pub(super) const FROM: &str = "0.4.0";
pub(super) const TO: &str = "0.5.0";

const LEGACY_CONFIGMAP: &str = "backend-redis-config";

/// Legacy ConfigMap key and the Secret key it becomes.
const MIGRATED_KEYS: [(&str, &str); 2] = [
    ("storage_url", REDIS_STORAGE_URL),
    ("queues_url", REDIS_QUEUES_URL),
];

pub struct Upgrade26To27 {
    ctx: LogicContext,
}

impl Upgrade26To27 {
    pub fn new(ctx: LogicContext) -> Self {
        Self { ctx }
    }

    /// Legacy values whose Secret key is not set yet.
    fn pending(legacy: &ConfigMap, current: Option<&Secret>) -> BTreeMap<String, String> {
        let present = |key: &str| {
            current.is_some_and(|s| {
                s.data.as_ref().is_some_and(|d| d.contains_key(key))
                    || s.string_data.as_ref().is_some_and(|d| d.contains_key(key))
            })
        };
        MIGRATED_KEYS
            .iter()
            .filter(|(_, to)| !present(to))
            .filter_map(|(from, to)| {
                legacy
                    .data
                    .as_ref()
                    .and_then(|d| d.get(*from))
                    .map(|value| (to.to_string(), value.clone()))
            })
            .collect()
    }
}

#[async_trait]
impl UpgradeProcedure for Upgrade26To27 {
    fn name(&self) -> &'static str {
        "upgrade-2.6-to-2.7"
    }

    async fn upgrade(&self) -> Result<Outcome> {
        let namespace = self.ctx.namespace();
        let store = self.ctx.store();

        let Some(legacy) = store.get::<ConfigMap>(&namespace, LEGACY_CONFIGMAP).await? else {
            return Ok(Outcome::Done);
        };

        let current = store.get::<Secret>(&namespace, BACKEND_REDIS_SECRET).await?;
        let pending = Self::pending(&legacy, current.as_ref());
        if !pending.is_empty() {
            info!(keys = ?pending.keys().collect::<Vec<_>>(), "Migrating backend redis settings");
            let desired = secret(&self.ctx, BACKEND_REDIS_SECRET, "backend", pending);
            self.ctx
                .reconcile(desired, secret_missing_keys_mutator)
                .await?;
        }

        let mut obsolete = configmap(&self.ctx, LEGACY_CONFIGMAP, "backend", BTreeMap::new());
        tag_object_to_delete(&mut obsolete);
        self.ctx.reconcile(obsolete, create_only_mutator).await?;

        Ok(Outcome::Requeue)
    }
}
