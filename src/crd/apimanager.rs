//! APIManager Custom Resource Definition
//!
//! Declares the desired topology of a whole API management platform:
//! gateway, backend, system application, synchronization service and their
//! data tiers.

use crate::error::{OperatorError, Result};
use crate::version::THREESCALE_RELEASE;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// APIManager is the Schema for the apimanagers API
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apps.3scale.net",
    version = "v1alpha1",
    kind = "APIManager",
    namespaced,
    status = "APIManagerStatus",
    shortname = "apim",
    printcolumn = r#"{"name":"Domain","type":"string","jsonPath":".spec.wildcardDomain"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct APIManagerSpec {
    /// Root domain all platform routes hang off
    pub wildcard_domain: String,

    /// Value of the `app` label put on every managed object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_label: Option<String>,

    /// Name of the default tenant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_name: Option<String>,

    /// Set CPU/memory requests and limits on managed containers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_requirements_enabled: Option<bool>,

    /// Use externally provided databases instead of in-cluster ones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_availability: Option<HighAvailabilitySpec>,

    /// APIcast gateway configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apicast: Option<ApicastSpec>,

    /// Backend configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendSpec>,

    /// System application configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemSpec>,

    /// Zync configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zync: Option<ZyncSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct HighAvailabilitySpec {
    #[serde(default)]
    pub enabled: bool,
}

/// Replica count of a single deployment
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct ReplicaSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
}

impl ReplicaSpec {
    fn apply_defaults(spec: &mut Option<ReplicaSpec>) -> bool {
        let mut changed = spec.is_none();
        let spec = spec.get_or_insert_with(Default::default);
        changed |= set_default(&mut spec.replicas, || DEFAULT_REPLICAS);
        changed
    }
}

/// Replica count declared by `spec`, or the default.
pub fn replicas(spec: &Option<ReplicaSpec>) -> i32 {
    spec.as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(DEFAULT_REPLICAS)
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApicastSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_spec: Option<ReplicaSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_spec: Option<ReplicaSpec>,
}

impl ApicastSpec {
    fn apply_defaults(&mut self) -> bool {
        let mut changed = set_default(&mut self.image, default_apicast_image);
        changed |= ReplicaSpec::apply_defaults(&mut self.staging_spec);
        changed |= ReplicaSpec::apply_defaults(&mut self.production_spec);
        changed
    }

    pub fn image(&self) -> String {
        self.image.clone().unwrap_or_else(default_apicast_image)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackendSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listener_spec: Option<ReplicaSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_spec: Option<ReplicaSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_spec: Option<ReplicaSpec>,
}

impl BackendSpec {
    fn apply_defaults(&mut self) -> bool {
        let mut changed = set_default(&mut self.image, default_backend_image);
        changed |= set_default(&mut self.redis_image, default_redis_image);
        changed |= ReplicaSpec::apply_defaults(&mut self.listener_spec);
        changed |= ReplicaSpec::apply_defaults(&mut self.worker_spec);
        changed |= ReplicaSpec::apply_defaults(&mut self.cron_spec);
        changed
    }

    pub fn image(&self) -> String {
        self.image.clone().unwrap_or_else(default_backend_image)
    }

    pub fn redis_image(&self) -> String {
        self.redis_image.clone().unwrap_or_else(default_redis_image)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SystemSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memcached_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_spec: Option<ReplicaSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidekiq_spec: Option<ReplicaSpec>,
    /// Database engine selection; exactly one engine may be declared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<SystemDatabaseSpec>,
}

impl SystemSpec {
    fn apply_defaults(&mut self) -> bool {
        let mut changed = set_default(&mut self.image, default_system_image);
        changed |= set_default(&mut self.memcached_image, default_memcached_image);
        changed |= set_default(&mut self.redis_image, default_redis_image);
        changed |= ReplicaSpec::apply_defaults(&mut self.app_spec);
        changed |= ReplicaSpec::apply_defaults(&mut self.sidekiq_spec);
        changed |= set_default(&mut self.database, || SystemDatabaseSpec {
            mysql: Some(SystemMySQLSpec::default()),
            postgresql: None,
        });
        if let Some(database) = self.database.as_mut() {
            changed |= database.apply_defaults();
        }
        changed
    }

    pub fn image(&self) -> String {
        self.image.clone().unwrap_or_else(default_system_image)
    }

    pub fn memcached_image(&self) -> String {
        self.memcached_image
            .clone()
            .unwrap_or_else(default_memcached_image)
    }

    pub fn redis_image(&self) -> String {
        self.redis_image.clone().unwrap_or_else(default_redis_image)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct SystemDatabaseSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mysql: Option<SystemMySQLSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgresql: Option<SystemPostgreSQLSpec>,
}

impl SystemDatabaseSpec {
    fn apply_defaults(&mut self) -> bool {
        match (self.mysql.as_mut(), self.postgresql.as_mut()) {
            (_, Some(postgresql)) => set_default(&mut postgresql.image, default_postgresql_image),
            (Some(mysql), None) => set_default(&mut mysql.image, default_mysql_image),
            (None, None) => {
                self.mysql = Some(SystemMySQLSpec {
                    image: Some(default_mysql_image()),
                });
                true
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct SystemMySQLSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct SystemPostgreSQLSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ZyncSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_spec: Option<ReplicaSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub que_spec: Option<ReplicaSpec>,
}

impl ZyncSpec {
    fn apply_defaults(&mut self) -> bool {
        let mut changed = set_default(&mut self.image, default_zync_image);
        changed |= set_default(&mut self.database_image, default_postgresql_image);
        changed |= ReplicaSpec::apply_defaults(&mut self.app_spec);
        changed |= ReplicaSpec::apply_defaults(&mut self.que_spec);
        changed
    }

    pub fn image(&self) -> String {
        self.image.clone().unwrap_or_else(default_zync_image)
    }

    pub fn database_image(&self) -> String {
        self.database_image
            .clone()
            .unwrap_or_else(default_postgresql_image)
    }
}

/// Database engine backing the system application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseEngine {
    MySQL,
    PostgreSQL,
}

impl fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseEngine::MySQL => write!(f, "mysql"),
            DatabaseEngine::PostgreSQL => write!(f, "postgresql"),
        }
    }
}

impl APIManagerSpec {
    /// Fill every absent optional field with its default.
    ///
    /// Returns whether the spec changed. Validation runs before anything is
    /// touched, so an error leaves the spec as it was.
    pub fn apply_defaults(&mut self) -> Result<bool> {
        self.validate()?;

        let mut changed = set_default(&mut self.app_label, default_app_label);
        changed |= set_default(&mut self.tenant_name, default_tenant_name);
        changed |= set_default(&mut self.resource_requirements_enabled, || true);
        changed |= set_default(&mut self.high_availability, Default::default);

        changed |= self.apicast.is_none();
        changed |= self
            .apicast
            .get_or_insert_with(Default::default)
            .apply_defaults();
        changed |= self.backend.is_none();
        changed |= self
            .backend
            .get_or_insert_with(Default::default)
            .apply_defaults();
        changed |= self.system.is_none();
        changed |= self
            .system
            .get_or_insert_with(Default::default)
            .apply_defaults();
        changed |= self.zync.is_none();
        changed |= self
            .zync
            .get_or_insert_with(Default::default)
            .apply_defaults();

        Ok(changed)
    }

    fn validate(&self) -> Result<()> {
        if self.wildcard_domain.trim().is_empty() {
            return Err(OperatorError::Validation(
                "spec.wildcardDomain must not be empty".to_string(),
            ));
        }
        let database = self.system.as_ref().and_then(|s| s.database.as_ref());
        if let Some(SystemDatabaseSpec {
            mysql: Some(_),
            postgresql: Some(_),
        }) = database
        {
            return Err(OperatorError::Validation(
                "spec.system.database may declare mysql or postgresql, not both".to_string(),
            ));
        }
        Ok(())
    }

    /// Engine selected by the declared database spec; MySQL unless a
    /// PostgreSQL sub-spec is present.
    pub fn database_engine(&self) -> DatabaseEngine {
        let postgresql = self
            .system
            .as_ref()
            .and_then(|s| s.database.as_ref())
            .and_then(|d| d.postgresql.as_ref());
        match postgresql {
            Some(_) => DatabaseEngine::PostgreSQL,
            None => DatabaseEngine::MySQL,
        }
    }

    pub fn database_image(&self) -> String {
        let database = self.system.as_ref().and_then(|s| s.database.as_ref());
        match self.database_engine() {
            DatabaseEngine::PostgreSQL => database
                .and_then(|d| d.postgresql.as_ref())
                .and_then(|p| p.image.clone())
                .unwrap_or_else(default_postgresql_image),
            DatabaseEngine::MySQL => database
                .and_then(|d| d.mysql.as_ref())
                .and_then(|m| m.image.clone())
                .unwrap_or_else(default_mysql_image),
        }
    }

    pub fn high_availability_enabled(&self) -> bool {
        self.high_availability.as_ref().is_some_and(|ha| ha.enabled)
    }

    pub fn resource_requirements_enabled(&self) -> bool {
        self.resource_requirements_enabled.unwrap_or(true)
    }

    pub fn app_label(&self) -> String {
        self.app_label.clone().unwrap_or_else(default_app_label)
    }

    pub fn tenant_name(&self) -> String {
        self.tenant_name.clone().unwrap_or_else(default_tenant_name)
    }

    pub fn apicast(&self) -> ApicastSpec {
        self.apicast.clone().unwrap_or_default()
    }

    pub fn backend(&self) -> BackendSpec {
        self.backend.clone().unwrap_or_default()
    }

    pub fn system(&self) -> SystemSpec {
        self.system.clone().unwrap_or_default()
    }

    pub fn zync(&self) -> ZyncSpec {
        self.zync.clone().unwrap_or_default()
    }
}

impl APIManager {
    /// Apply defaults to the spec. See [`APIManagerSpec::apply_defaults`].
    pub fn apply_defaults(&mut self) -> Result<bool> {
        self.spec.apply_defaults()
    }
}

/// Status of the APIManager
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct APIManagerStatus {
    /// Rollup of the deployments owned by this APIManager
    #[serde(default)]
    pub deployments: DeploymentStatus,
    /// Conditions representing platform state
    #[serde(default)]
    pub conditions: Vec<APIManagerCondition>,
}

/// Owned deployments grouped by readiness
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub struct DeploymentStatus {
    #[serde(default)]
    pub ready: Vec<String>,
    #[serde(default)]
    pub starting: Vec<String>,
    #[serde(default)]
    pub stopped: Vec<String>,
}

/// Condition of the APIManager
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct APIManagerCondition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last time the condition transitioned
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Human-readable message
    #[serde(default)]
    pub message: Option<String>,
}

const DEFAULT_REPLICAS: i32 = 1;

fn set_default<T>(field: &mut Option<T>, value: impl FnOnce() -> T) -> bool {
    if field.is_some() {
        return false;
    }
    *field = Some(value());
    true
}

// Default value functions
fn default_app_label() -> String {
    "3scale-api-management".to_string()
}

fn default_tenant_name() -> String {
    "3scale".to_string()
}

fn default_apicast_image() -> String {
    format!("quay.io/3scale/apicast:3scale-{}.0", THREESCALE_RELEASE)
}

fn default_backend_image() -> String {
    format!("quay.io/3scale/apisonator:3scale-{}.0", THREESCALE_RELEASE)
}

fn default_system_image() -> String {
    format!("quay.io/3scale/porta:3scale-{}.0", THREESCALE_RELEASE)
}

fn default_zync_image() -> String {
    format!("quay.io/3scale/zync:3scale-{}.0", THREESCALE_RELEASE)
}

fn default_redis_image() -> String {
    "centos/redis-32-centos7".to_string()
}

fn default_memcached_image() -> String {
    "memcached:1.5".to_string()
}

fn default_mysql_image() -> String {
    "centos/mysql-57-centos7".to_string()
}

fn default_postgresql_image() -> String {
    "centos/postgresql-10-centos7".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_spec() -> APIManagerSpec {
        serde_json::from_str(r#"{"wildcardDomain":"example.com"}"#).unwrap()
    }

    #[test]
    fn test_apply_defaults_fills_everything_once() {
        let mut spec = minimal_spec();
        assert!(spec.apply_defaults().unwrap());
        assert_eq!(spec.app_label.as_deref(), Some("3scale-api-management"));
        assert_eq!(spec.tenant_name.as_deref(), Some("3scale"));
        assert_eq!(replicas(&spec.apicast().staging_spec), 1);
        assert_eq!(
            spec.system().database.unwrap().mysql.unwrap().image.as_deref(),
            Some("centos/mysql-57-centos7")
        );

        // Second run is a no-op
        assert!(!spec.apply_defaults().unwrap());
    }

    #[test]
    fn test_apply_defaults_keeps_user_values() {
        let mut spec: APIManagerSpec = serde_json::from_str(
            r#"{
                "wildcardDomain": "example.com",
                "apicast": {"productionSpec": {"replicas": 3}},
                "system": {"database": {"postgresql": {}}}
            }"#,
        )
        .unwrap();
        assert!(spec.apply_defaults().unwrap());
        assert_eq!(replicas(&spec.apicast().production_spec), 3);
        let database = spec.system().database.unwrap();
        assert!(database.mysql.is_none());
        assert_eq!(
            database.postgresql.unwrap().image.as_deref(),
            Some("centos/postgresql-10-centos7")
        );
    }

    #[test]
    fn test_validation_rejects_empty_domain() {
        let mut spec = minimal_spec();
        spec.wildcard_domain = "  ".to_string();
        let before = spec.clone();
        assert!(matches!(
            spec.apply_defaults(),
            Err(OperatorError::Validation(_))
        ));
        assert_eq!(spec.app_label, before.app_label);
        assert!(spec.apicast.is_none());
    }

    #[test]
    fn test_validation_rejects_two_engines() {
        let mut spec: APIManagerSpec = serde_json::from_str(
            r#"{"wildcardDomain":"example.com","system":{"database":{"mysql":{},"postgresql":{}}}}"#,
        )
        .unwrap();
        assert!(spec.apply_defaults().is_err());
    }

    #[test]
    fn test_database_engine_selection() {
        let mut spec = minimal_spec();
        assert_eq!(spec.database_engine(), DatabaseEngine::MySQL);

        spec.system = Some(SystemSpec {
            database: Some(SystemDatabaseSpec {
                mysql: None,
                postgresql: Some(SystemPostgreSQLSpec::default()),
            }),
            ..Default::default()
        });
        assert_eq!(spec.database_engine(), DatabaseEngine::PostgreSQL);
        assert_eq!(spec.database_image(), "centos/postgresql-10-centos7");
    }

    #[test]
    fn test_unset_fields_are_not_serialized() {
        let value = serde_json::to_value(minimal_spec()).unwrap();
        assert_eq!(value, serde_json::json!({"wildcardDomain": "example.com"}));
    }
}
