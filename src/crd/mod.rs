//! Custom Resource Definitions for the APIManager operator
//!
//! - APIManager: the whole API management platform, declared in one object

mod apimanager;

pub use apimanager::{
    replicas, APIManager, APIManagerCondition, APIManagerSpec, APIManagerStatus, ApicastSpec,
    BackendSpec, DatabaseEngine, DeploymentStatus, HighAvailabilitySpec, ReplicaSpec,
    SystemDatabaseSpec, SystemMySQLSpec, SystemPostgreSQLSpec, SystemSpec, ZyncSpec,
};
