//! APIManager Kubernetes Operator
//!
//! A Kubernetes operator that deploys and keeps an API management platform
//! converged from a single `APIManager` custom resource.
//!
//! ## Custom Resources
//!
//! - `APIManager`: declares gateway, backend, system, zync and their data tiers
//!
//! ## Example
//!
//! ```yaml
//! apiVersion: apps.3scale.net/v1alpha1
//! kind: APIManager
//! metadata:
//!   name: example-apimanager
//! spec:
//!   wildcardDomain: example.com
//!   system:
//!     database:
//!       postgresql: {}
//! ```

pub mod components;
pub mod conditions;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod reconcilers;
pub mod store;
pub mod upgrade;
pub mod version;

pub use controllers::{ApiManagerController, ApiManagerReconciler, ControllerConfig, Outcome};
pub use crd::{APIManager, APIManagerSpec, APIManagerStatus};
pub use error::{OperatorError, Result};
