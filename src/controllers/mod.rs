//! Controllers for the APIManager operator
//!
//! The control loop watches APIManager resources, dispatches the platform
//! components in order and rolls the owned deployments up into the status.

mod apimanager;
mod dispatch;
mod status;

pub use apimanager::{ApiManagerController, ApiManagerReconciler, ControllerConfig, PipelineFactory};
pub use dispatch::{dispatch, Outcome};
pub use status::{build_status, compute_and_persist, derive_deployment_status};
