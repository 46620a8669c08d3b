//! Sequential dispatcher
//!
//! Runs component reconcilers strictly in order. The first error or requeue
//! ends the pass; later components only run once everything before them has
//! settled.

use crate::components::ComponentReconciler;
use crate::error::Result;
use tracing::{debug, info_span, warn, Instrument};

/// Result of one step of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outcome {
    /// Nothing left to do in this pass
    #[default]
    Done,
    /// Stop here and run the pass again shortly
    Requeue,
}

pub async fn dispatch(components: &[Box<dyn ComponentReconciler>]) -> Result<Outcome> {
    for component in components {
        let name = component.name();
        let span = info_span!("component", component = name);
        match component.reconcile().instrument(span).await {
            Ok(Outcome::Done) => debug!(component = name, "Component reconciled"),
            Ok(Outcome::Requeue) => {
                debug!(component = name, "Component requested requeue");
                return Ok(Outcome::Requeue);
            }
            Err(e) => {
                warn!(component = name, error = %e, "Component reconciliation failed");
                return Err(e);
            }
        }
    }
    Ok(Outcome::Done)
}
