//! APIManager Kubernetes Operator
//!
//! ## Usage
//!
//! ```bash
//! # Run the operator (requires kubeconfig)
//! apimanager-operator
//!
//! # Watch a single namespace with verbose logs
//! RUST_LOG=debug apimanager-operator --namespace 3scale
//!
//! # Print the CRD
//! apimanager-operator --print-crd
//! ```

use apimanager_operator::{APIManager, ApiManagerController, ControllerConfig};
use clap::Parser;
use kube::{Client, CustomResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// APIManager Kubernetes Operator
#[derive(Parser, Debug)]
#[command(name = "apimanager-operator")]
#[command(version, about = "Kubernetes Operator for API management platforms")]
struct Args {
    /// Namespace to watch (empty for all namespaces)
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "")]
    namespace: String,

    /// Seconds before a pass that asked for a requeue runs again
    #[arg(long, env = "REQUEUE_INTERVAL_SECS", default_value = "5")]
    requeue_interval_secs: u64,

    /// Seconds to wait after a transient reconciliation error
    #[arg(long, env = "ERROR_BACKOFF_SECS", default_value = "30")]
    error_backoff_secs: u64,

    /// Seconds to wait after an error that needs user action
    #[arg(long, env = "BLOCKED_BACKOFF_SECS", default_value = "300")]
    blocked_backoff_secs: u64,

    /// Print the APIManager CRD as JSON and exit
    #[arg(long, default_value = "false")]
    print_crd: bool,
}

impl Args {
    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            namespace: (!self.namespace.is_empty()).then(|| self.namespace.clone()),
            requeue_interval: Duration::from_secs(self.requeue_interval_secs),
            error_backoff: Duration::from_secs(self.error_backoff_secs),
            blocked_backoff: Duration::from_secs(self.blocked_backoff_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_crd {
        println!("{}", serde_json::to_string_pretty(&APIManager::crd())?);
        return Ok(());
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting APIManager operator");
    info!(
        "Watching namespace: {}",
        if args.namespace.is_empty() {
            "all"
        } else {
            &args.namespace
        }
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let controller = Arc::new(ApiManagerController::new(client, args.controller_config()));
    let handle = tokio::spawn(async move {
        if let Err(e) = controller.run().await {
            error!("APIManager controller error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = handle => {
            if let Err(e) = result {
                error!("APIManager controller task failed: {}", e);
            }
        }
    }

    info!("APIManager operator shutting down");
    Ok(())
}
