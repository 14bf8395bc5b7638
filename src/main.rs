//! # Secret Sync Controller
//!
//! A Kubernetes controller that keeps native Secrets synchronized with
//! secret material held in external backends.
//!
//! ## Overview
//!
//! 1. **Watching declarations** - `ManagedSecret` resources across all
//!    namespaces declare what to fetch and what output Secret to maintain
//! 2. **Provider registry** - backends (in-memory fake, cluster Secrets,
//!    HTTP webhooks) are registered explicitly at startup behind one
//!    capability contract
//! 3. **Composition** - fetched values are merged and templated into a
//!    single structured output
//! 4. **Change detection** - a content fingerprint on the output Secret
//!    makes reconciliation idempotent across restarts
//! 5. **Scheduled refresh** - every declaration is re-synced at its
//!    declared interval and re-checked on every watch event
//!
//! ## Features
//!
//! - **Level-triggered**: passes are serialized per declaration, coalescing
//!   redundant triggers
//! - **Bounded retries**: transient backend failures back off exponentially
//!   and never retry forever
//! - **Deletion policies**: declarations retain or delete their output on
//!   removal, driven by a finalizer
//! - **Prometheus metrics** and **health probes** over HTTP

use anyhow::{Context, Result};
use futures::StreamExt;
use kube::{api::Api, Client};
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use tracing::{error, info};

use secret_sync_controller::constants;
use secret_sync_controller::controller::reconciler::{self, Reconciler};
use secret_sync_controller::crd::ManagedSecret;
use secret_sync_controller::observability;
use secret_sync_controller::provider::{self, registry::ProviderRegistry};
use secret_sync_controller::server::{start_server, ServerState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "secret_sync_controller=info".into()),
        )
        .init();

    info!("Starting Secret Sync Controller");

    // Initialize metrics
    observability::metrics::register_metrics()?;

    // Create server state
    let server_state = Arc::new(ServerState {
        is_ready: Arc::new(std::sync::atomic::AtomicBool::new(false)),
    });

    // Start HTTP server for metrics and probes
    let server_state_clone = Arc::clone(&server_state);
    let server_port = std::env::var("METRICS_PORT")
        .unwrap_or_else(|_| constants::DEFAULT_METRICS_PORT.to_string())
        .parse::<u16>()
        .unwrap_or(constants::DEFAULT_METRICS_PORT);

    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {e}");
        }
    });

    // Create Kubernetes client
    let client = Client::try_default().await?;

    // Build the provider registry explicitly. Registration happens here,
    // once, before any reconciliation begins; a duplicate id is a fatal
    // configuration error.
    let mut registry = ProviderRegistry::new();
    provider::fake::register(&mut registry).context("Failed to register fake provider")?;
    provider::kubernetes::register(&mut registry, client.clone())
        .context("Failed to register kubernetes provider")?;
    provider::webhook::register(&mut registry).context("Failed to register webhook provider")?;
    let registry = Arc::new(registry);
    info!("Registered secret providers: {:?}", registry.ids());

    // Watch ManagedSecret declarations across all namespaces
    let declarations: Api<ManagedSecret> = Api::all(client.clone());

    // Create reconciler context
    let ctx = Arc::new(Reconciler::new(client, registry));

    // Mark as ready
    server_state
        .is_ready
        .store(true, std::sync::atomic::Ordering::Relaxed);

    // Create controller
    Controller::new(declarations, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconciler::reconcile, reconciler::error_policy, ctx)
        .for_each(|_| std::future::ready(()))
        .await;

    info!("Controller stopped");

    Ok(())
}
