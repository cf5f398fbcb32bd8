//! azure-admission-controller - admission webhooks for Cluster API Azure resources.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Reads configuration from the environment
//! - Creates the Kubernetes client used for release lookups
//! - Warms the capability cache from the mounted SKU listing
//! - Starts the health server and, when TLS material is mounted, the webhook server

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use kube::Client;
use tokio::signal;
use tracing::{error, info, warn};

use azure_admission_controller::health::run_health_server;
use azure_admission_controller::{
    AdmissionConfig, AdmissionDispatcher, CapabilityCache, HealthState, KubeReleaseResolver,
    SkuFileProvider, WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WebhookState, run_webhook_server,
};

/// Grace period for in-flight admission requests to complete during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("azure_admission_controller=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .json()
        .init();

    info!("Starting azure-admission-controller");

    let config = AdmissionConfig::from_env();
    info!(
        capability_table = %config.capability_table_path.display(),
        timeout_secs = config.admission_timeout.as_secs(),
        webhook_port = config.webhook_port,
        health_port = config.health_port,
        "Loaded configuration"
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let provider = Arc::new(SkuFileProvider::new(&config.capability_table_path));
    let capabilities = Arc::new(CapabilityCache::new(provider));
    // Lookups populate the cache lazily if the listing is not there yet
    match capabilities.refresh().await {
        Ok(count) => info!(instance_types = count, "Capability cache warmed"),
        Err(e) => warn!(error = %e, "Capability cache warm-up failed, populating lazily"),
    }

    let health_state = Arc::new(HealthState::new().with_capabilities(Arc::clone(&capabilities)));

    // Start health server immediately so liveness checks pass during startup
    let health_handle = {
        let health_state = health_state.clone();
        let port = config.health_port;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, port).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let dispatcher = AdmissionDispatcher::new(
        capabilities,
        Arc::new(KubeReleaseResolver::new(client)),
    );
    let webhook_state = Arc::new(WebhookState::new(
        dispatcher,
        config.admission_timeout,
        health_state.clone(),
    ));

    // The webhook is the only thing this process serves; without certificates
    // it stays unready
    let webhook_handle =
        if Path::new(WEBHOOK_CERT_PATH).exists() && Path::new(WEBHOOK_KEY_PATH).exists() {
            info!("TLS certificates found, starting webhook server");
            let port = config.webhook_port;
            let handle = tokio::spawn(async move {
                if let Err(e) =
                    run_webhook_server(webhook_state, port, WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH)
                        .await
                {
                    error!("Webhook server error: {}", e);
                }
            });
            health_state.set_ready(true).await;
            Some(handle)
        } else {
            warn!("Webhook certificates not found, webhook server disabled");
            None
        };

    // Wait for any task to complete (or fail), or shutdown signal
    tokio::select! {
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        result = async {
            match webhook_handle {
                Some(handle) => handle.await,
                None => std::future::pending().await,
            }
        } => {
            if let Err(e) = result {
                error!("Webhook server task panicked: {}", e);
            }
        }
        // Handle graceful shutdown on SIGTERM or SIGINT
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            // Mark as not ready so the API server stops routing admission calls here
            health_state.set_ready(false).await;
            info!("Marked webhook as not ready");

            info!(
                "Waiting {}s for in-flight admission requests to complete...",
                SHUTDOWN_GRACE_PERIOD_SECS
            );
            tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)).await;

            info!("Grace period complete, shutting down");
        }
    }

    info!("Admission controller stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Signal handler setup failures are fatal.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
