//! Ferry API Server
//!
//! Main entry point for the Ferry upload relay.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ferry_api::{AppState, create_router};
use ferry_core::blob::{CloudinaryUploader, DestinationUploader, ObjectStoreUploader};
use ferry_core::relay::RelayService;
use ferry_core::staging::StagingArea;
use ferry_db::{TenantRepository, connect_with};
use ferry_shared::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ferry=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = AppConfig::load().expect("Failed to load configuration");

    // Connect to database
    let db = connect_with(&config.database).await?;
    info!("Connected to database");

    // Build the relay from its collaborators
    let tenants = Arc::new(TenantRepository::new(db));
    let uploader = Arc::new(DestinationUploader::new(
        CloudinaryUploader::from_config(&config.cloudinary)?,
        ObjectStoreUploader::new(),
    ));
    let staging = StagingArea::new(&config.relay.staging_dir);
    let relay = RelayService::new(Arc::clone(&tenants), uploader, staging);
    info!(
        staging_dir = %config.relay.staging_dir.display(),
        deadline_secs = config.relay.deadline_secs,
        max_payload_bytes = config.relay.max_payload_bytes,
        "Upload relay configured"
    );

    if config.admin.token.is_none() {
        warn!("FERRY__ADMIN__TOKEN is not set; tenant provisioning routes are disabled");
    }

    // Create application state
    let state = AppState {
        tenants,
        relay,
        relay_config: Arc::new(config.relay.clone()),
        admin_token: config.admin.token.as_deref().map(Arc::from),
    };

    // Create router
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM so in-flight relays can finish.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received terminate signal"),
    }

    info!("Shutting down gracefully");
}
