//! Review gateway binary: configuration, wiring, and process lifecycle.

use queue_rpc::RpcClient;
use review_gateway::{
    router, AppState, Enricher, GatewayConfig, GatewayError, InMemoryReviewStore, ReviewStore,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), GatewayError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GatewayConfig::from_env()?;
    config.validate()?;
    info!(
        broker_url = %config.broker.url,
        mode = ?config.enrichment.mode,
        "Starting review gateway"
    );

    let rpc = Arc::new(RpcClient::new(config.broker.clone()));
    let enricher = Arc::new(Enricher::new(
        rpc.clone(),
        config.enrichment.timeout,
        config.enrichment.mode,
    ));
    let store: Arc<dyn ReviewStore> = Arc::new(InMemoryReviewStore::default());

    let app = router(AppState {
        store,
        enricher,
        auth: config.auth.clone(),
    });

    let addr = config.http_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| GatewayError::Bind(e.to_string()))?;
    info!(addr = %addr, "Review gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    // Channel first, then connection; in-flight requests are abandoned.
    rpc.shutdown().await;
    info!("Review gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received interrupt, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for interrupt"),
    }
}
