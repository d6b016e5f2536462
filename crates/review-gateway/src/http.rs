//! HTTP surface: router, handlers, and shared state.

use crate::auth::{self, AuthConfig};
use crate::enrich::{EnrichedReview, Enricher};
use crate::error::GatewayError;
use crate::store::ReviewStore;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{middleware, Json, Router};
use futures::future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReviewStore>,
    pub enricher: Arc<Enricher>,
    pub auth: AuthConfig,
}

/// Build the gateway router.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/deleted/reviews", get(list_deleted_reviews))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::verify_user,
        ));

    Router::new()
        .merge(protected)
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// `GET /deleted/reviews` — soft-deleted reviews, each enriched over the
/// broker. Reviews are enriched concurrently; within one review the
/// sub-queries fan out concurrently as well.
async fn list_deleted_reviews(
    State(state): State<AppState>,
) -> Result<Json<Vec<EnrichedReview>>, GatewayError> {
    let reviews = state.store.soft_deleted().await?;
    debug!(count = reviews.len(), "Fetched soft-deleted reviews");

    let enriched =
        future::join_all(reviews.iter().map(|review| state.enricher.enrich(review))).await;

    Ok(Json(enriched))
}

/// `GET /health` — liveness probe.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "review-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
