//! Review Gateway - HTTP surface for the platform's soft-deleted reviews.
//!
//! Serves `GET /deleted/reviews`: fetches soft-deleted review records from
//! the review store and enriches each one concurrently over the message
//! broker (user, media, and genre data live in other services). A slow or
//! dead downstream degrades one field of the composite record instead of
//! failing the request.

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod auth;
pub mod config;
pub mod enrich;
pub mod error;
pub mod http;
pub mod store;

// Re-exports for the binary and tests
pub use auth::AuthConfig;
pub use config::{ConfigError, GatewayConfig};
pub use enrich::{EnrichedReview, Enricher, EnrichmentMode, QueueRpc};
pub use error::GatewayError;
pub use http::{router, AppState};
pub use store::{InMemoryReviewStore, Review, ReviewStore, StoreError};
