//! Review records and the persistent-store boundary.
//!
//! The platform's persistence service owns the real store; this gateway
//! only depends on the [`ReviewStore`] port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A review record as the platform stores it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: u64,
    pub title: String,
    pub description: Option<String>,
    /// Author, owned by user-service.
    pub user_id: u64,
    /// Reviewed media, owned by media-service.
    pub media_id: u64,
    /// Soft-delete flag.
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store query failed: {0}")]
    Query(String),
}

/// Outbound port to the review store.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// All reviews currently flagged as soft-deleted.
    async fn soft_deleted(&self) -> Result<Vec<Review>, StoreError>;
}

/// In-memory review store.
#[derive(Default)]
pub struct InMemoryReviewStore {
    reviews: parking_lot::RwLock<Vec<Review>>,
}

impl InMemoryReviewStore {
    pub fn new(reviews: Vec<Review>) -> Self {
        Self {
            reviews: parking_lot::RwLock::new(reviews),
        }
    }

    pub fn insert(&self, review: Review) {
        self.reviews.write().push(review);
    }
}

#[async_trait]
impl ReviewStore for InMemoryReviewStore {
    async fn soft_deleted(&self) -> Result<Vec<Review>, StoreError> {
        Ok(self
            .reviews
            .read()
            .iter()
            .filter(|r| r.is_blocked)
            .cloned()
            .collect())
    }
}
