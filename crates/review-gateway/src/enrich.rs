//! Fan-out enrichment of soft-deleted reviews.
//!
//! Each review needs data owned by other services. The enricher issues
//! the sub-queries concurrently with a bounded timeout each, so total
//! latency is the max of the sub-latencies. A failed or empty sub-query
//! degrades its own field to a placeholder; it never aborts the others.

use crate::store::Review;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use queue_rpc::{RpcClient, RpcError};
use serde::Serialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Destination queues the enricher talks to.
pub const USER_SERVICE: &str = "user-service";
pub const MEDIA_SERVICE: &str = "media-service";
pub const GENRE_SERVICE: &str = "genre-service";
/// Consolidated service that owns the whole breakdown.
pub const REVIEWS_SERVICE: &str = "soft-deleted-reviews-service";

/// Seam over the RPC client so enrichment can be exercised against fakes.
#[async_trait]
pub trait QueueRpc: Send + Sync {
    async fn fetch(
        &self,
        destination: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, RpcError>;
}

#[async_trait]
impl QueueRpc for RpcClient {
    async fn fetch(
        &self,
        destination: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Value, RpcError> {
        self.call(destination, payload, Some(timeout)).await
    }
}

/// Which responsibility split enrichment uses.
///
/// `PerService` queries user/media/genre services per review;
/// `Consolidated` delegates the whole breakdown to one downstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnrichmentMode {
    #[default]
    PerService,
    Consolidated,
}

impl FromStr for EnrichmentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "per-service" => Ok(Self::PerService),
            "consolidated" => Ok(Self::Consolidated),
            other => Err(format!(
                "unknown enrichment mode {other:?} (expected \"per-service\" or \"consolidated\")"
            )),
        }
    }
}

/// A review joined with the data the other services hold for it.
///
/// Missing or failed fields carry explicit placeholder markers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedReview {
    pub id: u64,
    pub title: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user: Value,
    pub media: Value,
    pub genres: Value,
}

/// Issues the sub-queries for a review and assembles the composite record.
pub struct Enricher {
    rpc: Arc<dyn QueueRpc>,
    timeout: Duration,
    mode: EnrichmentMode,
}

impl Enricher {
    pub fn new(rpc: Arc<dyn QueueRpc>, timeout: Duration, mode: EnrichmentMode) -> Self {
        Self { rpc, timeout, mode }
    }

    /// Enrich one review. Resolves once every sub-query has settled;
    /// never fails, individual sub-query errors degrade their field.
    pub async fn enrich(&self, review: &Review) -> EnrichedReview {
        let (user, media, genres) = match self.mode {
            EnrichmentMode::PerService => self.per_service(review).await,
            EnrichmentMode::Consolidated => self.consolidated(review).await,
        };

        EnrichedReview {
            id: review.id,
            title: review.title.clone(),
            description: review.description.clone(),
            created_at: review.created_at,
            updated_at: review.updated_at,
            user,
            media,
            genres,
        }
    }

    async fn per_service(&self, review: &Review) -> (Value, Value, Value) {
        let (user, media, genres) = tokio::join!(
            self.rpc.fetch(
                USER_SERVICE,
                json!({"userId": review.user_id}),
                self.timeout
            ),
            self.rpc.fetch(
                MEDIA_SERVICE,
                json!({"mediaId": review.media_id}),
                self.timeout
            ),
            self.rpc
                .fetch(GENRE_SERVICE, json!({"reviewId": review.id}), self.timeout),
        );

        (
            slot_or(user, USER_SERVICE, review.id, user_placeholder),
            slot_or(media, MEDIA_SERVICE, review.id, media_placeholder),
            slot_or(genres, GENRE_SERVICE, review.id, genres_placeholder),
        )
    }

    async fn consolidated(&self, review: &Review) -> (Value, Value, Value) {
        let result = self
            .rpc
            .fetch(REVIEWS_SERVICE, json!({"reviewId": review.id}), self.timeout)
            .await;

        match result {
            Ok(Value::Object(mut fields)) => (
                field_or(fields.remove("user"), user_placeholder),
                field_or(fields.remove("media"), media_placeholder),
                field_or(fields.remove("genres"), genres_placeholder),
            ),
            Ok(other) => {
                warn!(
                    review_id = review.id,
                    destination = REVIEWS_SERVICE,
                    body = %other,
                    "Unexpected consolidated response shape, degrading all fields"
                );
                (user_placeholder(), media_placeholder(), genres_placeholder())
            }
            Err(e) => {
                warn!(
                    review_id = review.id,
                    destination = REVIEWS_SERVICE,
                    error = %e,
                    "Consolidated sub-query failed, degrading all fields"
                );
                (user_placeholder(), media_placeholder(), genres_placeholder())
            }
        }
    }
}

/// Map one sub-query outcome to its field value. A `null` response means
/// the downstream found nothing; an application-level error payload
/// passes through as data.
fn slot_or(
    result: Result<Value, RpcError>,
    destination: &str,
    review_id: u64,
    placeholder: fn() -> Value,
) -> Value {
    match result {
        Ok(Value::Null) => placeholder(),
        Ok(value) => value,
        Err(e) => {
            warn!(
                review_id = review_id,
                destination = destination,
                error = %e,
                "Sub-query failed, degrading field"
            );
            placeholder()
        }
    }
}

fn field_or(field: Option<Value>, placeholder: fn() -> Value) -> Value {
    match field {
        Some(Value::Null) | None => placeholder(),
        Some(value) => value,
    }
}

fn user_placeholder() -> Value {
    json!({"error": "User not found"})
}

fn media_placeholder() -> Value {
    json!({"error": "Media not found"})
}

fn genres_placeholder() -> Value {
    json!([])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Instant;

    /// Scripted behavior for one destination.
    #[derive(Clone)]
    enum Script {
        Reply(Value, Duration),
        Never,
    }

    struct MockRpc {
        scripts: HashMap<&'static str, Script>,
    }

    impl MockRpc {
        fn new(scripts: Vec<(&'static str, Script)>) -> Arc<Self> {
            Arc::new(Self {
                scripts: scripts.into_iter().collect(),
            })
        }
    }

    #[async_trait]
    impl QueueRpc for MockRpc {
        async fn fetch(
            &self,
            destination: &str,
            _payload: Value,
            timeout: Duration,
        ) -> Result<Value, RpcError> {
            let timed_out = || RpcError::Timeout {
                destination: destination.to_string(),
                timeout,
            };
            match self.scripts.get(destination).cloned() {
                Some(Script::Reply(value, delay)) if delay <= timeout => {
                    tokio::time::sleep(delay).await;
                    Ok(value)
                }
                Some(Script::Reply(..)) | Some(Script::Never) | None => {
                    tokio::time::sleep(timeout).await;
                    Err(timed_out())
                }
            }
        }
    }

    fn review() -> Review {
        Review {
            id: 9,
            title: "Dune".into(),
            description: Some("slow burn".into()),
            user_id: 42,
            media_id: 7,
            is_blocked: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn fast(value: Value) -> Script {
        Script::Reply(value, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_enrich_merges_all_fields() {
        let rpc = MockRpc::new(vec![
            (USER_SERVICE, fast(json!({"name": "Ada"}))),
            (MEDIA_SERVICE, fast(json!({"title": "Dune"}))),
            (GENRE_SERVICE, fast(json!(["scifi"]))),
        ]);
        let enricher = Enricher::new(rpc, Duration::from_millis(200), EnrichmentMode::PerService);

        let enriched = enricher.enrich(&review()).await;

        assert_eq!(enriched.id, 9);
        assert_eq!(enriched.user, json!({"name": "Ada"}));
        assert_eq!(enriched.media, json!({"title": "Dune"}));
        assert_eq!(enriched.genres, json!(["scifi"]));
    }

    #[tokio::test]
    async fn test_one_timeout_degrades_only_its_field() {
        let rpc = MockRpc::new(vec![
            (USER_SERVICE, Script::Never),
            (MEDIA_SERVICE, fast(json!({"title": "Dune"}))),
            (GENRE_SERVICE, fast(json!(["scifi"]))),
        ]);
        let timeout = Duration::from_millis(200);
        let enricher = Enricher::new(rpc, timeout, EnrichmentMode::PerService);

        let started = Instant::now();
        let enriched = enricher.enrich(&review()).await;
        let elapsed = started.elapsed();

        assert_eq!(enriched.user, json!({"error": "User not found"}));
        assert_eq!(enriched.media, json!({"title": "Dune"}));
        assert_eq!(enriched.genres, json!(["scifi"]));

        // Concurrent fan-out: roughly max(latencies), well under their sum.
        assert!(elapsed >= timeout, "finished before the slow branch: {elapsed:?}");
        assert!(
            elapsed < timeout + Duration::from_millis(150),
            "branches appear to have run sequentially: {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn test_null_response_maps_to_placeholder() {
        let rpc = MockRpc::new(vec![
            (USER_SERVICE, fast(json!(null))),
            (MEDIA_SERVICE, fast(json!({"title": "Dune"}))),
            (GENRE_SERVICE, fast(json!(null))),
        ]);
        let enricher = Enricher::new(rpc, Duration::from_millis(200), EnrichmentMode::PerService);

        let enriched = enricher.enrich(&review()).await;

        assert_eq!(enriched.user, json!({"error": "User not found"}));
        assert_eq!(enriched.genres, json!([]));
    }

    #[tokio::test]
    async fn test_upstream_error_payload_passes_through() {
        let rpc = MockRpc::new(vec![
            (USER_SERVICE, fast(json!({"error": "account suspended"}))),
            (MEDIA_SERVICE, fast(json!({"title": "Dune"}))),
            (GENRE_SERVICE, fast(json!([]))),
        ]);
        let enricher = Enricher::new(rpc, Duration::from_millis(200), EnrichmentMode::PerService);

        let enriched = enricher.enrich(&review()).await;

        assert_eq!(enriched.user, json!({"error": "account suspended"}));
    }

    #[tokio::test]
    async fn test_consolidated_mode_splits_fields() {
        let rpc = MockRpc::new(vec![(
            REVIEWS_SERVICE,
            fast(json!({
                "user": {"name": "Ada"},
                "media": {"title": "Dune"},
                "genres": ["scifi"],
            })),
        )]);
        let enricher = Enricher::new(
            rpc,
            Duration::from_millis(200),
            EnrichmentMode::Consolidated,
        );

        let enriched = enricher.enrich(&review()).await;

        assert_eq!(enriched.user, json!({"name": "Ada"}));
        assert_eq!(enriched.media, json!({"title": "Dune"}));
        assert_eq!(enriched.genres, json!(["scifi"]));
    }

    #[tokio::test]
    async fn test_consolidated_failure_degrades_all_fields() {
        let rpc = MockRpc::new(vec![(REVIEWS_SERVICE, Script::Never)]);
        let enricher = Enricher::new(
            rpc,
            Duration::from_millis(50),
            EnrichmentMode::Consolidated,
        );

        let enriched = enricher.enrich(&review()).await;

        assert_eq!(enriched.user, json!({"error": "User not found"}));
        assert_eq!(enriched.media, json!({"error": "Media not found"}));
        assert_eq!(enriched.genres, json!([]));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(
            "per-service".parse::<EnrichmentMode>().unwrap(),
            EnrichmentMode::PerService
        );
        assert_eq!(
            "consolidated".parse::<EnrichmentMode>().unwrap(),
            EnrichmentMode::Consolidated
        );
        assert!("rabbit".parse::<EnrichmentMode>().is_err());
    }

    #[test]
    fn test_enriched_review_json_shape() {
        let enriched = EnrichedReview {
            id: 1,
            title: "t".into(),
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            user: json!({"name": "Ada"}),
            media: json!({}),
            genres: json!([]),
        };
        let value = serde_json::to_value(&enriched).unwrap();
        assert!(value.get("createdAt").is_some());
        assert_eq!(value["user"]["name"], "Ada");
    }
}
