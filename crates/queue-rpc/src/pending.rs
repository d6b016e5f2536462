//! Pending-reply table: maps correlation tokens to waiting callers.
//!
//! Removal from the table is the single point of truth for settling a
//! request. Whichever of {delivery, timeout} removes the entry wins; the
//! other side becomes a no-op. Late or duplicate replies are dropped
//! silently.

use crate::correlation::CorrelationId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// One in-flight request waiting for its reply.
struct PendingReply {
    sender: oneshot::Sender<serde_json::Value>,
    created_at: Instant,
    /// Destination queue, for logging.
    destination: String,
    timeout: Duration,
}

/// Counters over the life of the store.
#[derive(Debug, Default)]
pub struct PendingStats {
    pub total_registered: AtomicU64,
    pub total_completed: AtomicU64,
    pub total_timeouts: AtomicU64,
    pub total_cancelled: AtomicU64,
}

/// Table of in-flight requests keyed by correlation token.
///
/// Flow:
/// 1. The caller registers and gets a oneshot receiver.
/// 2. The caller publishes the request carrying the token.
/// 3. The reply listener receives the reply and calls `complete()`.
/// 4. The caller awaits the receiver under its deadline.
pub struct PendingReplyStore {
    pending: DashMap<CorrelationId, PendingReply>,
    stats: PendingStats,
}

impl PendingReplyStore {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
            stats: PendingStats::default(),
        }
    }

    /// Register an in-flight request and get a receiver for its reply.
    pub fn register(
        &self,
        destination: &str,
        timeout: Duration,
    ) -> (CorrelationId, oneshot::Receiver<serde_json::Value>) {
        let correlation_id = CorrelationId::new();
        let (tx, rx) = oneshot::channel();

        self.pending.insert(
            correlation_id,
            PendingReply {
                sender: tx,
                created_at: Instant::now(),
                destination: destination.to_string(),
                timeout,
            },
        );
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);

        debug!(
            correlation_id = %correlation_id,
            destination = destination,
            "Registered pending request"
        );

        (correlation_id, rx)
    }

    /// Deliver a reply to its waiter.
    ///
    /// Returns false if the token is unknown, already settled, or the
    /// waiter has gone away. Not an error; late and duplicate replies are
    /// possible.
    pub fn complete(&self, correlation_id: CorrelationId, body: serde_json::Value) -> bool {
        let Some((_, entry)) = self.pending.remove(&correlation_id) else {
            debug!(
                correlation_id = %correlation_id,
                "Reply for unknown or expired correlation token"
            );
            return false;
        };

        let waited = entry.created_at.elapsed();
        match entry.sender.send(body) {
            Ok(()) => {
                self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    correlation_id = %correlation_id,
                    destination = entry.destination,
                    waited_ms = waited.as_millis() as u64,
                    "Completed pending request"
                );
                true
            }
            Err(_) => {
                // Receiver dropped; the caller gave up.
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Remove an entry without settling it (send failure or caller timeout).
    pub fn cancel(&self, correlation_id: &CorrelationId) -> bool {
        if self.pending.remove(correlation_id).is_some() {
            self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Sweep entries whose deadline has passed.
    ///
    /// Callers cancel their own entries on timeout; this catches waiters
    /// that vanished without cancelling. Returns the number removed.
    pub fn remove_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.pending.retain(|id, entry| {
            let elapsed = now.duration_since(entry.created_at);
            if elapsed > entry.timeout {
                warn!(
                    correlation_id = %id,
                    destination = entry.destination,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Removing expired pending request"
                );
                self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
                removed += 1;
                false
            } else {
                true
            }
        });

        removed
    }

    /// Number of in-flight requests.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, correlation_id: &CorrelationId) -> bool {
        self.pending.contains_key(correlation_id)
    }

    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}

impl Default for PendingReplyStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Background sweep of expired entries.
pub async fn cleanup_task(store: Arc<PendingReplyStore>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let removed = store.remove_expired();
        if removed > 0 {
            debug!(removed = removed, "Swept expired pending requests");
        }
    }
}
