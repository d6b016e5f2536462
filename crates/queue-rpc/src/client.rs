//! RPC client: correlated request/reply over the broker link.
//!
//! One reply queue serves the whole process. Every reply funnels through a
//! single listener task whose work per envelope is a map lookup and a
//! oneshot handoff; anything heavier happens on the resumed caller.

use crate::correlation::CorrelationId;
use crate::error::RpcError;
use crate::link::{BrokerConfig, BrokerLink};
use crate::pending::{self, PendingReplyStore};
use crate::wire::Envelope;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Interval for the background sweep of expired pending entries.
const REAPER_INTERVAL: Duration = Duration::from_secs(10);

/// Client for request-reply calls through the broker.
///
/// Cheap to share behind an `Arc`; all calls multiplex over one connection
/// and one reply queue.
pub struct RpcClient {
    link: BrokerLink,
    pending: Arc<PendingReplyStore>,
    reply_queue: String,
    default_timeout: Duration,
}

impl RpcClient {
    /// Create a client and start its reply listener.
    ///
    /// Spawns the listener and reaper tasks, so this must run inside a
    /// Tokio runtime. The broker connection itself is dialed lazily on the
    /// first call.
    pub fn new(config: BrokerConfig) -> Self {
        let (delivery_tx, delivery_rx) = mpsc::channel(config.delivery_capacity);
        let pending = Arc::new(PendingReplyStore::new());
        let reply_queue = format!("reply.{}", CorrelationId::new());

        tokio::spawn(
            ReplyListener {
                pending: Arc::clone(&pending),
                reply_queue: reply_queue.clone(),
                delivery_rx,
            }
            .run(),
        );
        tokio::spawn(pending::cleanup_task(Arc::clone(&pending), REAPER_INTERVAL));

        let default_timeout = config.default_timeout;
        Self {
            link: BrokerLink::new(config, delivery_tx),
            pending,
            reply_queue,
            default_timeout,
        }
    }

    /// Send `payload` to `destination` and await the correlated reply.
    ///
    /// Resolves to the reply body, or fails with
    /// [`RpcError::Connectivity`] when the link or publish fails and
    /// [`RpcError::Timeout`] when no matching reply arrives in time.
    pub async fn call(
        &self,
        destination: &str,
        payload: serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<serde_json::Value, RpcError> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let handles = self.link.acquire().await?;

        // Register before publishing so a fast reply always finds its waiter.
        let (correlation_id, rx) = self.pending.register(destination, timeout);

        let envelope = Envelope {
            destination: destination.to_string(),
            correlation_id,
            reply_to: self.reply_queue.clone(),
            body: payload,
        };

        if let Err(e) = handles.channel.publish(&envelope).await {
            self.pending.cancel(&correlation_id);
            return Err(e);
        }

        debug!(
            correlation_id = %correlation_id,
            destination = destination,
            "Sent request"
        );

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(body)) => Ok(body),
            // Sender dropped unsent: the reaper swept the entry past its
            // deadline before our timer fired. Same outcome.
            Ok(Err(_)) => Err(RpcError::Timeout {
                destination: destination.to_string(),
                timeout,
            }),
            Err(_) => {
                self.pending.cancel(&correlation_id);
                Err(RpcError::Timeout {
                    destination: destination.to_string(),
                    timeout,
                })
            }
        }
    }

    /// Number of in-flight requests.
    pub fn pending_count(&self) -> usize {
        self.pending.pending_count()
    }

    /// Name of the process-wide reply queue.
    pub fn reply_queue(&self) -> &str {
        &self.reply_queue
    }

    /// The underlying broker link.
    pub fn link(&self) -> &BrokerLink {
        &self.link
    }

    /// Release the broker link. In-flight requests are abandoned; their
    /// timers fire as usual.
    pub async fn shutdown(&self) {
        self.link.release().await;
    }
}

/// The single listener demultiplexing replies into the pending table.
struct ReplyListener {
    pending: Arc<PendingReplyStore>,
    reply_queue: String,
    delivery_rx: mpsc::Receiver<Envelope>,
}

impl ReplyListener {
    async fn run(mut self) {
        while let Some(envelope) = self.delivery_rx.recv().await {
            if envelope.destination != self.reply_queue {
                debug!(
                    destination = %envelope.destination,
                    "Ignoring delivery for foreign queue"
                );
                continue;
            }
            // O(1) lookup-and-handoff; a false return means the token is
            // unknown or already settled, which complete() logs.
            self.pending.complete(envelope.correlation_id, envelope.body);
        }
        debug!("Delivery channel closed, reply listener stopping");
    }
}
