//! Broker link: the process-wide shared connection and publish channel.
//!
//! One TCP connection to the broker serves every caller. The link is
//! dialed lazily on first use and re-dialed after a transport failure;
//! concurrent callers during a dial all wait on the same attempt.

use crate::error::RpcError;
use crate::wire::{self, Envelope};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Well-known local broker address used when none is configured.
pub const DEFAULT_BROKER_URL: &str = "127.0.0.1:5672";

/// Broker connection settings.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Broker address, `host:port`.
    pub url: String,
    /// Deadline for establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Per-call deadline when the caller does not supply one.
    pub default_timeout: Duration,
    /// Inbound deliveries buffered before the reader applies backpressure.
    pub delivery_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BROKER_URL.to_string(),
            connect_timeout: Duration::from_secs(5),
            default_timeout: Duration::from_secs(10),
            delivery_capacity: 256,
        }
    }
}

/// Lifecycle state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Ready,
}

/// Publish half of the broker connection.
#[derive(Debug)]
pub struct Channel {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    closed: AtomicBool,
}

impl Channel {
    /// Publish one envelope to the broker.
    pub async fn publish(&self, envelope: &Envelope) -> Result<(), RpcError> {
        let mut writer = self.writer.lock().await;
        let result = wire::write_envelope(&mut *writer, envelope).await;
        if matches!(result, Err(RpcError::Connectivity(_))) {
            self.closed.store(true, Ordering::Release);
        }
        result
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn close(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
        self.closed.store(true, Ordering::Release);
    }
}

/// Read half of the broker connection: a handle to the reader task that
/// forwards inbound envelopes into the delivery channel.
#[derive(Debug)]
pub struct Connection {
    reader_task: JoinHandle<()>,
    done: Arc<AtomicBool>,
}

impl Connection {
    pub fn is_closed(&self) -> bool {
        self.done.load(Ordering::Acquire) || self.reader_task.is_finished()
    }
}

/// Handles shared by every caller while the link is Ready.
#[derive(Clone, Debug)]
pub struct LinkHandles {
    pub connection: Arc<Connection>,
    pub channel: Arc<Channel>,
}

impl LinkHandles {
    fn is_live(&self) -> bool {
        !self.channel.is_closed() && !self.connection.is_closed()
    }
}

/// The single shared transport connection and logical channel.
pub struct BrokerLink {
    config: BrokerConfig,
    delivery_tx: mpsc::Sender<Envelope>,
    /// Held across the dial so concurrent acquires share one attempt.
    slot: tokio::sync::Mutex<Option<LinkHandles>>,
    state: parking_lot::RwLock<LinkState>,
}

impl BrokerLink {
    /// Create a link. Nothing is dialed until the first `acquire()`.
    ///
    /// Every envelope the broker delivers on this connection is forwarded
    /// to `delivery_tx`.
    pub fn new(config: BrokerConfig, delivery_tx: mpsc::Sender<Envelope>) -> Self {
        Self {
            config,
            delivery_tx,
            slot: tokio::sync::Mutex::new(None),
            state: parking_lot::RwLock::new(LinkState::Disconnected),
        }
    }

    pub fn state(&self) -> LinkState {
        *self.state.read()
    }

    /// Get the shared connection and channel, dialing if necessary.
    ///
    /// Idempotent while Ready: returns the existing handles without
    /// re-dialing. A dead link is detected here and re-dialed from
    /// Disconnected. Dial failures leave the state Disconnected so the
    /// next call can retry.
    pub async fn acquire(&self) -> Result<LinkHandles, RpcError> {
        let mut slot = self.slot.lock().await;

        if let Some(handles) = slot.as_ref() {
            if handles.is_live() {
                return Ok(handles.clone());
            }
        }
        if slot.take().is_some() {
            warn!(url = %self.config.url, "Broker link lost, redialing");
            *self.state.write() = LinkState::Disconnected;
        }

        *self.state.write() = LinkState::Connecting;
        match self.dial().await {
            Ok(handles) => {
                *slot = Some(handles.clone());
                *self.state.write() = LinkState::Ready;
                info!(url = %self.config.url, "Broker link established");
                Ok(handles)
            }
            Err(e) => {
                *self.state.write() = LinkState::Disconnected;
                Err(e)
            }
        }
    }

    async fn dial(&self) -> Result<LinkHandles, RpcError> {
        let url = &self.config.url;
        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(url))
            .await
            .map_err(|_| RpcError::Connectivity(format!("connect to {url} timed out")))?
            .map_err(|e| RpcError::Connectivity(format!("connect to {url} failed: {e}")))?;

        let (read_half, write_half) = stream.into_split();
        let done = Arc::new(AtomicBool::new(false));
        let reader_task = tokio::spawn(reader_loop(
            read_half,
            self.delivery_tx.clone(),
            Arc::clone(&done),
        ));

        Ok(LinkHandles {
            connection: Arc::new(Connection { reader_task, done }),
            channel: Arc::new(Channel {
                writer: tokio::sync::Mutex::new(write_half),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Close channel then connection and reset to Disconnected.
    ///
    /// Safe to call when the link was never acquired.
    pub async fn release(&self) {
        let mut slot = self.slot.lock().await;
        if let Some(handles) = slot.take() {
            handles.channel.close().await;
            handles.connection.reader_task.abort();
            info!("Broker link released");
        }
        *self.state.write() = LinkState::Disconnected;
    }
}

/// Forward inbound envelopes until the connection or delivery channel
/// closes. Undecodable frames are dropped; the stream stays aligned.
async fn reader_loop(
    mut reader: OwnedReadHalf,
    delivery_tx: mpsc::Sender<Envelope>,
    done: Arc<AtomicBool>,
) {
    loop {
        match wire::read_envelope(&mut reader).await {
            Ok(Some(envelope)) => {
                if delivery_tx.send(envelope).await.is_err() {
                    debug!("Delivery channel closed, stopping broker reader");
                    break;
                }
            }
            Ok(None) => {
                debug!("Broker closed the connection");
                break;
            }
            Err(RpcError::Protocol(e)) => {
                warn!(error = %e, "Dropping undecodable frame");
            }
            Err(e) => {
                warn!(error = %e, "Broker read failed");
                break;
            }
        }
    }
    done.store(true, Ordering::Release);
}
