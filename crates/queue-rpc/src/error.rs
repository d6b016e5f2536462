//! Error taxonomy for the broker RPC layer.

use std::time::Duration;

/// Errors surfaced to callers of the RPC layer.
///
/// Application-level error payloads returned by a downstream service are
/// not errors here; they pass through `call` as ordinary response data.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The transport connection or channel could not be established, or a
    /// publish failed. Not retried automatically.
    #[error("broker connectivity error: {0}")]
    Connectivity(String),

    /// No matching reply arrived within the deadline.
    #[error("no reply from {destination} within {timeout:?}")]
    Timeout {
        destination: String,
        timeout: Duration,
    },

    /// A frame or body could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<std::io::Error> for RpcError {
    fn from(e: std::io::Error) -> Self {
        RpcError::Connectivity(e.to_string())
    }
}

impl RpcError {
    /// True for [`RpcError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::Timeout { .. })
    }
}
