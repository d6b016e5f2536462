//! Wire envelope and frame codec for the broker connection.
//!
//! Frames are 4-byte big-endian length-prefixed JSON, the same unit in
//! both directions: the client publishes envelopes addressed to named
//! destinations, and the broker delivers reply envelopes addressed to the
//! client's reply queue over the same connection.

use crate::correlation::CorrelationId;
use crate::error::RpcError;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum frame size accepted from the broker (1 MB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// The wire unit exchanged with the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Named queue the message is addressed to.
    pub destination: String,
    /// Token echoed back in the reply.
    pub correlation_id: CorrelationId,
    /// Queue name replies should be delivered to.
    pub reply_to: String,
    /// Message payload; any valid JSON.
    pub body: serde_json::Value,
}

/// Write one envelope as a length-prefixed frame.
pub async fn write_envelope<W>(writer: &mut W, envelope: &Envelope) -> Result<(), RpcError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = serde_json::to_vec(envelope)
        .map_err(|e| RpcError::Protocol(format!("envelope encode failed: {e}")))?;
    if bytes.len() > MAX_FRAME_SIZE {
        return Err(RpcError::Protocol(format!(
            "frame too large: {} bytes",
            bytes.len()
        )));
    }
    writer.write_u32(bytes.len() as u32).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one envelope frame.
///
/// Returns `Ok(None)` when the peer closed the connection cleanly.
/// A decode failure is [`RpcError::Protocol`] and leaves the stream
/// aligned on the next frame; I/O failures are [`RpcError::Connectivity`].
pub async fn read_envelope<R>(reader: &mut R) -> Result<Option<Envelope>, RpcError>
where
    R: AsyncRead + Unpin,
{
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if len > MAX_FRAME_SIZE {
        return Err(RpcError::Connectivity(format!(
            "inbound frame too large: {len} bytes"
        )));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;

    serde_json::from_slice(&buf)
        .map(Some)
        .map_err(|e| RpcError::Protocol(format!("envelope decode failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let envelope = Envelope {
            destination: "user-service".into(),
            correlation_id: CorrelationId::new(),
            reply_to: "reply.abc".into(),
            body: serde_json::json!({"userId": 42}),
        };

        write_envelope(&mut client, &envelope).await.unwrap();
        let read = read_envelope(&mut server).await.unwrap().unwrap();

        assert_eq!(read.destination, "user-service");
        assert_eq!(read.correlation_id, envelope.correlation_id);
        assert_eq!(read.body["userId"], 42);
    }

    #[tokio::test]
    async fn test_clean_eof_is_none() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);
        assert!(read_envelope(&mut server).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_undecodable_frame_is_protocol_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_u32(3).await.unwrap();
        client.write_all(b"{{{").await.unwrap();

        let err = read_envelope(&mut server).await.unwrap_err();
        assert!(matches!(err, RpcError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_oversize_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_u32((MAX_FRAME_SIZE + 1) as u32).await.unwrap();

        let err = read_envelope(&mut server).await.unwrap_err();
        assert!(matches!(err, RpcError::Connectivity(_)));
    }
}
