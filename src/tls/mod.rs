//! TLS record framing
//!
//! Reads exactly one TLS record off a byte stream so the HTTPS tunnel can
//! intercept the ClientHello before forwarding begins. Nothing beyond the
//! record header and the handshake type byte is parsed; SNI extraction is
//! never needed because the proxy is payload-agnostic once the ClientHello
//! has been captured.

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// TLS record header length: content type + legacy version + payload length
pub const RECORD_HEADER_SIZE: usize = 5;

/// Largest record payload the reader accepts. TLS 1.3 caps ciphertext at
/// 2^14 + 2048 bytes (RFC 8446 §5.2); anything larger is not a plausible
/// ClientHello.
pub const MAX_RECORD_SIZE: usize = (1 << 14) + 2048;

/// Content type of handshake records
const CONTENT_TYPE_HANDSHAKE: u8 = 22;

/// Handshake message type of a ClientHello
const HANDSHAKE_TYPE_CLIENT_HELLO: u8 = 1;

/// Record reader errors
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("read error: {0}")]
    Read(#[from] std::io::Error),

    #[error("record length {len} exceeds the TLS record ceiling")]
    Oversized { len: usize },
}

/// One TLS record as read off the wire, header included.
#[derive(Debug, Clone)]
pub struct TlsRecord {
    raw: Bytes,
}

impl TlsRecord {
    /// Full record bytes, 5-byte header included
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Consume the record, yielding the full record bytes
    pub fn into_raw(self) -> Bytes {
        self.raw
    }

    /// Record content type (first header byte)
    pub fn content_type(&self) -> u8 {
        self.raw[0]
    }

    /// Record payload, header stripped
    pub fn payload(&self) -> &[u8] {
        &self.raw[RECORD_HEADER_SIZE..]
    }

    /// True iff this record is a handshake record carrying a ClientHello.
    ///
    /// A handshake message header is 4 bytes, so anything shorter cannot be
    /// a ClientHello even if the type byte matches.
    pub fn is_client_hello(&self) -> bool {
        let payload = self.payload();
        self.content_type() == CONTENT_TYPE_HANDSHAKE
            && payload.len() >= 4
            && payload[0] == HANDSHAKE_TYPE_CLIENT_HELLO
    }
}

/// Read exactly one TLS record from `stream`.
///
/// Reads the 5-byte header, validates the declared payload length against
/// [`MAX_RECORD_SIZE`], then reads the payload. A short read at any point
/// surfaces as [`RecordError::Read`].
pub async fn read_record<R>(stream: &mut R) -> Result<TlsRecord, RecordError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; RECORD_HEADER_SIZE];
    stream.read_exact(&mut header).await?;

    let len = u16::from_be_bytes([header[3], header[4]]) as usize;
    if len > MAX_RECORD_SIZE {
        return Err(RecordError::Oversized { len });
    }

    let mut raw = vec![0u8; RECORD_HEADER_SIZE + len];
    raw[..RECORD_HEADER_SIZE].copy_from_slice(&header);
    stream.read_exact(&mut raw[RECORD_HEADER_SIZE..]).await?;

    Ok(TlsRecord { raw: raw.into() })
}
