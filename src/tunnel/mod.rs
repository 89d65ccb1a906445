//! Tunnel layer - the DPI-evasion data path
//!
//! Provides:
//! - ClientHello chunking policies
//! - Randomized inter-chunk delays
//! - Unidirectional byte relay with idle deadlines

mod chunk;
mod relay;
mod timing;

pub use chunk::split_chunks;
pub use relay::{relay, RELAY_BUFFER_SIZE};
pub use timing::TimingJitter;

use thiserror::Error;

/// Tunnel layer errors
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("invalid port {0:?} in request target")]
    BadPort(String),

    #[error("upstream dial failed: {0}")]
    Dial(std::io::Error),

    #[error("could not send 200 response: {0}")]
    HandshakeWrite(std::io::Error),

    #[error("client hello: {0}")]
    Record(#[from] crate::tls::RecordError),

    #[error("first record is not a client hello")]
    NotClientHello,

    #[error("relay error: {0}")]
    Relay(#[from] std::io::Error),
}
