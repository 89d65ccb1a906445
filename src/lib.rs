//! # Shroud
//!
//! An anti-censorship HTTP/HTTPS forward proxy that defeats SNI-based
//! Deep Packet Inspection by fragmenting the TLS ClientHello.
//!
//! ## How it works
//!
//! DPI middleboxes identify blocked destinations by scanning the cleartext
//! SNI extension inside the first TLS record of a connection. Shroud
//! intercepts the CONNECT tunnel, reads the ClientHello off the client
//! socket, and replays it upstream split across several small TCP segments
//! (optionally with randomized inter-segment delays), so no single segment
//! contains a scannable hostname. Everything after the ClientHello is
//! forwarded untouched.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    CLI / Banner                      │
//! │              (clap args, tracing setup)              │
//! ├─────────────────────────────────────────────────────┤
//! │                    Proxy Layer                       │
//! │    (listener, CONNECT parsing, HTTP/HTTPS dispatch)  │
//! ├─────────────────────────────────────────────────────┤
//! │                   Tunnel Layer                       │
//! │     (ClientHello chunking, jitter, duplex relay)     │
//! ├─────────────────────────────────────────────────────┤
//! │                 Resolution Layer                     │
//! │             (plain UDP DNS, DNS-over-HTTPS)          │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod dns;
pub mod proxy;
pub mod tls;
pub mod tunnel;

pub use config::Config;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default upstream port for CONNECT targets without an explicit port
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// Default upstream port for plain HTTP targets without an explicit port
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("DNS error: {0}")]
    Dns(#[from] dns::DnsError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] proxy::ProxyError),

    #[error("Tunnel error: {0}")]
    Tunnel(#[from] tunnel::TunnelError),

    #[error("TLS record error: {0}")]
    Record(#[from] tls::RecordError),
}
