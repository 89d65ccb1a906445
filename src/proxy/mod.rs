//! Proxy front end
//!
//! Listens for client connections, reads the request head, resolves the
//! target, and dispatches: CONNECT goes to the DPI-evading HTTPS tunnel,
//! anything else down the plain HTTP path.

mod http;
mod https;
mod request;

pub use http::HttpHandler;
pub use https::HttpsHandler;
pub use request::{read_request, HttpRequest};

use crate::config::{Config, TunnelConfig};
use crate::dns::{DnsError, Resolver};
use crate::tunnel::TunnelError;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, debug_span, info, Instrument};

/// Proxy errors
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request head too large")]
    RequestTooLarge,

    #[error("malformed request: {0}")]
    Parse(String),

    #[error("resolve failed: {0}")]
    Dns(#[from] DnsError),

    #[error("tunnel failed: {0}")]
    Tunnel(#[from] TunnelError),
}

/// Accepting proxy server
pub struct ProxyServer {
    listener: TcpListener,
    resolver: Arc<Resolver>,
    tunnel: Arc<TunnelConfig>,
}

impl ProxyServer {
    /// Bind the listener and compile the shared per-tunnel configuration
    pub async fn bind(config: &Config) -> crate::Result<Self> {
        let listener = TcpListener::bind((config.addr.as_str(), config.port))
            .await
            .map_err(crate::Error::Io)?;
        let resolver = Arc::new(Resolver::from_config(config)?);
        let tunnel = Arc::new(config.tunnel()?);

        info!("listening on {}", listener.local_addr().map_err(crate::Error::Io)?);

        Ok(Self {
            listener,
            resolver,
            tunnel,
        })
    }

    /// The bound listen address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept and serve connections until the process exits.
    ///
    /// Each connection runs as its own task; a failed tunnel only ever logs
    /// at debug and closes its sockets.
    pub async fn run(&self) -> crate::Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await.map_err(crate::Error::Io)?;
            let resolver = Arc::clone(&self.resolver);
            let tunnel = Arc::clone(&self.tunnel);

            tokio::spawn(async move {
                if let Err(err) = handle_connection(stream, peer, resolver, tunnel).await {
                    debug!("connection from {} closed: {}", peer, err);
                }
            });
        }
    }
}

async fn handle_connection(
    mut client: TcpStream,
    peer: SocketAddr,
    resolver: Arc<Resolver>,
    tunnel: Arc<TunnelConfig>,
) -> Result<(), ProxyError> {
    client.set_nodelay(true).ok();

    let request = request::read_request(&mut client).await?;
    let span = debug_span!("conn", %peer, domain = %request.domain());

    async move {
        let ip = resolver.resolve(request.domain()).await?;

        if request.is_connect() {
            HttpsHandler::new(tunnel).serve(client, &request, ip).await?;
        } else {
            HttpHandler::new(tunnel.timeout_ms)
                .serve(client, &request, ip)
                .await?;
        }
        Ok(())
    }
    .instrument(span)
    .await
}
