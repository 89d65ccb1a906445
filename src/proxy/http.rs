//! Plain HTTP forwarding
//!
//! Non-CONNECT requests skip TLS interception entirely: there is no
//! ClientHello to fragment on a cleartext connection. The buffered request
//! head is replayed upstream verbatim and the relay takes over.

use super::request::HttpRequest;
use crate::tunnel::{relay, TunnelError};
use crate::DEFAULT_HTTP_PORT;
use std::net::IpAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

/// Plain HTTP pass-through handler
pub struct HttpHandler {
    timeout_ms: u64,
}

impl HttpHandler {
    pub fn new(timeout_ms: u64) -> Self {
        Self { timeout_ms }
    }

    /// Forward one plain HTTP exchange and relay until either side closes
    pub async fn serve(
        &self,
        client: TcpStream,
        request: &HttpRequest,
        ip: IpAddr,
    ) -> Result<(), TunnelError> {
        let port = if request.port().is_empty() {
            DEFAULT_HTTP_PORT
        } else {
            request
                .port()
                .parse()
                .map_err(|_| TunnelError::BadPort(request.port().to_string()))?
        };

        let mut upstream = TcpStream::connect((ip, port))
            .await
            .map_err(TunnelError::Dial)?;
        upstream.set_nodelay(true).ok();
        debug!("forwarding {} {} to {}:{}", request.method(), request.domain(), ip, port);

        upstream.write_all(request.raw()).await?;

        let (client_rd, client_wr) = client.into_split();
        let (upstream_rd, upstream_wr) = upstream.into_split();

        let mut upstream_bound = tokio::spawn(relay(client_rd, upstream_wr, self.timeout_ms));
        let mut downstream = tokio::spawn(relay(upstream_rd, client_wr, self.timeout_ms));

        tokio::select! {
            _ = &mut downstream => upstream_bound.abort(),
            _ = &mut upstream_bound => downstream.abort(),
        }

        Ok(())
    }
}
