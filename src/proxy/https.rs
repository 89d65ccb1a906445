//! HTTPS CONNECT tunnel with DPI-evading ClientHello fragmentation
//!
//! The tunnel moves through a fixed sequence: confirm the CONNECT, dial
//! upstream, intercept the client's first TLS record, start both relay
//! loops, write the hello upstream fragmented (or plain, when the exploit
//! is off or the hostname misses the pattern list), then forward both
//! directions until either side closes. Any
//! error at any step closes the whole tunnel; nothing is retried, because a
//! reconnect storm is itself a censorship signal.

use super::request::HttpRequest;
use crate::config::TunnelConfig;
use crate::tls;
use crate::tunnel::{relay, split_chunks, TunnelError};
use crate::DEFAULT_HTTPS_PORT;
use bytes::Bytes;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tracing::debug;

/// DPI-evading CONNECT tunnel handler
pub struct HttpsHandler {
    config: Arc<TunnelConfig>,
}

impl HttpsHandler {
    pub fn new(config: Arc<TunnelConfig>) -> Self {
        Self { config }
    }

    /// Drive one CONNECT tunnel to completion.
    ///
    /// Sockets are closed by dropping their halves; aborting the surviving
    /// relay task on teardown drops both, so the close is idempotent and
    /// happens exactly once no matter which direction fails first.
    pub async fn serve(
        &self,
        mut client: TcpStream,
        request: &HttpRequest,
        ip: IpAddr,
    ) -> Result<(), TunnelError> {
        let port = if request.port().is_empty() {
            DEFAULT_HTTPS_PORT
        } else {
            request
                .port()
                .parse()
                .map_err(|_| TunnelError::BadPort(request.port().to_string()))?
        };

        let upstream = TcpStream::connect((ip, port))
            .await
            .map_err(TunnelError::Dial)?;
        upstream.set_nodelay(true).ok();
        debug!("connected to {} at {}:{}", request.domain(), ip, port);

        let established = format!("{} 200 Connection Established\r\n\r\n", request.version());
        client
            .write_all(established.as_bytes())
            .await
            .map_err(TunnelError::HandshakeWrite)?;

        let record = tls::read_record(&mut client).await?;
        if !record.is_client_hello() {
            return Err(TunnelError::NotClientHello);
        }
        let client_hello = record.into_raw();
        debug!("client sent hello, {} bytes", client_hello.len());

        let (client_rd, client_wr) = client.into_split();
        let (upstream_rd, mut upstream_wr) = upstream.into_split();
        let timeout_ms = self.config.timeout_ms;

        // Both forwarders start before the hello goes upstream: any
        // immediate upstream response is drained while chunks are still
        // being paced out, and the client side is serviced from the start.
        let mut downstream = tokio::spawn(relay(upstream_rd, client_wr, timeout_ms));

        // The client-to-upstream loop idles on this handoff instead of a
        // shared descriptor; it cannot write upstream until the fragmented
        // write below has finished, so chunk ordering needs no lock.
        let (handoff_tx, handoff_rx) = oneshot::channel::<OwnedWriteHalf>();
        let mut upstream_bound = tokio::spawn(async move {
            let Ok(upstream_wr) = handoff_rx.await else {
                return Ok(0);
            };
            relay(client_rd, upstream_wr, timeout_ms).await
        });

        let written = if self.config.should_evade(request.domain()) {
            debug!("writing chunked client hello to {}", request.domain());
            self.write_chunks(&mut upstream_wr, &client_hello).await
        } else {
            debug!("writing plain client hello to {}", request.domain());
            upstream_wr.write_all(&client_hello).await
        };
        if let Err(err) = written {
            downstream.abort();
            upstream_bound.abort();
            return Err(TunnelError::Relay(err));
        }

        handoff_tx.send(upstream_wr).ok();

        tokio::select! {
            _ = &mut downstream => upstream_bound.abort(),
            _ = &mut upstream_bound => downstream.abort(),
        }

        Ok(())
    }

    /// Write the ClientHello as ordered chunks, pacing every chunk after the
    /// first by the configured jitter.
    async fn write_chunks<W>(&self, upstream: &mut W, client_hello: &Bytes) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let chunks = split_chunks(client_hello, self.config.window_size);
        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 {
                self.config.timing.delay().await;
            }
            upstream.write_all(chunk).await?;
        }
        Ok(())
    }
}
