//! HTTP request head reading and parsing

use super::ProxyError;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Upper bound on a request head; anything larger is rejected
const MAX_HEAD_SIZE: usize = 8192;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// One parsed HTTP request head.
///
/// Holds on to the raw bytes as read, so the plain-HTTP path can replay the
/// request upstream verbatim.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: String,
    version: String,
    domain: String,
    port: String,
    raw: Bytes,
}

impl HttpRequest {
    /// Request method, e.g. `CONNECT`
    pub fn method(&self) -> &str {
        &self.method
    }

    /// HTTP version token, e.g. `HTTP/1.1`, echoed in the tunnel response
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Target hostname from the request line (CONNECT) or Host header
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Target port as written by the client; empty means scheme default
    pub fn port(&self) -> &str {
        &self.port
    }

    /// The request head bytes exactly as read off the socket
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn is_connect(&self) -> bool {
        self.method == "CONNECT"
    }
}

/// Read one request head off the socket (through the blank line) and parse
/// it.
///
/// A well-behaved CONNECT client sends nothing further until it has seen
/// the 200 response, so reading in buffer-sized gulps cannot swallow the
/// ClientHello that follows.
pub async fn read_request<R>(stream: &mut R) -> Result<HttpRequest, ProxyError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);

    loop {
        let n = stream.read_buf(&mut buf).await?;
        if n == 0 {
            return Err(ProxyError::Parse(
                "connection closed before request head".to_string(),
            ));
        }
        if buf
            .windows(HEAD_TERMINATOR.len())
            .any(|w| w == HEAD_TERMINATOR)
        {
            break;
        }
        if buf.len() >= MAX_HEAD_SIZE {
            return Err(ProxyError::RequestTooLarge);
        }
    }

    parse_request(buf.freeze())
}

fn parse_request(raw: Bytes) -> Result<HttpRequest, ProxyError> {
    let mut headers = [httparse::EMPTY_HEADER; 64];
    let mut parsed = httparse::Request::new(&mut headers);

    let status = parsed
        .parse(&raw)
        .map_err(|err| ProxyError::Parse(err.to_string()))?;
    if status.is_partial() {
        return Err(ProxyError::Parse("incomplete request head".to_string()));
    }

    let method = parsed
        .method
        .ok_or_else(|| ProxyError::Parse("missing method".to_string()))?
        .to_string();
    let path = parsed
        .path
        .ok_or_else(|| ProxyError::Parse("missing request target".to_string()))?;
    let version = format!("HTTP/1.{}", parsed.version.unwrap_or(1));

    let (domain, port) = if method == "CONNECT" {
        split_host_port(path)
    } else {
        let host = parsed
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case("host"))
            .map(|h| String::from_utf8_lossy(h.value).trim().to_string());
        match host {
            Some(host) => split_host_port(&host),
            None => host_from_absolute_uri(path)?,
        }
    };

    if domain.is_empty() {
        return Err(ProxyError::Parse("empty target host".to_string()));
    }

    Ok(HttpRequest {
        method,
        version,
        domain,
        port,
        raw,
    })
}

/// Split `host[:port]`, tolerating bracketed IPv6 literals
fn split_host_port(target: &str) -> (String, String) {
    if let Some(rest) = target.strip_prefix('[') {
        if let Some((host, after)) = rest.split_once(']') {
            let port = after.strip_prefix(':').unwrap_or("");
            return (host.to_string(), port.to_string());
        }
    }

    match target.rsplit_once(':') {
        // A bare IPv6 literal has colons in the host part; without brackets
        // there is no port to split off
        Some((host, port)) if !host.contains(':') => (host.to_string(), port.to_string()),
        _ => (target.to_string(), String::new()),
    }
}

/// Last-resort target extraction from an absolute-form request line
fn host_from_absolute_uri(path: &str) -> Result<(String, String), ProxyError> {
    let rest = path
        .strip_prefix("http://")
        .ok_or_else(|| ProxyError::Parse("no Host header and not absolute-form".to_string()))?;
    let authority = rest.split('/').next().unwrap_or("");
    Ok(split_host_port(authority))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn parse(head: &str) -> Result<HttpRequest, ProxyError> {
        read_request(&mut head.as_bytes()).await
    }

    #[tokio::test]
    async fn parses_connect_request() {
        let request = parse("CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n")
            .await
            .unwrap();

        assert!(request.is_connect());
        assert_eq!(request.method(), "CONNECT");
        assert_eq!(request.version(), "HTTP/1.1");
        assert_eq!(request.domain(), "example.com");
        assert_eq!(request.port(), "443");
    }

    #[tokio::test]
    async fn connect_without_port_leaves_port_empty() {
        let request = parse("CONNECT example.com HTTP/1.0\r\n\r\n").await.unwrap();
        assert_eq!(request.domain(), "example.com");
        assert_eq!(request.port(), "");
        assert_eq!(request.version(), "HTTP/1.0");
    }

    #[tokio::test]
    async fn connect_with_bracketed_ipv6_literal() {
        let request = parse("CONNECT [::1]:8443 HTTP/1.1\r\n\r\n").await.unwrap();
        assert_eq!(request.domain(), "::1");
        assert_eq!(request.port(), "8443");
    }

    #[tokio::test]
    async fn plain_request_takes_target_from_host_header() {
        let request = parse("GET /index.html HTTP/1.1\r\nHost: example.org:8080\r\n\r\n")
            .await
            .unwrap();

        assert!(!request.is_connect());
        assert_eq!(request.domain(), "example.org");
        assert_eq!(request.port(), "8080");
    }

    #[tokio::test]
    async fn absolute_form_without_host_header() {
        let request = parse("GET http://example.net/path HTTP/1.1\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(request.domain(), "example.net");
        assert_eq!(request.port(), "");
    }

    #[tokio::test]
    async fn raw_head_is_preserved_verbatim() {
        let head = "GET / HTTP/1.1\r\nHost: example.com\r\nX-Extra: 1\r\n\r\n";
        let request = parse(head).await.unwrap();
        assert_eq!(request.raw().as_ref(), head.as_bytes());
    }

    #[tokio::test]
    async fn oversized_head_is_rejected() {
        let mut head = String::from("GET / HTTP/1.1\r\nHost: example.com\r\n");
        head.push_str(&"X-Pad: y\r\n".repeat(2000));
        head.push_str("\r\n");

        assert!(matches!(
            parse(&head).await,
            Err(ProxyError::RequestTooLarge)
        ));
    }

    #[tokio::test]
    async fn truncated_head_is_rejected() {
        assert!(matches!(
            parse("CONNECT example.com:443 HTTP/1.1\r\n").await,
            Err(ProxyError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn missing_host_everywhere_is_rejected() {
        assert!(matches!(
            parse("GET /relative HTTP/1.1\r\n\r\n").await,
            Err(ProxyError::Parse(_))
        ));
    }
}
