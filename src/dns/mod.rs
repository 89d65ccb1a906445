//! DNS resolution for proxied targets
//!
//! The proxy never hands hostnames to the operating system resolver: a
//! censored network frequently poisons or logs system DNS. Lookups go
//! directly to a configured server, either as plain UDP queries or as
//! DNS-over-HTTPS (RFC 8484 wire-format POST), using a hand-built packet
//! codec in both modes.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::debug;

/// UDP response buffer; plain DNS answers fit in 512 bytes unless EDNS is
/// negotiated, which this resolver never requests
const MAX_UDP_RESPONSE: usize = 4096;

/// Per-attempt query timeout
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// UDP retransmits before giving up
const UDP_ATTEMPTS: usize = 2;

/// DNS resolution errors
#[derive(Debug, Error)]
pub enum DnsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("query timed out")]
    Timeout,

    #[error("DoH transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid DNS server address: {0}")]
    InvalidServer(String),

    #[error("server answered with RCODE {0}")]
    Rcode(u8),

    #[error("no usable records for {0}")]
    NoRecords(String),

    #[error("malformed response: {0}")]
    Malformed(&'static str),
}

/// DNS query types the resolver issues
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    A = 1,
    Aaaa = 28,
}

enum Backend {
    /// Plain DNS over UDP
    Udp(SocketAddr),
    /// DNS-over-HTTPS, wire format POSTed to the query endpoint
    Doh {
        url: String,
        client: reqwest::Client,
    },
}

/// Hostname resolver for proxied targets
pub struct Resolver {
    backend: Backend,
    ipv4_only: bool,
}

impl Resolver {
    /// Build the resolver described by the proxy configuration
    pub fn from_config(config: &crate::Config) -> Result<Self, DnsError> {
        let backend = if config.enable_doh {
            Backend::Doh {
                url: format!("https://{}/dns-query", config.dns_addr),
                client: reqwest::Client::builder()
                    .timeout(QUERY_TIMEOUT)
                    .build()?,
            }
        } else {
            let ip: IpAddr = config
                .dns_addr
                .parse()
                .map_err(|_| DnsError::InvalidServer(config.dns_addr.clone()))?;
            Backend::Udp(SocketAddr::new(ip, config.dns_port))
        };

        Ok(Self {
            backend,
            ipv4_only: config.dns_ipv4_only,
        })
    }

    /// Resolve `host` to a single address.
    ///
    /// Literal IP addresses short-circuit without a query. A records are
    /// preferred; AAAA is consulted only when IPv4-only mode is off and the
    /// server had no A record for the name.
    pub async fn resolve(&self, host: &str) -> Result<IpAddr, DnsError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }

        match self.lookup(host, QueryType::A).await {
            Ok(ip) => Ok(ip),
            Err(DnsError::NoRecords(_)) if !self.ipv4_only => {
                self.lookup(host, QueryType::Aaaa).await
            }
            Err(err) => Err(err),
        }
    }

    async fn lookup(&self, host: &str, qtype: QueryType) -> Result<IpAddr, DnsError> {
        let tx_id: u16 = rand::random();
        let query = build_query(tx_id, host, qtype);

        let response = match &self.backend {
            Backend::Udp(server) => self.exchange_udp(*server, &query).await?,
            Backend::Doh { url, client } => {
                let response = client
                    .post(url)
                    .header("content-type", "application/dns-message")
                    .header("accept", "application/dns-message")
                    .body(query)
                    .send()
                    .await?
                    .error_for_status()?;
                response.bytes().await?.to_vec()
            }
        };

        let addrs = parse_answer(&response, tx_id, qtype)?;
        debug!("resolved {} to {:?}", host, addrs);
        addrs
            .into_iter()
            .next()
            .ok_or_else(|| DnsError::NoRecords(host.to_string()))
    }

    async fn exchange_udp(&self, server: SocketAddr, query: &[u8]) -> Result<Vec<u8>, DnsError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(server).await?;

        let mut buf = [0u8; MAX_UDP_RESPONSE];
        for _ in 0..UDP_ATTEMPTS {
            socket.send(query).await?;
            match timeout(QUERY_TIMEOUT, socket.recv(&mut buf)).await {
                Ok(received) => return Ok(buf[..received?].to_vec()),
                Err(_) => continue,
            }
        }
        Err(DnsError::Timeout)
    }
}

/// Build a DNS query packet for `qname`
fn build_query(tx_id: u16, qname: &str, qtype: QueryType) -> Vec<u8> {
    let mut packet = Vec::with_capacity(512);

    packet.extend_from_slice(&tx_id.to_be_bytes());
    // Flags: standard query, recursion desired
    packet.extend_from_slice(&[0x01, 0x00]);
    // Question count: 1
    packet.extend_from_slice(&[0x00, 0x01]);
    // Answer, authority, additional counts: 0
    packet.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);

    for label in qname.split('.') {
        packet.push(label.len() as u8);
        packet.extend_from_slice(label.as_bytes());
    }
    packet.push(0); // Root label

    packet.extend_from_slice(&(qtype as u16).to_be_bytes());
    // Query class: IN
    packet.extend_from_slice(&[0x00, 0x01]);

    packet
}

/// Parse a DNS response, extracting every address record of `qtype`
fn parse_answer(packet: &[u8], tx_id: u16, qtype: QueryType) -> Result<Vec<IpAddr>, DnsError> {
    if packet.len() < 12 {
        return Err(DnsError::Malformed("response too short"));
    }

    if u16::from_be_bytes([packet[0], packet[1]]) != tx_id {
        return Err(DnsError::Malformed("transaction id mismatch"));
    }

    // RCODE is the lower 4 bits of flag byte 3
    let rcode = packet[3] & 0x0F;
    if rcode != 0 {
        return Err(DnsError::Rcode(rcode));
    }

    let ancount = u16::from_be_bytes([packet[4], packet[5]]) as usize;

    // Skip the question section
    let mut pos = 12;
    while pos < packet.len() && packet[pos] != 0 {
        let len = packet[pos] as usize;
        if len >= 0xC0 {
            pos += 2;
            break;
        }
        pos += len + 1;
    }
    if pos < packet.len() && packet[pos] == 0 {
        pos += 1;
    }
    pos += 4; // QTYPE and QCLASS

    let mut addrs = Vec::new();
    for _ in 0..ancount {
        // Skip the record name, which may be a compression pointer
        while pos < packet.len() {
            let b = packet[pos];
            if b == 0 {
                pos += 1;
                break;
            } else if b >= 0xC0 {
                pos += 2;
                break;
            } else {
                pos += (b as usize) + 1;
            }
        }

        if pos + 10 > packet.len() {
            return Err(DnsError::Malformed("truncated answer record"));
        }

        let rtype = u16::from_be_bytes([packet[pos], packet[pos + 1]]);
        pos += 8; // type, class, TTL
        let rdlength = u16::from_be_bytes([packet[pos], packet[pos + 1]]) as usize;
        pos += 2;

        if pos + rdlength > packet.len() {
            return Err(DnsError::Malformed("record data past end of packet"));
        }

        if rtype == qtype as u16 {
            match (qtype, rdlength) {
                (QueryType::A, 4) => {
                    let octets: [u8; 4] = packet[pos..pos + 4].try_into().unwrap();
                    addrs.push(IpAddr::from(octets));
                }
                (QueryType::Aaaa, 16) => {
                    let octets: [u8; 16] = packet[pos..pos + 16].try_into().unwrap();
                    addrs.push(IpAddr::from(octets));
                }
                _ => return Err(DnsError::Malformed("address record with bad length")),
            }
        }

        pos += rdlength;
    }

    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    /// Hand-assemble a response to `build_query` output with the given
    /// answer records
    fn response_for(query: &[u8], rcode: u8, answers: &[(&[u8], u16)]) -> Vec<u8> {
        let mut packet = Vec::new();
        packet.extend_from_slice(&query[..2]); // echo transaction id
        packet.extend_from_slice(&[0x81, 0x80 | rcode]); // response, RD+RA
        packet.extend_from_slice(&[0x00, 0x01]); // one question
        packet.extend_from_slice(&(answers.len() as u16).to_be_bytes());
        packet.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        packet.extend_from_slice(&query[12..]); // echo question section

        for (rdata, rtype) in answers {
            packet.extend_from_slice(&[0xC0, 0x0C]); // name: pointer to question
            packet.extend_from_slice(&rtype.to_be_bytes());
            packet.extend_from_slice(&[0x00, 0x01]); // class IN
            packet.extend_from_slice(&[0x00, 0x00, 0x0E, 0x10]); // TTL 3600
            packet.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
            packet.extend_from_slice(rdata);
        }
        packet
    }

    #[test]
    fn query_layout_is_well_formed() {
        let query = build_query(0xABCD, "example.com", QueryType::A);

        assert_eq!(&query[..2], &[0xAB, 0xCD]);
        assert_eq!(&query[2..4], &[0x01, 0x00]); // recursion desired
        assert_eq!(&query[4..6], &[0x00, 0x01]); // one question

        // QNAME: 7"example" 3"com" 0
        let qname_start = 12;
        assert_eq!(query[qname_start], 7);
        assert_eq!(&query[qname_start + 1..qname_start + 8], b"example");
        assert_eq!(query[qname_start + 8], 3);
        assert_eq!(&query[qname_start + 9..qname_start + 12], b"com");
        assert_eq!(query[qname_start + 12], 0);

        // QTYPE A, QCLASS IN
        assert_eq!(&query[query.len() - 4..], &[0x00, 0x01, 0x00, 0x01]);
    }

    #[test]
    fn parses_a_record() {
        let query = build_query(7, "example.com", QueryType::A);
        let response = response_for(&query, 0, &[(&[93, 184, 216, 34], 1)]);

        let addrs = parse_answer(&response, 7, QueryType::A).unwrap();
        assert_eq!(addrs, vec![IpAddr::from(Ipv4Addr::new(93, 184, 216, 34))]);
    }

    #[test]
    fn parses_aaaa_record() {
        let query = build_query(9, "example.com", QueryType::Aaaa);
        let mut rdata = [0u8; 16];
        rdata[15] = 1;
        let response = response_for(&query, 0, &[(&rdata, 28)]);

        let addrs = parse_answer(&response, 9, QueryType::Aaaa).unwrap();
        assert_eq!(addrs, vec!["::1".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn skips_records_of_other_types() {
        // CNAME answer ahead of the A record
        let query = build_query(3, "example.com", QueryType::A);
        let cname: &[u8] = &[3, b'w', b'w', b'w', 0xC0, 0x0C];
        let response = response_for(&query, 0, &[(cname, 5), (&[10, 0, 0, 1], 1)]);

        let addrs = parse_answer(&response, 3, QueryType::A).unwrap();
        assert_eq!(addrs, vec![IpAddr::from(Ipv4Addr::new(10, 0, 0, 1))]);
    }

    #[test]
    fn rejects_transaction_id_mismatch() {
        let query = build_query(1, "example.com", QueryType::A);
        let response = response_for(&query, 0, &[(&[10, 0, 0, 1], 1)]);

        assert!(matches!(
            parse_answer(&response, 2, QueryType::A),
            Err(DnsError::Malformed(_))
        ));
    }

    #[test]
    fn surfaces_server_rcode() {
        let query = build_query(4, "blocked.example", QueryType::A);
        let response = response_for(&query, 3, &[]); // NXDOMAIN

        assert!(matches!(
            parse_answer(&response, 4, QueryType::A),
            Err(DnsError::Rcode(3))
        ));
    }

    #[test]
    fn empty_answer_section_yields_no_addresses() {
        let query = build_query(5, "example.com", QueryType::A);
        let response = response_for(&query, 5, &[]);
        // RCODE 5 (refused) takes precedence
        assert!(matches!(
            parse_answer(&response, 5, QueryType::A),
            Err(DnsError::Rcode(5))
        ));

        let clean = response_for(&query, 0, &[]);
        assert_eq!(
            parse_answer(&clean, 5, QueryType::A).unwrap(),
            Vec::<IpAddr>::new()
        );
    }

    #[tokio::test]
    async fn literal_addresses_bypass_the_network() {
        // Unroutable server: any actual query would fail
        let resolver = Resolver {
            backend: Backend::Udp("192.0.2.1:53".parse().unwrap()),
            ipv4_only: true,
        };

        let ip = resolver.resolve("127.0.0.1").await.unwrap();
        assert_eq!(ip, IpAddr::from(Ipv4Addr::LOCALHOST));

        let ip6 = resolver.resolve("::1").await.unwrap();
        assert_eq!(ip6, "::1".parse::<IpAddr>().unwrap());
    }
}
