//! Shroud proxy binary
//!
//! Runs a local forward proxy that intercepts CONNECT tunnels and
//! fragments the TLS ClientHello so SNI-matching DPI middleboxes cannot
//! see the destination hostname in any single TCP segment.

use anyhow::{Context, Result};
use clap::Parser;
use shroud::config::{Config, TimingConfig, TimingPreset};
use shroud::proxy::ProxyServer;
use tracing::{info, warn};

/// Shroud - DPI-evading HTTP/HTTPS proxy
#[derive(Parser, Debug)]
#[command(name = "shroud")]
#[command(about = "DPI-evading HTTP/HTTPS proxy that fragments the TLS ClientHello")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,

    /// Listen address
    #[arg(long)]
    addr: Option<String>,

    /// Listen port
    #[arg(long)]
    port: Option<u16>,

    /// DNS server address
    #[arg(long)]
    dns_addr: Option<String>,

    /// DNS server port
    #[arg(long)]
    dns_port: Option<u16>,

    /// Resolve IPv4 addresses only
    #[arg(long)]
    dns_ipv4_only: bool,

    /// Resolve through DNS-over-HTTPS
    #[arg(long)]
    enable_doh: bool,

    /// Idle read deadline in milliseconds; 0 disables it
    #[arg(long)]
    timeout: Option<u64>,

    /// Chunk size in bytes for the fragmented ClientHello; when not given,
    /// the hello is sent as a 1-byte segment followed by the rest
    #[arg(long)]
    window_size: Option<usize>,

    /// Bypass DPI only for hostnames matching this regex; repeatable
    #[arg(long = "pattern", value_name = "REGEX")]
    patterns: Vec<String>,

    /// Disable ClientHello fragmentation
    #[arg(long)]
    no_exploit: bool,

    /// Randomize inter-chunk delays: short, medium or long
    #[arg(long, value_name = "PRESET", num_args = 0..=1, default_missing_value = "short")]
    random_timing: Option<String>,

    /// Do not print the startup banner
    #[arg(long)]
    silent: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => Config::load(path).context("Failed to load configuration")?,
        None => Config::default(),
    };
    apply_overrides(&mut config, &args);

    if !config.silent {
        print_banner(&config);
    }

    let server = ProxyServer::bind(&config)
        .await
        .context("Failed to start proxy")?;
    server.run().await.context("Proxy terminated")?;

    Ok(())
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(addr) = &args.addr {
        config.addr = addr.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(dns_addr) = &args.dns_addr {
        config.dns_addr = dns_addr.clone();
    }
    if let Some(dns_port) = args.dns_port {
        config.dns_port = dns_port;
    }
    if args.dns_ipv4_only {
        config.dns_ipv4_only = true;
    }
    if args.enable_doh {
        config.enable_doh = true;
    }
    if let Some(timeout) = args.timeout {
        config.timeout_ms = timeout;
    }
    if let Some(window_size) = args.window_size {
        config.window_size = window_size;
    }
    if !args.patterns.is_empty() {
        config.allowed_patterns = args.patterns.clone();
    }
    if args.no_exploit {
        config.exploit = false;
    }
    if args.silent {
        config.silent = true;
    }
    if let Some(name) = &args.random_timing {
        let preset = TimingPreset::parse(name).unwrap_or_else(|| {
            warn!("unknown timing preset '{}', using short", name);
            TimingPreset::Short
        });
        let (min_ms, max_ms) = preset.range();
        config.timing = TimingConfig {
            enabled: true,
            min_ms,
            max_ms,
        };
    }
}

fn print_banner(config: &Config) {
    info!("shroud v{}", shroud::VERSION);
    info!("listen : {}:{}", config.addr, config.port);
    if config.enable_doh {
        info!("dns    : https://{}/dns-query", config.dns_addr);
    } else {
        info!("dns    : {}:{}", config.dns_addr, config.dns_port);
    }
    if config.exploit {
        if config.window_size == 0 {
            info!("evasion: legacy split (1-byte first segment)");
        } else {
            info!("evasion: {}-byte windows", config.window_size);
        }
        if config.timing.enabled {
            info!("jitter : {}-{}ms between chunks", config.timing.min_ms, config.timing.max_ms);
        }
        if !config.allowed_patterns.is_empty() {
            info!("only   : {}", config.allowed_patterns.join(", "));
        }
    } else {
        info!("evasion: disabled");
    }
    info!("Press CTRL+C to quit");
}
