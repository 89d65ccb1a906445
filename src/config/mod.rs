//! Configuration management
//!
//! A [`Config`] is assembled from an optional TOML file plus CLI overrides,
//! then compiled by [`Config::tunnel`] into the immutable [`TunnelConfig`]
//! every tunnel shares. Validation happens at compile time of the record;
//! nothing downstream ever re-checks it.

use crate::tunnel::TimingJitter;
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid allowed pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("timing delay min {min}ms exceeds max {max}ms")]
    InvalidTiming { min: u16, max: u16 },
}

/// Proxy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address
    pub addr: String,
    /// Listen port
    pub port: u16,
    /// DNS server used to resolve proxied targets
    pub dns_addr: String,
    /// DNS server port (plain UDP mode)
    pub dns_port: u16,
    /// Resolve only IPv4 addresses
    pub dns_ipv4_only: bool,
    /// Resolve through DNS-over-HTTPS instead of plain UDP
    pub enable_doh: bool,
    /// Idle read deadline per relay read, in milliseconds; 0 disables it
    pub timeout_ms: u64,
    /// Fragment size in bytes; 0 selects the legacy 1-byte-first split
    pub window_size: usize,
    /// Only evade DPI for hostnames matching one of these regexes;
    /// empty means evade every host
    pub allowed_patterns: Vec<String>,
    /// Master switch for ClientHello fragmentation
    pub exploit: bool,
    /// Inter-chunk delay randomization
    pub timing: TimingConfig,
    /// Suppress the startup banner
    pub silent: bool,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1".to_string(),
            port: 8080,
            dns_addr: "8.8.8.8".to_string(),
            dns_port: 53,
            dns_ipv4_only: false,
            enable_doh: false,
            timeout_ms: 0,
            window_size: 0,
            allowed_patterns: Vec::new(),
            exploit: true,
            timing: TimingConfig::default(),
            silent: false,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        Ok(std::fs::write(path, content)?)
    }

    /// Compile the tunnel-facing part of the configuration, validating it.
    ///
    /// Rejects invalid regexes and inverted timing ranges; unsigned fields
    /// make the negative-value cases unrepresentable.
    pub fn tunnel(&self) -> Result<TunnelConfig, ConfigError> {
        let timing = self.timing.jitter()?;

        let allowed_patterns = if self.allowed_patterns.is_empty() {
            None
        } else {
            Some(RegexSet::new(&self.allowed_patterns)?)
        };

        Ok(TunnelConfig {
            timeout_ms: self.timeout_ms,
            window_size: self.window_size,
            allowed_patterns,
            exploit: self.exploit,
            timing,
        })
    }
}

/// Inter-chunk delay settings as they appear in config files and flags
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Enable randomized inter-chunk delays
    pub enabled: bool,
    /// Minimum delay in milliseconds
    pub min_ms: u16,
    /// Maximum delay in milliseconds
    pub max_ms: u16,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_ms: 0,
            max_ms: 0,
        }
    }
}

impl TimingConfig {
    fn jitter(&self) -> Result<TimingJitter, ConfigError> {
        if !self.enabled {
            return Ok(TimingJitter::Off);
        }
        if self.min_ms > self.max_ms {
            return Err(ConfigError::InvalidTiming {
                min: self.min_ms,
                max: self.max_ms,
            });
        }
        Ok(TimingJitter::Uniform {
            min_ms: self.min_ms,
            max_ms: self.max_ms,
        })
    }
}

/// Named delay ranges selectable from the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingPreset {
    Short,
    Medium,
    Long,
}

impl TimingPreset {
    /// Parse a preset name; unknown names yield `None` so the caller can
    /// warn and fall back
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "short" => Some(Self::Short),
            "medium" => Some(Self::Medium),
            "long" => Some(Self::Long),
            _ => None,
        }
    }

    /// The `(min_ms, max_ms)` range of this preset
    pub fn range(self) -> (u16, u16) {
        match self {
            Self::Short => (5, 25),
            Self::Medium => (25, 50),
            Self::Long => (50, 100),
        }
    }
}

/// The immutable per-tunnel configuration record shared by every handler
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Idle read deadline per relay read, in milliseconds; 0 disables it
    pub timeout_ms: u64,
    /// Fragment size in bytes; 0 selects the legacy 1-byte-first split
    pub window_size: usize,
    /// Compiled hostname patterns; `None` evades every host
    pub allowed_patterns: Option<RegexSet>,
    /// Master switch for ClientHello fragmentation
    pub exploit: bool,
    /// Inter-chunk delay policy
    pub timing: TimingJitter,
}

impl TunnelConfig {
    /// Whether the fragmented write path applies to `domain`.
    ///
    /// Evasion requires the master switch, and either no pattern list or at
    /// least one pattern matching the full hostname.
    pub fn should_evade(&self, domain: &str) -> bool {
        self.exploit
            && self
                .allowed_patterns
                .as_ref()
                .map_or(true, |patterns| patterns.is_match(domain))
    }
}
