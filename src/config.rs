use std::env;
use std::net::ToSocketAddrs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SOCKS_PORT: u16 = 9050;
pub const DEFAULT_CHAIN_CONFIG: &str = "proxychains.conf";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(3000);

/// Where the local SOCKS proxy lives and how proxychains is pointed at it.
///
/// Built once at start-up and handed to the preflight checks and the
/// command composer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub addr: String,
    pub port: u16,
    pub chain_config: PathBuf,
    pub connect_timeout: Duration,
}

impl ProxyConfig {
    /// Read `SOCKS_HOST` / `SOCKS_PORT`.
    ///
    /// Without `SOCKS_HOST`, prefers `host.docker.internal` when that name
    /// resolves (running inside a container) and falls back to `localhost`.
    pub fn from_env() -> Result<Self> {
        let port = match env::var("SOCKS_PORT") {
            Ok(v) => v
                .trim()
                .parse::<u16>()
                .with_context(|| format!("invalid SOCKS_PORT: {v}"))?,
            Err(_) => DEFAULT_SOCKS_PORT,
        };
        let addr = env::var("SOCKS_HOST").unwrap_or_else(|_| default_socks_host());
        Ok(Self {
            addr,
            port,
            ..Self::default()
        })
    }

    /// Proxy URL for clients that speak SOCKS directly and resolve names
    /// through the proxy.
    pub fn socks_url(&self) -> String {
        format!("socks5h://{}:{}", self.addr, self.port)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            addr: "localhost".to_string(),
            port: DEFAULT_SOCKS_PORT,
            chain_config: PathBuf::from(DEFAULT_CHAIN_CONFIG),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

fn default_socks_host() -> String {
    if ("host.docker.internal", 0).to_socket_addrs().is_ok() {
        "host.docker.internal".to_string()
    } else {
        "localhost".to_string()
    }
}

/// Per-scan knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOptions {
    /// How many of nmap's most common ports to probe.
    pub top_ports: u16,
    /// User agent handed to nmap's HTTP scripts.
    pub user_agent: String,
    /// Route the scan through proxychains.
    pub use_proxy: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            top_ports: 10,
            user_agent: "Mozilla".to_string(),
            use_proxy: true,
        }
    }
}
