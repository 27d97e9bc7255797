use std::env;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::{ProxyConfig, ScanOptions};
use crate::error::PreflightError;

/// Connect to the proxy and hang up straight away.
///
/// Tries every address the name resolves to; the first successful connect
/// passes.
pub fn ensure_reachable(addr: &str, port: u16, timeout: Duration) -> Result<(), PreflightError> {
    let unreachable = |source: std::io::Error| PreflightError::ProxyUnreachable {
        addr: addr.to_string(),
        port,
        source,
    };
    let candidates: Vec<SocketAddr> = (addr, port).to_socket_addrs().map_err(unreachable)?.collect();

    let mut last_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved");
    for sa in candidates {
        match TcpStream::connect_timeout(&sa, timeout) {
            Ok(stream) => {
                drop(stream);
                debug!(%sa, "proxy reachable");
                return Ok(());
            }
            Err(e) => last_err = e,
        }
    }
    Err(unreachable(last_err))
}

/// Every name must resolve to a file somewhere on `PATH`.
pub fn ensure_executables<S: AsRef<str>>(names: &[S]) -> Result<(), PreflightError> {
    let path = env::var_os("PATH").unwrap_or_default();
    for name in names {
        let name = name.as_ref();
        let found = env::split_paths(&path).any(|dir| dir.join(name).is_file());
        if !found {
            return Err(PreflightError::MissingExecutable(name.to_string()));
        }
    }
    Ok(())
}

/// Make sure the proxychains config routes through our SOCKS4 proxy.
///
/// The file must already exist. If it mentions `socks4` it is left alone,
/// otherwise a `socks4 <ip> <port>` line is appended. Returns whether the
/// file was modified.
pub fn ensure_chain_config(path: &Path, addr: &str, port: u16) -> Result<bool, PreflightError> {
    if !path.is_file() {
        return Err(PreflightError::MissingFile(path.to_path_buf()));
    }
    let chain_err = |source: std::io::Error| PreflightError::ChainConfig {
        path: path.to_path_buf(),
        source,
    };
    let contents = fs::read_to_string(path).map_err(chain_err)?;
    if contents.contains("socks4") {
        debug!(path = %path.display(), "socks4 already configured");
        return Ok(false);
    }

    let ip = resolve_ipv4(addr)?;
    let mut file = OpenOptions::new().append(true).open(path).map_err(chain_err)?;
    let sep = if contents.is_empty() || contents.ends_with('\n') { "" } else { "\n" };
    writeln!(file, "{sep}socks4 {ip} {port}").map_err(chain_err)?;
    info!(path = %path.display(), %ip, port, "added socks4 proxy to chain config");
    Ok(true)
}

/// proxychains' socks4 entries take a literal IPv4 address, so names are
/// resolved up front.
fn resolve_ipv4(addr: &str) -> Result<Ipv4Addr, PreflightError> {
    if let Ok(ip) = addr.parse::<Ipv4Addr>() {
        return Ok(ip);
    }
    (addr, 0)
        .to_socket_addrs()
        .ok()
        .and_then(|mut it| {
            it.find_map(|sa| match sa {
                SocketAddr::V4(v4) => Some(*v4.ip()),
                SocketAddr::V6(_) => None,
            })
        })
        .ok_or_else(|| PreflightError::Unresolvable(addr.to_string()))
}

/// Proxy socket first, then the chain config. The config is only written
/// once the proxy has answered.
pub fn ensure_proxy(proxy: &ProxyConfig) -> Result<(), PreflightError> {
    ensure_reachable(&proxy.addr, proxy.port, proxy.connect_timeout)?;
    ensure_chain_config(&proxy.chain_config, &proxy.addr, proxy.port)?;
    Ok(())
}

/// All start-up checks, in order: executables, proxy socket, chain config.
pub fn run_preflight(proxy: &ProxyConfig, opts: &ScanOptions) -> Result<(), PreflightError> {
    let mut tools = vec!["nmap", "xq"];
    if opts.use_proxy {
        tools.push("proxychains4");
    }
    ensure_executables(&tools[..])?;

    if opts.use_proxy {
        ensure_proxy(proxy)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn reachable_when_listening() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        ensure_reachable("127.0.0.1", port, Duration::from_millis(500)).unwrap();
    }

    #[test]
    fn unreachable_is_reported_with_endpoint() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let l = TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let err = ensure_reachable("127.0.0.1", port, Duration::from_millis(500)).unwrap_err();
        assert!(matches!(err, PreflightError::ProxyUnreachable { port: p, .. } if p == port));
        assert!(err.to_string().contains(&format!("127.0.0.1:{port}")));
    }

    #[test]
    fn missing_executable() {
        let err = ensure_executables(&["definitely-not-a-real-tool-4f2a"]).unwrap_err();
        assert!(matches!(err, PreflightError::MissingExecutable(n) if n == "definitely-not-a-real-tool-4f2a"));
    }

    #[test]
    fn literal_ip_is_not_resolved() {
        assert_eq!(resolve_ipv4("10.1.2.3").unwrap(), Ipv4Addr::new(10, 1, 2, 3));
    }

    #[test]
    fn ipv6_literal_is_not_a_socks4_address() {
        assert!(matches!(resolve_ipv4("::1"), Err(PreflightError::Unresolvable(a)) if a == "::1"));
    }
}
