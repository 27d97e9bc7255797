use std::net::SocketAddr;
use std::path::Path;

use url::{Host, Url};

use crate::config::ScanOptions;
use crate::error::ScanError;

const SCRIPTS: &str = "ssh-hostkey,ssh-auth-methods,banner";

/// Render the shell command for one scan.
///
/// nmap writes XML to stdout and `xq` turns it into JSON. With
/// `opts.use_proxy` the whole run goes through proxychains using
/// `chain_config`. Inputs are embedded as-is; run [`validate`] first.
pub fn compose(host: &str, opts: &ScanOptions, chain_config: &Path) -> String {
    let scan = format!(
        "nmap -sT -PN -n -sV --open -oX - --top-ports {} --version-intensity 4 \
         --script {SCRIPTS} --script-args http.useragent=\"{}\",ssh_hostkey=sha256,md5 {} | xq",
        opts.top_ports, opts.user_agent, host
    );
    if opts.use_proxy {
        format!("proxychains4 -f {} {scan}", chain_config.display())
    } else {
        scan
    }
}

/// Reduce a URL or `host:port` to the bare host part nmap expects.
///
/// `https://www.example.org/login` becomes `www.example.org` and
/// `https://[2001:db8::1]:443/` becomes `2001:db8::1`. Plain names and
/// IP literals pass through. Anything unparsable is returned trimmed and
/// left for [`validate_host`] to reject.
pub fn target_host(input: &str) -> String {
    let s = input.trim();
    if s.contains("://") {
        return match Url::parse(s).ok().as_ref().and_then(Url::host) {
            Some(Host::Domain(d)) => d.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => s.to_string(),
        };
    }
    if let Ok(sa) = s.parse::<SocketAddr>() {
        return sa.ip().to_string();
    }
    match s.split_once(':') {
        Some((host, port)) if !port.contains(':') => host.to_string(),
        _ => s.to_string(),
    }
}

/// Check a target and its options are safe to splice into a shell line.
pub fn validate(host: &str, opts: &ScanOptions) -> Result<(), ScanError> {
    validate_host(host)?;
    validate_user_agent(&opts.user_agent)?;
    if opts.top_ports == 0 {
        return Err(ScanError::InvalidInput("top_ports must be at least 1".into()));
    }
    Ok(())
}

/// Hostnames, IPv4 and IPv6 literals only.
pub fn validate_host(host: &str) -> Result<(), ScanError> {
    if host.is_empty() || host.len() > 253 {
        return Err(ScanError::InvalidInput(format!(
            "host must be 1-253 characters, got {}",
            host.len()
        )));
    }
    if host.starts_with('-') {
        return Err(ScanError::InvalidInput(format!("host may not start with '-': {host}")));
    }
    if let Some(c) = host
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':')))
    {
        return Err(ScanError::InvalidInput(format!(
            "host contains invalid character {c:?}"
        )));
    }
    Ok(())
}

pub fn validate_user_agent(ua: &str) -> Result<(), ScanError> {
    if ua.is_empty() {
        return Err(ScanError::InvalidInput("user agent must not be empty".into()));
    }
    if let Some(c) = ua
        .chars()
        .find(|c| matches!(c, '"' | '`' | '$' | '\\') || c.is_control())
    {
        return Err(ScanError::InvalidInput(format!(
            "user agent contains invalid character {c:?}"
        )));
    }
    Ok(())
}
