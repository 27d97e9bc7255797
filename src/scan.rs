use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::command::{compose, validate};
use crate::config::{ProxyConfig, ScanOptions};
use crate::error::ScanError;
use crate::normalize::normalize;
use crate::runner::run_command;
use crate::tree::parse_tree;
use crate::types::ScanReport;

/// Scan one host and return the normalized report.
///
/// Assumes [`crate::preflight::run_preflight`] already passed.
pub fn scan_host(host: &str, opts: &ScanOptions, proxy: &ProxyConfig) -> Result<ScanReport> {
    scan_host_with(host, opts, proxy, run_command)
}

/// Same as [`scan_host`] with the command runner supplied by the caller.
pub fn scan_host_with<F>(
    host: &str,
    opts: &ScanOptions,
    proxy: &ProxyConfig,
    runner: F,
) -> Result<ScanReport>
where
    F: FnOnce(&str) -> Result<String, ScanError>,
{
    validate(host, opts)?;
    let command = compose(host, opts, &proxy.chain_config);
    info!(host, "commencing portscan");
    debug!(command = %command, "composed scan command");

    let raw = runner(&command).with_context(|| format!("scan of {host} failed"))?;
    let tree = parse_tree(&raw).context("reading scan output")?;
    let report = normalize(&tree).context("normalizing scan output")?;

    info!(
        host,
        state = %report.host_state,
        open_ports = report.ports.len(),
        elapsed_s = report.elapsed_seconds,
        "scan finished"
    );
    Ok(report)
}
