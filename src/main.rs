use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use torscan_rs::command::target_host;
use torscan_rs::config::{ProxyConfig, ScanOptions};
use torscan_rs::error::PreflightError;
use torscan_rs::types::ScanReport;
use torscan_rs::{preflight, scan, server};

/// torscan-rs — nmap through a SOCKS proxy chain, reduced to a compact port report.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "torscan-rs",
    version,
    about = "Scan a host through a SOCKS proxy chain and report open ports, fingerprints and SSH auth methods.",
    long_about = None
)]
struct Cli {
    /// Target host name or IP. URLs are reduced to their host part.
    #[arg(required_unless_present = "serve")]
    host: Option<String>,

    /// Probe nmap's N most common ports.
    #[arg(long = "top-ports", default_value_t = 10)]
    top_ports: u16,

    /// User agent for HTTP probes.
    #[arg(long = "user-agent", default_value = "Mozilla")]
    user_agent: String,

    /// Scan directly instead of through proxychains.
    #[arg(long = "no-proxy", default_value_t = false)]
    no_proxy: bool,

    /// SOCKS proxy host (overrides SOCKS_HOST).
    #[arg(long = "socks-host")]
    socks_host: Option<String>,

    /// SOCKS proxy port (overrides SOCKS_PORT).
    #[arg(long = "socks-port")]
    socks_port: Option<u16>,

    /// proxychains configuration file.
    #[arg(long = "chain-config", default_value = "proxychains.conf")]
    chain_config: PathBuf,

    /// Proxy preflight connect timeout in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 3000)]
    timeout_ms: u64,

    /// Write the report as pretty JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Print the report as JSON instead of a table.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Serve the scan API on this address (e.g. 127.0.0.1:8080) instead of scanning once.
    #[arg(long)]
    serve: Option<String>,

    /// More logging (-v info, -vv debug, -vvv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn proxy_config(&self) -> Result<ProxyConfig> {
        let mut cfg = ProxyConfig::from_env()?;
        if let Some(h) = &self.socks_host {
            cfg.addr = h.clone();
        }
        if let Some(p) = self.socks_port {
            cfg.port = p;
        }
        cfg.chain_config = self.chain_config.clone();
        cfg.connect_timeout = Duration::from_millis(self.timeout_ms);
        Ok(cfg)
    }

    fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            top_ports: self.top_ports,
            user_agent: self.user_agent.clone(),
            use_proxy: !self.no_proxy,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        if let Some(check) = e.downcast_ref::<PreflightError>() {
            error!(check = %check, "preflight failed, aborting");
            std::process::exit(1);
        }
        error!("{e:#}");
        std::process::exit(2);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let proxy = cli.proxy_config()?;
    let opts = cli.scan_options();
    info!(
        proxy = %proxy.socks_url(),
        chain_config = %proxy.chain_config.display(),
        use_proxy = opts.use_proxy,
        "configuration loaded"
    );

    preflight::run_preflight(&proxy, &opts)?;

    if let Some(bind) = cli.serve.as_deref() {
        let shutdown = CancellationToken::new();
        let on_signal = shutdown.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            on_signal.cancel();
        });
        println!("Serving scan API on http://{bind} (Ctrl+C to stop)");
        return server::spawn_server(bind, proxy, shutdown).await;
    }

    let raw = cli.host.as_deref().context("a target host is required")?;
    let host = target_host(raw);
    let report = {
        let opts = opts.clone();
        tokio::task::spawn_blocking(move || scan::scan_host(&host, &opts, &proxy))
            .await
            .context("scan task failed")??
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    if let Some(path) = cli.output.as_deref() {
        write_report_json(path, &report)
            .with_context(|| format!("failed to write JSON to {}", path.display()))?;
        println!("Wrote JSON report to {}", path.display());
    }
    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

fn print_report(report: &ScanReport) {
    println!("\nHost: {}  (elapsed {}s)", report.host_state, report.elapsed_seconds);
    println!("Args: {}", report.invocation_args);
    if report.ports.is_empty() {
        println!("No open ports.");
        return;
    }

    let port_w = report.ports.iter().map(|p| p.port.len()).max().unwrap_or(0).max("port".len());
    let name_w = report
        .ports
        .iter()
        .map(|p| p.name.as_deref().map_or(1, str::len))
        .max()
        .unwrap_or(0)
        .max("service".len());

    println!("\n{:>port_w$}  {:<name_w$}  {}", "port", "service", "product/version");
    println!("{:->port_w$}  {:-<name_w$}  {:-<15}", "", "", "");
    for p in &report.ports {
        let product = match (&p.product, &p.version) {
            (Some(prod), Some(ver)) => format!("{prod} {ver}"),
            (Some(prod), None) => prod.clone(),
            (None, Some(ver)) => ver.clone(),
            (None, None) => "-".to_string(),
        };
        println!(
            "{:>port_w$}  {:<name_w$}  {}",
            p.port,
            p.name.as_deref().unwrap_or("-"),
            product
        );
        if let Some(banner) = &p.banner {
            let mut b = banner.replace('\n', "\\n");
            if b.len() > 60 {
                let cut = (0..=60).rev().find(|&i| b.is_char_boundary(i)).unwrap_or(0);
                b.truncate(cut);
            }
            println!("{:port_w$}  banner: {b}", "");
        }
        for line in &p.hostprints {
            println!("{:port_w$}  hostkey: {line}", "");
        }
        if !p.shell_auth_methods.is_empty() {
            let methods: Vec<&str> = p.shell_auth_methods.iter().map(|m| m.token()).collect();
            println!("{:port_w$}  auth: {}", "", methods.join(", "));
        }
    }
}

fn write_report_json(path: &std::path::Path, report: &ScanReport) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}
