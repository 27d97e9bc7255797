use std::path::PathBuf;
use std::process::ExitStatus;

/// Start-up checks that failed. Any of these ends the run; nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum PreflightError {
    #[error("failed socks preflight socket check ({addr}:{port}): {source}")]
    ProxyUnreachable {
        addr: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("could not resolve proxy address {0}")]
    Unresolvable(String),
    #[error("{0} not found in PATH")]
    MissingExecutable(String),
    #[error("{} not found", .0.display())]
    MissingFile(PathBuf),
    #[error("failed to update {}: {source}", .path.display())]
    ChainConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures while running the scanner or reading back its output.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("failed to start command: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("scan command exited with {status}: {stderr}")]
    CommandFailed { status: ExitStatus, stderr: String },
    #[error("could not parse scan output: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Scanner output missing a field every successful run carries.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("missing field {0}")]
    MissingField(&'static str),
    #[error("field {field} has unexpected value {value:?}")]
    BadValue { field: &'static str, value: String },
}
