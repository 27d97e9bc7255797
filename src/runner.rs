use std::process::{Command, Stdio};

use tracing::debug;

use crate::error::ScanError;

/// Run a shell command line to completion and return its stdout.
///
/// Blocks the calling thread. A non-zero exit is an error carrying the
/// command's stderr so the tool's own diagnostics reach the caller.
pub fn run_command(command_line: &str) -> Result<String, ScanError> {
    debug!(command = command_line, "running");
    let output = Command::new("sh")
        .arg("-c")
        .arg(command_line)
        .stdin(Stdio::null())
        .output()?;

    if !output.status.success() {
        return Err(ScanError::CommandFailed {
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout() {
        let out = run_command("printf 'hello\\nworld'").unwrap();
        assert_eq!(out, "hello\nworld");
    }

    #[test]
    fn non_zero_exit_surfaces_stderr() {
        let err = run_command("echo 'no route to host' >&2; exit 3").unwrap_err();
        match err {
            ScanError::CommandFailed { status, stderr } => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "no route to host");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
