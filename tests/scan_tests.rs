use std::path::PathBuf;
use std::process::Command;

use torscan_rs::config::{ProxyConfig, ScanOptions};
use torscan_rs::error::ScanError;
use torscan_rs::scan::scan_host_with;
use torscan_rs::types::HostState;

const XQ_OUTPUT: &str = r#"{
  "nmaprun": {
    "@scanner": "nmap",
    "@args": "nmap -sT -PN -n -sV --open -oX - --top-ports 10 scanme.nmap.org",
    "host": {
      "status": { "@state": "up", "@reason": "user-set" },
      "ports": {
        "port": {
          "@protocol": "tcp",
          "@portid": "22",
          "state": { "@state": "open" },
          "service": { "@name": "ssh", "@product": "OpenSSH", "@conf": "10" },
          "script": [
            { "@id": "ssh-hostkey", "@output": "\n  1024 ac:00:a0:1a (DSA)\n  2048 20:3d:2d:44 (RSA)" },
            { "@id": "ssh-auth-methods", "@output": "publickey password" }
          ]
        }
      }
    },
    "runstats": { "finished": { "@elapsed": "5.71" } }
  }
}"#;

fn proxy() -> ProxyConfig {
    ProxyConfig {
        chain_config: PathBuf::from("/etc/proxychains/test.conf"),
        ..ProxyConfig::default()
    }
}

#[test]
fn pipeline_runs_composed_command_and_normalizes() {
    let mut seen = String::new();
    let report = scan_host_with("scanme.nmap.org", &ScanOptions::default(), &proxy(), |cmd| {
        seen = cmd.to_string();
        Ok(XQ_OUTPUT.to_string())
    })
    .unwrap();

    assert!(seen.starts_with("proxychains4 -f /etc/proxychains/test.conf nmap "));
    assert!(seen.ends_with(" scanme.nmap.org | xq"));
    assert_eq!(report.host_state, HostState::Up);
    assert_eq!(report.elapsed_seconds, 5);
    assert_eq!(report.ports.len(), 1);
    assert_eq!(report.ports[0].hostprints.len(), 2);
    assert_eq!(report.ports[0].shell_auth_methods.len(), 2);
}

#[test]
fn invalid_host_never_reaches_runner() {
    let err = scan_host_with("x.org && reboot", &ScanOptions::default(), &proxy(), |_| {
        panic!("runner must not be called")
    })
    .unwrap_err();
    assert!(matches!(err.downcast_ref::<ScanError>(), Some(ScanError::InvalidInput(_))));
}

#[cfg(unix)]
#[test]
fn runner_failure_propagates_with_stderr() {
    let status = Command::new("sh").arg("-c").arg("exit 1").status().unwrap();
    let err = scan_host_with("example.org", &ScanOptions::default(), &proxy(), |_| {
        Err(ScanError::CommandFailed {
            status,
            stderr: "proxychains: connection refused".into(),
        })
    })
    .unwrap_err();
    assert!(format!("{err:#}").contains("proxychains: connection refused"));
    assert!(matches!(
        err.downcast_ref::<ScanError>(),
        Some(ScanError::CommandFailed { .. })
    ));
}

#[test]
fn unparsable_output_is_an_error() {
    let err = scan_host_with("example.org", &ScanOptions::default(), &proxy(), |_| {
        Ok("<?xml version=\"1.0\"?>".to_string())
    })
    .unwrap_err();
    assert!(matches!(err.downcast_ref::<ScanError>(), Some(ScanError::Parse(_))));
}
