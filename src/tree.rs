use serde_json::Value;

use crate::error::ScanError;

/// Parse the JSON that `xq` renders from nmap's XML report.
pub fn parse_tree(raw: &str) -> Result<Value, ScanError> {
    Ok(serde_json::from_str(raw.trim())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_xq_output() {
        let raw = r#"{ "nmaprun": { "@args": "nmap -sT x" } }
"#;
        let tree = parse_tree(raw).unwrap();
        assert_eq!(tree["nmaprun"]["@args"], "nmap -sT x");
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(parse_tree("<nmaprun>"), Err(ScanError::Parse(_))));
    }
}
