use serde_json::Value;
use tracing::{debug, warn};

use crate::error::NormalizeError;
use crate::types::{AuthMethod, Cpe, HostState, PortRecord, ScanReport};

/// A child element as rendered by the XML-to-JSON conversion: a lone child
/// becomes a bare object, several children become an array.
#[derive(Debug, Clone, Copy)]
enum OneOrMany<'a> {
    Single(&'a Value),
    Many(&'a [Value]),
}

impl<'a> OneOrMany<'a> {
    fn of(value: Option<&'a Value>) -> Option<Self> {
        match value? {
            Value::Null => None,
            Value::Array(items) => Some(Self::Many(items)),
            other => Some(Self::Single(other)),
        }
    }

    fn as_slice(self) -> &'a [Value] {
        match self {
            Self::Single(v) => std::slice::from_ref(v),
            Self::Many(items) => items,
        }
    }
}

/// Iterate a child that may be missing, a single object or a list.
fn children(value: Option<&Value>) -> std::slice::Iter<'_, Value> {
    OneOrMany::of(value).map_or(&[][..], OneOrMany::as_slice).iter()
}

/// Build a [`ScanReport`] from the scanner's XML tree rendered as JSON
/// (attributes under `@`-prefixed keys).
///
/// Missing optional data never fails the call: an absent host yields
/// [`HostState::Unknown`], absent service fields stay `None`, and script
/// entries with an unexpected shape are skipped. Only the invocation
/// arguments and the run duration are required.
pub fn normalize(tree: &Value) -> Result<ScanReport, NormalizeError> {
    let run = &tree["nmaprun"];
    let invocation_args = run["@args"]
        .as_str()
        .ok_or(NormalizeError::MissingField("nmaprun.@args"))?
        .to_string();
    let elapsed_seconds = elapsed_seconds(&run["runstats"]["finished"]["@elapsed"])?;

    // Only one target is scanned per run; a list means several host
    // elements and the first is ours.
    let host = children(run.get("host")).next();
    let Some(host) = host else {
        debug!("no host in scan output, nothing found");
        return Ok(ScanReport {
            invocation_args,
            elapsed_seconds,
            host_state: HostState::Unknown,
            ports: Vec::new(),
        });
    };

    let host_state = match host["status"]["@state"].as_str() {
        Some("up") => HostState::Up,
        other => {
            debug!(state = ?other, "host not up, ignoring port data");
            HostState::Unknown
        }
    };

    let mut ports = Vec::new();
    if host_state == HostState::Up {
        for entry in children(host["ports"].get("port")) {
            match port_record(entry) {
                Some(rec) => {
                    debug!(port = %rec.port, "found port");
                    ports.push(rec);
                }
                None => warn!(entry = %entry, "skipping port entry without @portid"),
            }
        }
    }

    Ok(ScanReport {
        invocation_args,
        elapsed_seconds,
        host_state,
        ports,
    })
}

fn elapsed_seconds(value: &Value) -> Result<u64, NormalizeError> {
    const FIELD: &str = "nmaprun.runstats.finished.@elapsed";
    let secs = match value {
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| NormalizeError::BadValue {
            field: FIELD,
            value: s.clone(),
        })?,
        Value::Number(n) => n.as_f64().ok_or_else(|| NormalizeError::BadValue {
            field: FIELD,
            value: n.to_string(),
        })?,
        Value::Null => return Err(NormalizeError::MissingField(FIELD)),
        other => {
            return Err(NormalizeError::BadValue {
                field: FIELD,
                value: other.to_string(),
            })
        }
    };
    if !secs.is_finite() || secs <= 0.0 {
        return Ok(0);
    }
    Ok(secs.trunc() as u64)
}

fn port_record(entry: &Value) -> Option<PortRecord> {
    let port = match entry.get("@portid")? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let mut rec = PortRecord::new(port);

    let service = &entry["service"];
    rec.name = text(service, "@name");
    rec.product = text(service, "@product");
    rec.confidence = text(service, "@conf");
    rec.version = text(service, "@version");
    rec.ostype = text(service, "@ostype");
    rec.cpe = cpe(&service["cpe"]);

    for script in children(entry.get("script")) {
        if apply_script(&mut rec, script).is_none() {
            debug!(port = %rec.port, script = %script, "skipping malformed script entry");
        }
    }
    Some(rec)
}

fn text(obj: &Value, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn cpe(value: &Value) -> Option<Cpe> {
    match value {
        Value::String(s) => Some(Cpe::One(s.clone())),
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .map(Cpe::Many),
        _ => None,
    }
}

/// Fold one script result into the record. `None` when the entry lacks an
/// id or output of the expected type.
fn apply_script(rec: &mut PortRecord, script: &Value) -> Option<()> {
    let id = script.get("@id")?.as_str()?;
    match id {
        "banner" => {
            rec.banner = Some(output(script)?.to_string());
        }
        "ssh-hostkey" => {
            let lines = output(script)?
                .split(['\n', '\r'])
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string);
            rec.hostprints.extend(lines);
        }
        "ssh-auth-methods" => {
            let out = output(script)?;
            for method in AuthMethod::ALL {
                if out.contains(method.token()) {
                    rec.shell_auth_methods.insert(method);
                }
            }
        }
        _ => {}
    }
    Some(())
}

fn output(script: &Value) -> Option<&str> {
    script.get("@output")?.as_str()
}
