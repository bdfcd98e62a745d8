//! `gwtap trace`: render a server call trace.

use std::path::Path;

use anyhow::Context;
use gwtap_core::call_trace::{self, CallTraceNode};
use serde_json::Value;

use crate::input;

pub async fn cmd_trace(file: Option<&Path>) -> anyhow::Result<()> {
    let text = input::read_to_string(file).await?;
    let nodes = decode(&text)?;
    println!("{}", call_trace::render(&nodes));
    eprintln!("total: {}ms", call_trace::total_millis(&nodes));
    Ok(())
}

/// Accepts wire tuples, a `_trace` array, or a payload carrying `_trace`.
fn decode(text: &str) -> anyhow::Result<Vec<CallTraceNode>> {
    if let Ok(nodes) = call_trace::from_json_str(text) {
        return Ok(nodes);
    }
    let value: Value = serde_json::from_str(text).context("input is not valid JSON")?;
    let field = value.get("_trace").unwrap_or(&value);
    let decoded = call_trace::parse_trace_field(field).context("no call trace found")?;
    if decoded.skipped > 0 {
        tracing::warn!(skipped = decoded.skipped, "some trace entries could not be decoded");
    }
    Ok(decoded.nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_wire_tuples() {
        let nodes = decode(r#"[["root", {"micros": 1500}]]"#).expect("decode");
        assert_eq!(call_trace::render(&nodes), "root: 1.5");
    }

    #[test]
    fn decodes_hello_trace_field() {
        let hello = r#"{"heartbeat_interval": 41250, "_trace": ["[\"gw\",{\"micros\":2000}]"]}"#;
        let nodes = decode(hello).expect("decode");
        assert_eq!(call_trace::render(&nodes), "gw: 2");
    }

    #[test]
    fn rejects_payload_without_trace() {
        assert!(decode(r#"{"heartbeat_interval": 1}"#).is_err());
    }
}
