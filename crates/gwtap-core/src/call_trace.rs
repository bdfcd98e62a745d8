//! Server call-trace tree.
//!
//! The server reports where it spent time handling a handshake as a compact
//! tuple list: `[name, {"micros": n, "calls": [ ...nested tuples ]}]`. This
//! module converts that encoding into [`CallTraceNode`] trees measured in
//! milliseconds, back again, and renders the indented text view used when
//! comparing traces.
//!
//! Converting to milliseconds and back rounds to the nearest microsecond, so
//! a value that did not start integral may drift by at most 0.5µs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TraceError;

/// Indentation written once per ancestor in [`render`].
pub const RENDER_INDENT: &str = "|  ";

// ─── Wire encoding ────────────────────────────────────────────────

/// One `[name, timing]` tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireCall(pub String, pub WireTiming);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTiming {
    pub micros: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calls: Option<Vec<WireCall>>,
}

// ─── Tree ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallTraceNode {
    pub name: String,
    pub duration_millis: f64,
    #[serde(default)]
    pub children: Vec<CallTraceNode>,
}

impl CallTraceNode {
    pub fn leaf(name: impl Into<String>, duration_millis: f64) -> Self {
        Self {
            name: name.into(),
            duration_millis,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(Self::node_count).sum::<usize>()
    }
}

/// Decode wire tuples into trees. Absent `calls` means no children.
pub fn from_wire(tuples: &[WireCall]) -> Vec<CallTraceNode> {
    tuples
        .iter()
        .map(|WireCall(name, timing)| CallTraceNode {
            name: name.clone(),
            duration_millis: micros_to_millis(timing.micros),
            children: timing.calls.as_deref().map(from_wire).unwrap_or_default(),
        })
        .collect()
}

/// Encode trees as wire tuples. Childless nodes carry no `calls` key.
pub fn to_wire(nodes: &[CallTraceNode]) -> Vec<WireCall> {
    nodes
        .iter()
        .map(|node| {
            let calls = if node.children.is_empty() {
                None
            } else {
                Some(to_wire(&node.children))
            };
            WireCall(
                node.name.clone(),
                WireTiming {
                    micros: millis_to_micros(node.duration_millis),
                    calls,
                },
            )
        })
        .collect()
}

fn micros_to_millis(micros: u64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let micros = micros as f64;
    micros / 1000.0
}

fn millis_to_micros(millis: f64) -> u64 {
    // Negative or NaN durations saturate to 0.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let micros = (millis * 1000.0).round() as u64;
    micros
}

/// Render trees as indented text, one `name: millis` line per node.
///
/// ```text
/// gateway: 2.5
/// |  session_lookup: 1
/// |  |  db: 0.25
/// ```
pub fn render(nodes: &[CallTraceNode]) -> String {
    let mut lines = Vec::new();
    render_into(nodes, 0, &mut lines);
    lines.join("\n")
}

fn render_into(nodes: &[CallTraceNode], depth: usize, lines: &mut Vec<String>) {
    for node in nodes {
        lines.push(format!(
            "{}{}: {}",
            RENDER_INDENT.repeat(depth),
            node.name,
            node.duration_millis
        ));
        render_into(&node.children, depth + 1, lines);
    }
}

/// Sum of the root durations.
pub fn total_millis(nodes: &[CallTraceNode]) -> f64 {
    nodes.iter().map(|n| n.duration_millis).sum()
}

// ─── Decoding helpers ─────────────────────────────────────────────

/// Parse a JSON document holding a tuple list.
pub fn from_json_str(text: &str) -> Result<Vec<CallTraceNode>, TraceError> {
    let tuples: Vec<WireCall> = serde_json::from_str(text)?;
    Ok(from_wire(&tuples))
}

/// One `_trace` entry: a single tuple or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum TraceEntry {
    One(WireCall),
    Many(Vec<WireCall>),
}

/// Result of decoding a `_trace` field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedTrace {
    pub nodes: Vec<CallTraceNode>,
    /// Entries that were not valid call-trace JSON.
    pub skipped: usize,
}

/// Decode the `_trace` field carried by handshake payloads.
///
/// The field is an array whose entries are JSON-encoded strings (or already
/// decoded arrays). Undecodable entries are counted in
/// [`DecodedTrace::skipped`] and do not abort the rest.
pub fn parse_trace_field(field: &Value) -> Result<DecodedTrace, TraceError> {
    let entries = match field {
        Value::Array(entries) => entries,
        Value::Null => return Err(TraceError::NotAnArray("null")),
        Value::Bool(_) => return Err(TraceError::NotAnArray("bool")),
        Value::Number(_) => return Err(TraceError::NotAnArray("number")),
        Value::String(_) => return Err(TraceError::NotAnArray("string")),
        Value::Object(_) => return Err(TraceError::NotAnArray("object")),
    };

    let mut decoded = DecodedTrace::default();
    for entry in entries {
        let parsed = match entry {
            Value::String(text) => serde_json::from_str::<TraceEntry>(text),
            other => serde_json::from_value::<TraceEntry>(other.clone()),
        };
        match parsed {
            Ok(TraceEntry::One(call)) => decoded.nodes.extend(from_wire(&[call])),
            Ok(TraceEntry::Many(calls)) => decoded.nodes.extend(from_wire(&calls)),
            Err(_) => decoded.skipped += 1,
        }
    }
    Ok(decoded)
}
