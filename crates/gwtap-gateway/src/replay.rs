//! Replays a recorded gateway session through the interception points.
//!
//! A session log is JSON Lines, one frame per line:
//!
//! ```text
//! {"dir":"state","from":"CLOSED","to":"CONNECTING"}
//! {"dir":"in","op":10,"d":{"heartbeat_interval":41250}}
//! {"dir":"out","op":2,"d":{"token":"x","capabilities":16381}}
//! {"dir":"in","op":0,"t":"READY","s":1,"d":{"read_state":[],"guilds":[]}}
//! {"dir":"operator","action":"toggle_bit","bit":3}
//! ```
//!
//! Each frame yields one [`ReplayOutput`] describing what the transport would
//! have continued with.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use gwtap_core::{ConnectionState, DispatchKind, Opcode, OutboundPayload};

use crate::error::ReplayError;
use crate::observer::ConnectionStateObserver;
use crate::pipeline::InterceptionPipeline;

/// Operator action against the shared bitmask.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OperatorAction {
    /// Decimal text as typed into a settings field.
    SetText { text: String },
    SetRaw { value: i64 },
    ToggleBit { bit: u8 },
    Reset,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "dir", rename_all = "snake_case")]
pub enum ReplayFrame {
    Out {
        op: Opcode,
        #[serde(default)]
        d: Value,
        #[serde(default)]
        session_established: Option<bool>,
    },
    In {
        op: Opcode,
        #[serde(default)]
        t: Option<DispatchKind>,
        #[serde(default)]
        s: Option<u64>,
        #[serde(default)]
        d: Value,
    },
    State {
        from: ConnectionState,
        to: ConnectionState,
    },
    Operator(OperatorAction),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "dir", rename_all = "snake_case")]
pub enum ReplayOutput {
    Out(OutboundPayload),
    In {
        op: Opcode,
        #[serde(skip_serializing_if = "Option::is_none")]
        t: Option<DispatchKind>,
        #[serde(skip_serializing_if = "Option::is_none")]
        s: Option<u64>,
        d: Value,
    },
    State {
        from: ConnectionState,
        to: ConnectionState,
    },
    Operator {
        #[serde(flatten)]
        action: OperatorAction,
        capabilities: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

/// Parse one log line. Blank lines yield `None`.
pub fn parse_frame(line_no: usize, line: &str) -> Result<Option<ReplayFrame>, ReplayError> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|source| ReplayError {
            line: line_no,
            source,
        })
}

/// Parse a whole JSONL log. Line numbers in errors are 1-based.
pub fn parse_log(text: &str) -> Result<Vec<ReplayFrame>, ReplayError> {
    let mut frames = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if let Some(frame) = parse_frame(index + 1, line)? {
            frames.push(frame);
        }
    }
    Ok(frames)
}

/// A pipeline and observer driven together, as one transport would.
#[derive(Debug)]
pub struct ReplaySession {
    pipeline: InterceptionPipeline,
    observer: ConnectionStateObserver,
}

impl ReplaySession {
    pub fn new(pipeline: InterceptionPipeline, observer: ConnectionStateObserver) -> Self {
        Self { pipeline, observer }
    }

    pub fn pipeline(&self) -> &InterceptionPipeline {
        &self.pipeline
    }

    pub fn observer(&self) -> &ConnectionStateObserver {
        &self.observer
    }

    pub fn apply(&mut self, frame: ReplayFrame) -> ReplayOutput {
        match frame {
            ReplayFrame::Out {
                op,
                d,
                session_established,
            } => ReplayOutput::Out(self.pipeline.on_outbound_send(op, &d, session_established)),
            ReplayFrame::In { op, t, s, d } => {
                let extra = s.map(Value::from);
                let (t, d) = match (op, t) {
                    (Opcode::Dispatch, Some(kind)) => {
                        let (kind, d) = self.pipeline.on_inbound_dispatch(kind, d, extra.as_ref());
                        (Some(kind), d)
                    }
                    (Opcode::Hello, t) => (t, self.pipeline.on_inbound_hello(d)),
                    (_, t) => (t, d),
                };
                ReplayOutput::In { op, t, s, d }
            }
            ReplayFrame::State { from, to } => {
                self.observer.on_transition(from, to);
                ReplayOutput::State { from, to }
            }
            ReplayFrame::Operator(action) => self.operate(action),
        }
    }

    fn operate(&self, action: OperatorAction) -> ReplayOutput {
        let negotiator = self.pipeline.negotiator();
        let result = match &action {
            OperatorAction::SetText { text } => {
                gwtap_core::CapabilityNegotiator::validate_str(text)
                    .and_then(|mask| negotiator.set_raw(i64::from(mask)))
                    .map(|_| ())
            }
            OperatorAction::SetRaw { value } => negotiator.set_raw(*value).map(|_| ()),
            OperatorAction::ToggleBit { bit } => negotiator.toggle_bit(*bit).map(|_| ()),
            OperatorAction::Reset => {
                negotiator.reset();
                Ok(())
            }
        };
        if let Err(e) = &result {
            tracing::warn!(error = %e, "operator action rejected");
        }
        ReplayOutput::Operator {
            action,
            capabilities: negotiator.get(),
            error: result.err().map(|e| e.to_string()),
        }
    }

    /// Apply every frame in order.
    pub fn replay(&mut self, frames: impl IntoIterator<Item = ReplayFrame>) -> Vec<ReplayOutput> {
        frames.into_iter().map(|frame| self.apply(frame)).collect()
    }
}
