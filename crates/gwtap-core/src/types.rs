use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ─── Opcode ───────────────────────────────────────────────────────

/// Gateway opcode carried by every frame.
///
/// Unknown values are kept verbatim in [`Opcode::Other`] so that frames from a
/// newer protocol revision still pass through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum Opcode {
    Dispatch,
    Heartbeat,
    Identify,
    PresenceUpdate,
    VoiceStateUpdate,
    Resume,
    Reconnect,
    RequestGuildMembers,
    InvalidSession,
    Hello,
    HeartbeatAck,
    Other(u8),
}

impl Opcode {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Dispatch => 0,
            Self::Heartbeat => 1,
            Self::Identify => 2,
            Self::PresenceUpdate => 3,
            Self::VoiceStateUpdate => 4,
            Self::Resume => 6,
            Self::Reconnect => 7,
            Self::RequestGuildMembers => 8,
            Self::InvalidSession => 9,
            Self::Hello => 10,
            Self::HeartbeatAck => 11,
            Self::Other(op) => op,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dispatch => "dispatch",
            Self::Heartbeat => "heartbeat",
            Self::Identify => "identify",
            Self::PresenceUpdate => "presence_update",
            Self::VoiceStateUpdate => "voice_state_update",
            Self::Resume => "resume",
            Self::Reconnect => "reconnect",
            Self::RequestGuildMembers => "request_guild_members",
            Self::InvalidSession => "invalid_session",
            Self::Hello => "hello",
            Self::HeartbeatAck => "heartbeat_ack",
            Self::Other(_) => "other",
        }
    }
}

impl From<u8> for Opcode {
    fn from(op: u8) -> Self {
        match op {
            0 => Self::Dispatch,
            1 => Self::Heartbeat,
            2 => Self::Identify,
            3 => Self::PresenceUpdate,
            4 => Self::VoiceStateUpdate,
            6 => Self::Resume,
            7 => Self::Reconnect,
            8 => Self::RequestGuildMembers,
            9 => Self::InvalidSession,
            10 => Self::Hello,
            11 => Self::HeartbeatAck,
            other => Self::Other(other),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> Self {
        op.as_u8()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(op) => write!(f, "op{op}"),
            known => f.write_str(known.as_str()),
        }
    }
}

// ─── Dispatch kind ────────────────────────────────────────────────

/// Event type tag (`t`) of an inbound dispatch.
///
/// Only READY has a normalized shape; every other event is carried as its raw
/// tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DispatchKind {
    Ready,
    Other(String),
}

impl DispatchKind {
    pub const READY: &'static str = "READY";

    pub fn parse(tag: &str) -> Self {
        if tag == Self::READY {
            Self::Ready
        } else {
            Self::Other(tag.to_owned())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Ready => Self::READY,
            Self::Other(tag) => tag,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl From<String> for DispatchKind {
    fn from(tag: String) -> Self {
        if tag == Self::READY {
            Self::Ready
        } else {
            Self::Other(tag)
        }
    }
}

impl From<DispatchKind> for String {
    fn from(kind: DispatchKind) -> Self {
        match kind {
            DispatchKind::Ready => DispatchKind::READY.to_owned(),
            DispatchKind::Other(tag) => tag,
        }
    }
}

impl fmt::Display for DispatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Connection state ─────────────────────────────────────────────

/// Lifecycle state of the transport's socket.
///
/// Owned and mutated by the transport; this crate only observes transitions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    #[default]
    Closed,
    WillReconnect,
    Connecting,
    Identifying,
    Resuming,
    SessionEstablished,
}

impl ConnectionState {
    pub const ALL: [Self; 6] = [
        Self::Closed,
        Self::WillReconnect,
        Self::Connecting,
        Self::Identifying,
        Self::Resuming,
        Self::SessionEstablished,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::WillReconnect => "WILL_RECONNECT",
            Self::Connecting => "CONNECTING",
            Self::Identifying => "IDENTIFYING",
            Self::Resuming => "RESUMING",
            Self::SessionEstablished => "SESSION_ESTABLISHED",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Outbound payload ─────────────────────────────────────────────

/// One outbound frame as handed to the transport: `(opcode, data, flag)`.
///
/// The transport may keep a reference to the original `data` for retries, so
/// rewrites always happen on a copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundPayload {
    #[serde(rename = "op")]
    pub opcode: Opcode,
    #[serde(rename = "d")]
    pub data: Value,
    /// Defaults to `true` when the caller omits it.
    #[serde(default = "default_session_established")]
    pub session_established: bool,
}

fn default_session_established() -> bool {
    true
}

impl OutboundPayload {
    pub fn new(opcode: Opcode, data: Value, session_established: Option<bool>) -> Self {
        Self {
            opcode,
            data,
            session_established: session_established.unwrap_or_else(default_session_established),
        }
    }
}
