//! Passive tap on the transport's connection lifecycle.
//!
//! The transport owns its state machine and the legality of each transition;
//! the observer only remembers the last two states and forwards every
//! transition to a [`DiagnosticsSink`].

use chrono::{DateTime, Utc};
use gwtap_core::ConnectionState;
use serde::Serialize;

/// One state change reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub observed_at: DateTime<Utc>,
}

/// Receiver for connection-state diagnostics.
pub trait DiagnosticsSink: Send + Sync {
    fn connection_state_changed(&self, transition: &StateTransition);
}

/// Sink that drops every transition.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl DiagnosticsSink for NoopSink {
    fn connection_state_changed(&self, _transition: &StateTransition) {}
}

/// Sink that logs transitions at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn connection_state_changed(&self, transition: &StateTransition) {
        tracing::debug!(
            from = %transition.from,
            to = %transition.to,
            at = %transition.observed_at,
            "connection state changed"
        );
    }
}

pub struct ConnectionStateObserver {
    sink: Box<dyn DiagnosticsSink>,
    previous: Option<ConnectionState>,
    current: Option<ConnectionState>,
}

impl Default for ConnectionStateObserver {
    fn default() -> Self {
        Self::new(Box::new(NoopSink))
    }
}

impl std::fmt::Debug for ConnectionStateObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionStateObserver")
            .field("previous", &self.previous)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl ConnectionStateObserver {
    pub fn new(sink: Box<dyn DiagnosticsSink>) -> Self {
        Self {
            sink,
            previous: None,
            current: None,
        }
    }

    /// Called by the transport whenever its state setter runs.
    pub fn on_transition(&mut self, old: ConnectionState, new: ConnectionState) {
        self.on_transition_at(old, new, Utc::now());
    }

    /// [`Self::on_transition`] with an explicit timestamp.
    pub fn on_transition_at(
        &mut self,
        old: ConnectionState,
        new: ConnectionState,
        now: DateTime<Utc>,
    ) {
        self.previous = Some(old);
        self.current = Some(new);
        self.sink.connection_state_changed(&StateTransition {
            from: old,
            to: new,
            observed_at: now,
        });
    }

    /// State the transport left on the last transition.
    pub fn previous(&self) -> Option<ConnectionState> {
        self.previous
    }

    /// State the transport entered on the last transition.
    pub fn current(&self) -> Option<ConnectionState> {
        self.current
    }
}
