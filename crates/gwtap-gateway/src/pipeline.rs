//! Interception points between the event-stream client and its transport.
//!
//! The transport calls into the pipeline synchronously at three protocol
//! points and continues with whatever comes back:
//!
//! 1. [`InterceptionPipeline::on_outbound_send`]: every frame the client
//!    sends. Identify frames get the negotiated capability bitmask.
//! 2. [`InterceptionPipeline::on_inbound_dispatch`]: every dispatch. READY is
//!    normalized when enabled.
//! 3. [`InterceptionPipeline::on_inbound_hello`]: the server hello.
//!
//! The only state shared across calls is the injected
//! [`CapabilityNegotiator`].

use std::sync::Arc;

use gwtap_core::capability::mask_from_json;
use gwtap_core::{CapabilityNegotiator, DeepCopy, DispatchKind, Opcode, OutboundPayload};
use serde_json::Value;

use crate::config::GatewayConfig;
use crate::normalizer::{NormalizeReport, SchemaNormalizer};

const CAPABILITIES_FIELD: &str = "capabilities";

#[derive(Debug)]
pub struct InterceptionPipeline {
    negotiator: Arc<CapabilityNegotiator>,
    normalizer: SchemaNormalizer,
    normalize_ready: bool,
}

impl InterceptionPipeline {
    pub fn new(negotiator: Arc<CapabilityNegotiator>, config: &GatewayConfig) -> Self {
        Self {
            negotiator,
            normalizer: SchemaNormalizer::new(config.guild_properties.clone()),
            normalize_ready: config.normalize_ready,
        }
    }

    pub fn negotiator(&self) -> &Arc<CapabilityNegotiator> {
        &self.negotiator
    }

    pub fn normalize_ready(&self) -> bool {
        self.normalize_ready
    }

    pub fn set_normalize_ready(&mut self, enabled: bool) {
        self.normalize_ready = enabled;
    }

    // ── Outbound ─────────────────────────────────────────────────────

    /// Rewrite an outbound frame.
    ///
    /// `data` is never modified: the transport may still hold it for retries.
    /// The returned payload owns a deep copy. `session_established` defaults
    /// to `true`.
    pub fn on_outbound_send(
        &self,
        opcode: Opcode,
        data: &Value,
        session_established: Option<bool>,
    ) -> OutboundPayload {
        let mut copy = data.deep_copy();
        if opcode == Opcode::Identify {
            self.rewrite_identify(data, &mut copy);
        }
        OutboundPayload::new(opcode, copy, session_established)
    }

    fn rewrite_identify(&self, original: &Value, copy: &mut Value) {
        match original.get(CAPABILITIES_FIELD).map(mask_from_json) {
            Some(Ok(mask)) => {
                if self.negotiator.capture(mask) {
                    tracing::info!(capabilities = mask, "captured capability bitmask");
                }
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "identify carries unusable capabilities; not captured");
            }
            None => tracing::debug!("identify has no capabilities field"),
        }

        // Exactly one read of the shared mask per frame.
        let Some(mask) = self.negotiator.get() else {
            return;
        };
        let Some(fields) = copy.as_object_mut() else {
            tracing::warn!("identify payload is not an object; sending unmodified");
            return;
        };
        let previous = fields.insert(CAPABILITIES_FIELD.to_owned(), Value::from(mask));
        if previous.as_ref() != Some(&Value::from(mask)) {
            tracing::debug!(
                capabilities = mask,
                previous = ?previous,
                "overrode identify capabilities"
            );
        }
    }

    // ── Inbound ──────────────────────────────────────────────────────

    /// Handle one inbound dispatch, normalizing READY when enabled.
    ///
    /// `extra` is transport metadata (e.g. the sequence number) and is not
    /// inspected.
    pub fn on_inbound_dispatch(
        &self,
        kind: DispatchKind,
        mut data: Value,
        extra: Option<&Value>,
    ) -> (DispatchKind, Value) {
        if kind.is_ready() && self.normalize_ready {
            let report = self.normalizer.normalize_ready(&mut data);
            log_report(&report, extra);
        }
        (kind, data)
    }

    /// Handle the server hello. Passes through unchanged.
    pub fn on_inbound_hello(&self, data: Value) -> Value {
        tracing::debug!(
            heartbeat_interval = ?data.get("heartbeat_interval"),
            has_trace = data.get("_trace").is_some(),
            "hello received"
        );
        data
    }
}

fn log_report(report: &NormalizeReport, extra: Option<&Value>) {
    for malformed in &report.malformed {
        tracing::warn!(
            path = %malformed.path,
            reason = malformed.reason,
            seq = ?extra,
            "READY sub-record left unnormalized"
        );
    }
    tracing::debug!(
        read_state = ?report.read_state,
        user_guild_settings = ?report.user_guild_settings,
        guilds_partitioned = report.guilds_partitioned,
        guilds_already_nested = report.guilds_already_nested,
        "READY normalized"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pipeline(normalize: bool) -> InterceptionPipeline {
        let config = GatewayConfig {
            normalize_ready: normalize,
            ..GatewayConfig::default()
        };
        InterceptionPipeline::new(Arc::new(CapabilityNegotiator::new()), &config)
    }

    #[test]
    fn identify_captures_and_returns_copy() {
        let pipeline = pipeline(false);
        let data = json!({"capabilities": 1, "token": "x"});
        let out = pipeline.on_outbound_send(Opcode::Identify, &data, None);

        assert_eq!(pipeline.negotiator().get(), Some(1));
        assert_eq!(out.opcode, Opcode::Identify);
        assert_eq!(out.data, json!({"capabilities": 1, "token": "x"}));
        assert!(out.session_established);
        assert!(!std::ptr::eq(&out.data, &data));
    }

    #[test]
    fn operator_override_wins_over_payload() {
        let pipeline = pipeline(false);
        pipeline.negotiator().set_raw(0b101).expect("valid");
        let data = json!({"capabilities": 999, "token": "x"});
        let out = pipeline.on_outbound_send(Opcode::Identify, &data, Some(false));

        assert_eq!(out.data["capabilities"], json!(5));
        assert!(!out.session_established);
        // The caller's object is untouched.
        assert_eq!(data["capabilities"], json!(999));
    }

    #[test]
    fn reconnect_identify_reuses_first_capture() {
        let pipeline = pipeline(false);
        pipeline.on_outbound_send(Opcode::Identify, &json!({"capabilities": 16381}), None);
        let out = pipeline.on_outbound_send(Opcode::Identify, &json!({"capabilities": 1}), None);
        assert_eq!(out.data["capabilities"], json!(16381));
    }

    #[test]
    fn identify_without_capabilities_stays_unset() {
        let pipeline = pipeline(false);
        let data = json!({"token": "x"});
        let out = pipeline.on_outbound_send(Opcode::Identify, &data, None);
        assert_eq!(pipeline.negotiator().get(), None);
        assert_eq!(out.data, data);
    }

    #[test]
    fn identify_without_capabilities_gets_negotiated_mask() {
        let pipeline = pipeline(false);
        pipeline.negotiator().capture(12);
        let out = pipeline.on_outbound_send(Opcode::Identify, &json!({"token": "x"}), None);
        assert_eq!(out.data, json!({"token": "x", "capabilities": 12}));
    }

    #[test]
    fn invalid_capabilities_are_not_captured() {
        let pipeline = pipeline(false);
        let out = pipeline.on_outbound_send(
            Opcode::Identify,
            &json!({"capabilities": "lots", "token": "x"}),
            None,
        );
        assert_eq!(pipeline.negotiator().get(), None);
        assert_eq!(out.data["capabilities"], json!("lots"));
    }

    #[test]
    fn non_identify_frames_pass_through() {
        let pipeline = pipeline(false);
        pipeline.negotiator().set_raw(7).expect("valid");
        let data = json!({"capabilities": 1, "since": null});
        let out = pipeline.on_outbound_send(Opcode::PresenceUpdate, &data, None);
        assert_eq!(out.data, data);
        assert_eq!(out.opcode, Opcode::PresenceUpdate);
        let heartbeat = pipeline.on_outbound_send(Opcode::Heartbeat, &json!(41), Some(true));
        assert_eq!(heartbeat.data, json!(41));
    }

    #[test]
    fn ready_normalized_only_when_enabled() {
        let ready = json!({"read_state": ["a", "b"], "user_guild_settings": [], "guilds": []});

        let (_, untouched) = pipeline(false).on_inbound_dispatch(DispatchKind::Ready, ready.clone(), None);
        assert_eq!(untouched, ready);

        let (kind, normalized) = pipeline(true).on_inbound_dispatch(DispatchKind::Ready, ready, None);
        assert!(kind.is_ready());
        assert_eq!(
            normalized["read_state"],
            json!({"entries": ["a", "b"], "partial": false, "version": 1})
        );
    }

    #[test]
    fn other_dispatches_pass_through() {
        let pipeline = pipeline(true);
        let data = json!({"read_state": ["a"]});
        let kind = DispatchKind::parse("READY_SUPPLEMENTAL");
        let (out_kind, out) = pipeline.on_inbound_dispatch(kind.clone(), data.clone(), Some(&json!(3)));
        assert_eq!(out_kind, kind);
        assert_eq!(out, data);
    }

    #[test]
    fn normalization_toggle_is_live() {
        let mut pipeline = pipeline(false);
        assert!(!pipeline.normalize_ready());
        pipeline.set_normalize_ready(true);
        let (_, out) = pipeline.on_inbound_dispatch(
            DispatchKind::Ready,
            json!({"read_state": [], "user_guild_settings": [], "guilds": []}),
            None,
        );
        assert!(out["read_state"].is_object());
    }

    #[test]
    fn hello_is_identity() {
        let pipeline = pipeline(true);
        let hello = json!({"heartbeat_interval": 41250, "_trace": ["[\"gw\",{\"micros\":0}]"]});
        assert_eq!(pipeline.on_inbound_hello(hello.clone()), hello);
    }

    #[test]
    fn shared_negotiator_sees_operator_edits() {
        let negotiator = Arc::new(CapabilityNegotiator::new());
        let pipeline = InterceptionPipeline::new(Arc::clone(&negotiator), &GatewayConfig::default());
        pipeline.on_outbound_send(Opcode::Identify, &json!({"capabilities": 0}), None);
        negotiator.toggle_bit(3).expect("in range");
        let out = pipeline.on_outbound_send(Opcode::Identify, &json!({"capabilities": 0}), None);
        assert_eq!(out.data["capabilities"], json!(8));
    }
}
