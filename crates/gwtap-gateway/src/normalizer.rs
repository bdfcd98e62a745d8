//! READY payload normalization.
//!
//! Depending on the negotiated capability bits the server emits READY in
//! either a legacy or a versioned shape. The normalizer rewrites the legacy
//! parts in place so consumers only ever see the versioned form:
//!
//! - `read_state` / `user_guild_settings`: a bare array becomes
//!   `{"entries": [...], "partial": false, "version": 1}`.
//! - every flat guild record has its allowlisted fields moved under a
//!   `properties` object.
//!
//! Both rewrites are idempotent. Malformed sub-records are skipped and
//! reported; they never abort the rest of the payload.

use serde_json::{Map, Value, json};

use crate::config::GuildPropertyAllowlist;
use crate::error::MalformedPayload;

/// READY fields that are re-versioned when they arrive as bare arrays.
pub const VERSIONED_FIELDS: [&str; 2] = ["read_state", "user_guild_settings"];

const GUILDS_FIELD: &str = "guilds";
const PROPERTIES_FIELD: &str = "properties";

// ─── Report ───────────────────────────────────────────────────────

/// What happened to one re-versioned field.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FieldOutcome {
    /// The payload was not inspected.
    #[default]
    Untouched,
    /// Legacy array wrapped into the versioned object.
    Wrapped,
    /// Already an object; left as-is.
    AlreadyVersioned,
    /// Absent or of an unexpected type; left as-is.
    Malformed,
}

/// Summary of one normalization pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NormalizeReport {
    pub read_state: FieldOutcome,
    pub user_guild_settings: FieldOutcome,
    /// Flat guild records rewritten in this pass.
    pub guilds_partitioned: usize,
    /// Guild records that already carried `properties`.
    pub guilds_already_nested: usize,
    pub malformed: Vec<MalformedPayload>,
}

impl NormalizeReport {
    /// `true` when this pass rewrote anything.
    pub fn changed(&self) -> bool {
        self.read_state == FieldOutcome::Wrapped
            || self.user_guild_settings == FieldOutcome::Wrapped
            || self.guilds_partitioned > 0
    }
}

// ─── SchemaNormalizer ─────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct SchemaNormalizer {
    allowlist: GuildPropertyAllowlist,
}

impl SchemaNormalizer {
    pub fn new(allowlist: GuildPropertyAllowlist) -> Self {
        Self { allowlist }
    }

    pub fn allowlist(&self) -> &GuildPropertyAllowlist {
        &self.allowlist
    }

    /// Normalize a READY `d` object in place.
    pub fn normalize_ready(&self, data: &mut Value) -> NormalizeReport {
        let mut report = NormalizeReport::default();
        let Some(ready) = data.as_object_mut() else {
            report
                .malformed
                .push(MalformedPayload::new("d", "READY payload is not an object"));
            return report;
        };

        report.read_state = wrap_versioned(ready, VERSIONED_FIELDS[0], &mut report.malformed);
        report.user_guild_settings =
            wrap_versioned(ready, VERSIONED_FIELDS[1], &mut report.malformed);
        self.partition_guilds(ready, &mut report);
        report
    }

    fn partition_guilds(&self, ready: &mut Map<String, Value>, report: &mut NormalizeReport) {
        let guilds = match ready.get_mut(GUILDS_FIELD) {
            Some(Value::Array(guilds)) => guilds,
            Some(_) => {
                report
                    .malformed
                    .push(MalformedPayload::new(GUILDS_FIELD, "not an array"));
                return;
            }
            None => {
                report
                    .malformed
                    .push(MalformedPayload::new(GUILDS_FIELD, "field absent"));
                return;
            }
        };

        for (index, guild) in guilds.iter_mut().enumerate() {
            let Some(record) = guild.as_object_mut() else {
                report.malformed.push(MalformedPayload::new(
                    format!("{GUILDS_FIELD}[{index}]"),
                    "guild record is not an object",
                ));
                continue;
            };
            if record.contains_key(PROPERTIES_FIELD) {
                report.guilds_already_nested += 1;
                continue;
            }
            partition_guild(record, &self.allowlist);
            report.guilds_partitioned += 1;
        }
    }
}

fn wrap_versioned(
    ready: &mut Map<String, Value>,
    field: &'static str,
    malformed: &mut Vec<MalformedPayload>,
) -> FieldOutcome {
    match ready.get_mut(field) {
        Some(slot) if slot.is_array() => {
            let entries = slot.take();
            *slot = json!({
                "entries": entries,
                "partial": false,
                "version": 1,
            });
            FieldOutcome::Wrapped
        }
        Some(Value::Object(_)) => FieldOutcome::AlreadyVersioned,
        Some(_) => {
            malformed.push(MalformedPayload::new(field, "neither an array nor an object"));
            FieldOutcome::Malformed
        }
        None => {
            malformed.push(MalformedPayload::new(field, "field absent"));
            FieldOutcome::Malformed
        }
    }
}

/// Move allowlisted fields of a flat guild record under `properties`.
fn partition_guild(record: &mut Map<String, Value>, allowlist: &GuildPropertyAllowlist) {
    let mut properties = Map::new();
    for field in &allowlist.fields {
        if let Some(value) = record.remove(field) {
            properties.insert(field.clone(), value);
        }
    }
    record.insert(PROPERTIES_FIELD.to_owned(), Value::Object(properties));
}
