//! Gateway configuration loaded from TOML.
//!
//! ```toml
//! normalize_ready = true
//! capabilities_override = "16381"
//!
//! [guild_properties]
//! revision = 1
//! fields = ["id", "member_count", "roles"]
//! ```
//!
//! Every key is optional.

use std::path::Path;

use gwtap_core::CapabilityNegotiator;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Protocol revision the built-in guild allowlist was written against.
pub const DEFAULT_GUILD_PROPERTIES_REVISION: u32 = 1;

/// Guild fields nested under `properties` by the default allowlist.
pub const DEFAULT_GUILD_PROPERTY_FIELDS: &[&str] = &[
    "id",
    "data_mode",
    "partial_updates",
    "channel_updates",
    "member_count",
    "roles",
    "presences",
    "voice_states",
    "members",
    "channels",
    "threads",
    "emojis",
    "stickers",
    "stage_instances",
    "guild_scheduled_events",
    "embedded_activities",
    "activity_instances",
    "joined_at",
    "large",
    "lazy",
    "premium_subscription_count",
    "application_command_counts",
];

// ─── Guild allowlist ──────────────────────────────────────────────

/// Guild fields that belong under `properties`, tied to one protocol
/// revision. Fields not listed stay at the top level of the guild record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildPropertyAllowlist {
    pub revision: u32,
    pub fields: Vec<String>,
}

impl Default for GuildPropertyAllowlist {
    fn default() -> Self {
        Self {
            revision: DEFAULT_GUILD_PROPERTIES_REVISION,
            fields: DEFAULT_GUILD_PROPERTY_FIELDS
                .iter()
                .map(|f| (*f).to_owned())
                .collect(),
        }
    }
}

impl GuildPropertyAllowlist {
    pub fn new(revision: u32, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            revision,
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}

// ─── GatewayConfig ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Rewrite READY payloads into the versioned shape.
    pub normalize_ready: bool,
    /// Operator bitmask applied on startup, as a decimal string.
    pub capabilities_override: Option<String>,
    pub guild_properties: GuildPropertyAllowlist,
}

impl GatewayConfig {
    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse config text. `capabilities_override` is validated here so a bad
    /// value fails at load time rather than on the first identify.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.capabilities_override()?;
        Ok(config)
    }

    /// The parsed override bitmask, if one is configured.
    pub fn capabilities_override(&self) -> Result<Option<u32>, ConfigError> {
        self.capabilities_override
            .as_deref()
            .map(CapabilityNegotiator::validate_str)
            .transpose()
            .map_err(ConfigError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_uses_defaults() {
        let config = GatewayConfig::from_toml_str("").expect("parse");
        assert!(!config.normalize_ready);
        assert!(config.capabilities_override.is_none());
        assert_eq!(config.guild_properties, GuildPropertyAllowlist::default());
        assert_eq!(
            config.guild_properties.revision,
            DEFAULT_GUILD_PROPERTIES_REVISION
        );
    }

    #[test]
    fn default_allowlist_keeps_name_at_top_level() {
        let allowlist = GuildPropertyAllowlist::default();
        assert!(allowlist.contains("id"));
        assert!(allowlist.contains("member_count"));
        assert!(!allowlist.contains("name"));
        assert!(!allowlist.contains("properties"));
    }

    #[test]
    fn full_config_parses() {
        let text = r#"
normalize_ready = true
capabilities_override = "16381"

[guild_properties]
revision = 2
fields = ["id", "roles"]
"#;
        let config = GatewayConfig::from_toml_str(text).expect("parse");
        assert!(config.normalize_ready);
        assert_eq!(config.capabilities_override().expect("valid"), Some(16381));
        assert_eq!(
            config.guild_properties,
            GuildPropertyAllowlist::new(2, ["id", "roles"])
        );
    }

    #[test]
    fn partial_allowlist_table_fills_defaults() {
        let config =
            GatewayConfig::from_toml_str("[guild_properties]\nrevision = 3\n").expect("parse");
        assert_eq!(config.guild_properties.revision, 3);
        assert!(config.guild_properties.contains("voice_states"));
    }

    #[test]
    fn invalid_override_fails_at_load() {
        let err = GatewayConfig::from_toml_str("capabilities_override = \"-5\"")
            .expect_err("negative override must be rejected");
        assert!(matches!(err, ConfigError::InvalidCapabilities(_)));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = GatewayConfig::from_toml_str("normalize_ready = ").expect_err("bad toml");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "normalize_ready = true").expect("write");
        let config = GatewayConfig::load(file.path()).expect("load");
        assert!(config.normalize_ready);
    }

    #[test]
    fn sample_config_fixture_loads() {
        let path = std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../fixtures/config/gwtap.toml");
        let config = GatewayConfig::load(&path).expect("fixture parses");
        assert!(config.normalize_ready);
        assert_eq!(config.capabilities_override().expect("valid"), None);
        assert!(config.guild_properties.contains("voice_states"));
        assert!(!config.guild_properties.contains("threads"));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("absent.toml");
        let err = GatewayConfig::load(&path).expect_err("missing");
        let ConfigError::Io { path: reported, source } = &err else {
            panic!("expected io error, got {err:?}");
        };
        assert_eq!(reported, &path);
        // The io cause is chained, not repeated in the message.
        assert!(!err.to_string().contains(&source.to_string()));
        assert!(std::error::Error::source(&err).is_some());
    }
}
