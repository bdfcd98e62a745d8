//! `gwtap normalize`: run the READY normalizer over a payload.

use std::path::Path;

use anyhow::Context;
use gwtap_gateway::config::GatewayConfig;
use gwtap_gateway::normalizer::SchemaNormalizer;
use serde_json::Value;

use crate::input;

pub async fn cmd_normalize(config: &GatewayConfig, file: Option<&Path>) -> anyhow::Result<()> {
    let text = input::read_to_string(file).await?;
    let mut payload: Value = serde_json::from_str(&text).context("input is not valid JSON")?;

    let normalizer = SchemaNormalizer::new(config.guild_properties.clone());
    let report = normalizer.normalize_ready(ready_data(&mut payload));

    for malformed in &report.malformed {
        tracing::warn!(path = %malformed.path, reason = malformed.reason, "left unnormalized");
    }
    eprintln!(
        "allowlist revision {}: read_state: {:?}, user_guild_settings: {:?}, guilds partitioned: {}, already nested: {}",
        normalizer.allowlist().revision,
        report.read_state,
        report.user_guild_settings,
        report.guilds_partitioned,
        report.guilds_already_nested
    );
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

/// Accept either a bare READY `d` object or a whole dispatch frame.
fn ready_data(payload: &mut Value) -> &mut Value {
    let is_frame = payload.get("t").and_then(Value::as_str) == Some("READY")
        && payload.get("d").is_some_and(Value::is_object);
    if is_frame {
        &mut payload["d"]
    } else {
        payload
    }
}
