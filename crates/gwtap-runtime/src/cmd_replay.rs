//! `gwtap replay`: stream a session log through the interception pipeline.

use std::sync::Arc;

use gwtap_core::CapabilityNegotiator;
use gwtap_gateway::config::GatewayConfig;
use gwtap_gateway::observer::{ConnectionStateObserver, TracingSink};
use gwtap_gateway::pipeline::InterceptionPipeline;
use gwtap_gateway::replay::{self, ReplaySession};
use tokio::io::AsyncBufReadExt;

use crate::cli::ReplayOpts;
use crate::input;

pub async fn cmd_replay(config: &GatewayConfig, opts: &ReplayOpts) -> anyhow::Result<()> {
    let mut session = build_session(config, opts.normalize)?;

    let mut lines = input::open_lines(opts.file.as_deref()).await?.lines();
    let mut line_no = 0;
    let mut frames = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let Some(frame) = replay::parse_frame(line_no, &line)? else {
            continue;
        };
        let output = session.apply(frame);
        println!("{}", serde_json::to_string(&output)?);
        frames += 1;
    }

    tracing::info!(
        frames,
        capabilities = ?session.pipeline().negotiator().get(),
        state = ?session.observer().current(),
        "replay finished"
    );
    Ok(())
}

fn build_session(config: &GatewayConfig, force_normalize: bool) -> anyhow::Result<ReplaySession> {
    let negotiator = Arc::new(CapabilityNegotiator::new());
    if let Some(mask) = config.capabilities_override()? {
        negotiator.set_raw(i64::from(mask))?;
        tracing::info!(capabilities = mask, "applied configured capability override");
    }

    let mut pipeline = InterceptionPipeline::new(negotiator, config);
    if force_normalize {
        pipeline.set_normalize_ready(true);
    }
    let observer = ConnectionStateObserver::new(Box::new(TracingSink));
    Ok(ReplaySession::new(pipeline, observer))
}
