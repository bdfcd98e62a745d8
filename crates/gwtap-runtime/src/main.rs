//! gwtap: operator and diagnostics CLI for the gateway interception layer.

use anyhow::Context;
use clap::Parser;
use gwtap_gateway::config::GatewayConfig;

mod cli;
mod cmd_caps;
mod cmd_normalize;
mod cmd_replay;
mod cmd_trace;
mod input;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("GWTAP_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => GatewayConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => GatewayConfig::default(),
    };

    match args.command {
        cli::Command::Caps(cmd) => cmd_caps::cmd_caps(cmd)?,
        cli::Command::Normalize(opts) => {
            cmd_normalize::cmd_normalize(&config, opts.file.as_deref()).await?;
        }
        cli::Command::Trace(opts) => cmd_trace::cmd_trace(opts.file.as_deref()).await?,
        cli::Command::Replay(opts) => cmd_replay::cmd_replay(&config, &opts).await?,
    }

    Ok(())
}
