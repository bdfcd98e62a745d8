//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gwtap", about = "gateway payload interception toolkit")]
pub struct Cli {
    /// Gateway config file (TOML)
    #[arg(long, short = 'c', global = true, env = "GWTAP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Inspect and edit capability bitmasks
    #[command(subcommand)]
    Caps(CapsCommand),
    /// Normalize a READY payload (JSON) and print it
    Normalize(InputOpts),
    /// Render a call trace (wire tuples or a `_trace` field)
    Trace(InputOpts),
    /// Replay a JSONL session log through the interception pipeline
    Replay(ReplayOpts),
}

#[derive(Subcommand)]
pub enum CapsCommand {
    /// List all 32 capability bits
    List {
        /// Mark the bits set in this decimal bitmask
        #[arg(long)]
        mask: Option<String>,
    },
    /// Check that text is a valid decimal bitmask
    Validate { text: String },
    /// Flip bits in a bitmask and print the result
    Toggle {
        mask: String,
        #[arg(required = true)]
        bits: Vec<u8>,
    },
}

#[derive(clap::Args)]
pub struct InputOpts {
    /// Input file (default: stdin)
    pub file: Option<PathBuf>,
}

#[derive(clap::Args)]
pub struct ReplayOpts {
    /// Session log (default: stdin)
    pub file: Option<PathBuf>,

    /// Normalize READY regardless of the config file
    #[arg(long)]
    pub normalize: bool,
}
