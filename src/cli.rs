//! Command-line interface

use std::path::PathBuf;

use clap::Parser;

/// Latency-aware external processor for LLM inference traffic
#[derive(Debug, Parser)]
#[command(name = "llm-inference-director", version, about)]
pub struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "EPP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the processing listen address
    #[arg(long)]
    pub listen: Option<String>,

    /// Override the latency predictor base URL
    #[arg(long)]
    pub predictor_url: Option<String>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON
    #[arg(long)]
    pub json: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}
