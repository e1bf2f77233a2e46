//! CLI Command Definitions
//!
//! Command-line surface for the coil detector. Command handlers live in
//! main.rs; this module only declares the argument shapes.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Coil detector for Solana memecoin liquidity pools
#[derive(Parser, Debug)]
#[command(
    name = "scf-detector",
    version = env!("CARGO_PKG_VERSION"),
    about = "Coil detector for Solana memecoin liquidity pools",
    long_about = "Consumes normalized swap/liquidity/authority events, maintains per-pool \
                  rolling statistics, evaluates the five coil primitives and emits \
                  deduplicated trade signals on QUIET -> COIL -> ARMED -> ENTER."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the detector on JSONL events from stdin
    Run(RunCmd),

    /// Replay a JSONL event file on a virtual clock
    Replay(ReplayCmd),

    /// Generate a synthetic 30-minute coil scenario as JSONL
    GenStream(GenStreamCmd),

    /// Load and validate the configuration, then exit
    CheckConfig(CheckConfigCmd),
}

/// Run the detector against live piped input
#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Path to configuration file (defaults apply if absent)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// Replay a recorded or generated event file
#[derive(Parser, Debug)]
pub struct ReplayCmd {
    /// JSONL event file to replay
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Virtual tick cadence in seconds
    #[arg(long, default_value_t = 2.0)]
    pub tick_secs: f64,
}

/// Emit a synthetic scenario stream
#[derive(Parser, Debug)]
pub struct GenStreamCmd {
    /// Pool identifier to stamp on the events
    #[arg(long, default_value = "SCENARIO-POOL")]
    pub pool: String,

    /// Seed for size jitter; omit for the exact deterministic stream
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output file; stdout when absent
    #[arg(short, long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

/// Validate configuration
#[derive(Parser, Debug)]
pub struct CheckConfigCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}
