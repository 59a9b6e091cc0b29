//! CLI argument definitions for the wavestate binary.

use clap::{Parser, Subcommand};
use wavestate::constants::{DEFAULT_CHANCE, DEFAULT_ID_LENGTH};

/// Replicated object graphs over a loopback transport
#[derive(Parser, Debug)]
#[command(name = "wavestate")]
#[command(about = "wavestate: replicated key-value objects and ordered lists")]
#[command(version)]
pub struct Cli {
    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replicate a chat-style ordered list between two engines
    Chat(ChatArgs),
    /// Generate position keys between optional bounds
    Position(PositionArgs),
}

/// Arguments for the chat command
#[derive(clap::Args, Debug)]
pub struct ChatArgs {
    /// Messages to insert, in order
    #[arg(default_values = ["hello", "how are you?", "bye"])]
    pub messages: Vec<String>,

    /// Insert every second message from the other replica
    #[arg(long)]
    pub alternate: bool,

    /// Insert each message at the front of the list instead of the end
    #[arg(long)]
    pub prepend: bool,

    /// Length of generated object ids
    #[arg(long, default_value_t = DEFAULT_ID_LENGTH, env = "WAVESTATE_ID_LENGTH")]
    pub id_length: usize,
}

/// Arguments for the position command
#[derive(clap::Args, Debug)]
pub struct PositionArgs {
    /// Number of keys to generate
    #[arg(short = 'n', long, default_value_t = 5)]
    pub count: usize,

    /// Exclusive lower bound
    #[arg(long)]
    pub min: Option<String>,

    /// Exclusive upper bound
    #[arg(long)]
    pub max: Option<String>,

    /// Collision-probability denominator
    #[arg(long, default_value_t = DEFAULT_CHANCE, env = "WAVESTATE_CHANCE")]
    pub chance: u64,

    /// Seed for reproducible output
    #[arg(long)]
    pub seed: Option<u64>,
}
