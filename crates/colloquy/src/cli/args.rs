use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Inspect and replay Colloquy conversation logs.
#[derive(Parser)]
#[command(version, about, long_about = None, author)]
pub struct Cli {
    /// Engine config file (defaults to <config_dir>/colloquy/engine.toml)
    #[arg(long, env = "COLLOQUY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Rebuild the transcript of a conversation from an event dump
    Replay {
        /// JSON file holding either an array of events or a listed page
        /// (`{"events": [...], "order": "newest_first"}`)
        events: PathBuf,

        /// Print the transcript as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the engine config file
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective config
    Show,
    /// Write a default config with a fresh device id
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
