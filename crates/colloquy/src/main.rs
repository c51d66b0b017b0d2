use clap::Parser;
use eyre::Result;

use colloquy::cli::{Cli, Commands, ConfigCommands};
use colloquy::commands::{
    Command,
    config::{ConfigAction, ConfigCommand},
    replay::ReplayCommand,
};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // Before tracing, so RUST_LOG can come from .env
    let env_file = colloquy::cli::config::load_env()?;
    colloquy_core::utils::tracing::init_tracing()?;
    if let Some(path) = env_file {
        tracing::debug!(path = %path.display(), "Loaded .env");
    }

    match cli.command {
        Commands::Replay { events, json } => {
            let command = ReplayCommand {
                events,
                json,
                config_path: cli.config,
            };
            command.execute().await
        }
        Commands::Config { action } => {
            let command = ConfigCommand {
                action: match action {
                    ConfigCommands::Show => ConfigAction::Show,
                    ConfigCommands::Init { force } => ConfigAction::Init { force },
                },
                config_path: cli.config,
            };
            command.execute().await
        }
    }
}
