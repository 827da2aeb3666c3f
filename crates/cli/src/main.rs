//! Kado CLI - database migrations and marketplace management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! kado-cli migrate
//!
//! # Generate invitation codes
//! kado-cli invite generate --count 25
//!
//! # Ingest saved grading-service certificate lookups
//! kado-cli ingest certs/49390123.json
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "kado-cli")]
#[command(author, version, about = "Kado CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage invitation codes
    Invite {
        #[command(subcommand)]
        action: InviteAction,
    },
    /// Ingest grading-service certificate JSON
    Ingest {
        /// File holding one certificate response or an array of them
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum InviteAction {
    /// Generate new invitation codes and print them
    Generate {
        /// Number of codes to generate
        #[arg(short, long, default_value_t = 10)]
        count: usize,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Invite { action } => match action {
            InviteAction::Generate { count } => commands::invite::generate(count).await?,
        },
        Commands::Ingest { file } => commands::ingest::run(&file).await?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_invite_generate_parses_count() {
        let cli = Cli::try_parse_from(["kado-cli", "invite", "generate", "--count", "5"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Invite {
                action: InviteAction::Generate { count: 5 }
            })
        ));
    }
}
