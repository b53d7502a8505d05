//! Greenhouse CLI - Database migrations, catalog seeding and payment
//! reconciliation.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! greenhouse-cli migrate
//!
//! # Load the starter catalog
//! greenhouse-cli seed products --file crates/cli/seed/products.yaml
//!
//! # Settle orders stuck in `pending`
//! greenhouse-cli reconcile --older-than-minutes 60
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `seed products` - Insert catalog products from YAML
//! - `reconcile` - Settle stale pending orders against the gateway

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

use commands::CommandError;

#[derive(Parser)]
#[command(name = "greenhouse-cli")]
#[command(author, version, about = "Greenhouse CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations
    Migrate,
    /// Seed the database
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
    /// Settle orders left pending against the payment gateway
    Reconcile {
        /// Only orders pending for longer than this (default: configured TTL)
        #[arg(long)]
        older_than_minutes: Option<u64>,
    },
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Insert catalog products, skipping names that already exist
    Products {
        /// Path to the YAML product list
        #[arg(short, long, default_value = "crates/cli/seed/products.yaml")]
        file: PathBuf,
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

async fn run(cli: Cli) -> Result<(), CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await,
        Commands::Seed { target } => match target {
            SeedTarget::Products { file } => commands::seed::products(&file).await,
        },
        Commands::Reconcile { older_than_minutes } => {
            commands::reconcile::run(older_than_minutes).await
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_reconcile_age() {
        let cli = Cli::try_parse_from(["greenhouse-cli", "reconcile", "--older-than-minutes", "90"])
            .unwrap_or_else(|e| panic!("{e}"));
        assert!(matches!(
            cli.command,
            Commands::Reconcile {
                older_than_minutes: Some(90)
            }
        ));
    }
}
