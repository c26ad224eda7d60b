//! Storehouse CLI - Database migrations and demo data.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! sh-cli migrate
//!
//! # Load demo categories and products
//! sh-cli seed crates/cli/data/demo.yaml
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `seed` - Insert categories and products from a YAML file

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "sh-cli")]
#[command(author, version, about = "Storehouse CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations
    Migrate,
    /// Seed categories and products from a YAML file
    Seed {
        /// Path to the seed file
        file: PathBuf,

        /// Validate the file without touching the database
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::storefront().await?,
        Commands::Seed { file, dry_run } => commands::seed::run(&file, dry_run).await?,
    }
    Ok(())
}
