//! Flowmazon CLI - Database migrations and maintenance tools.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! fm-cli migrate
//!
//! # Load catalog products from a YAML file
//! fm-cli seed products --file seeds/products.yaml
//!
//! # Delete anonymous carts untouched for 30 days
//! fm-cli carts prune --older-than-days 30
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `seed products` - Insert catalog products
//! - `carts prune` - Remove abandoned anonymous carts

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "fm-cli")]
#[command(author, version, about = "Flowmazon CLI tools")]
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
    /// Maintain shopping carts
    Carts {
        #[command(subcommand)]
        action: CartsAction,
    },
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Insert catalog products from a YAML file
    Products {
        /// Path to the YAML product list
        #[arg(short, long, default_value = "seeds/products.yaml")]
        file: String,
    },
}

#[derive(Subcommand)]
enum CartsAction {
    /// Delete anonymous carts not modified recently
    Prune {
        /// Age in days after which an anonymous cart is abandoned
        #[arg(long, default_value_t = commands::carts::DEFAULT_PRUNE_DAYS)]
        older_than_days: u32,
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
        Commands::Seed { target } => match target {
            SeedTarget::Products { file } => commands::seed::products(&file).await?,
        },
        Commands::Carts { action } => match action {
            CartsAction::Prune { older_than_days } => {
                commands::carts::prune(older_than_days).await?;
            }
        },
    }
    Ok(())
}
