//! Kestrel CLI - database migrations and operator tools.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! kestrel-cli migrate
//!
//! # Load the demo catalog
//! kestrel-cli seed products --file crates/cli/seed/products.yaml
//!
//! # Sign a webhook payload for a local delivery
//! kestrel-cli webhook sign --payload event.json
//!
//! # Show the totals the store would charge
//! kestrel-cli quote --subtotal 120.00
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `seed products` - Upsert products from a YAML file
//! - `webhook sign` - Produce a signature header for a payload
//! - `quote` - Print a totals breakdown

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

mod commands;

#[derive(Parser)]
#[command(name = "kestrel-cli")]
#[command(author, version, about = "Kestrel CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Seed the database
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
    /// Webhook testing helpers
    Webhook {
        #[command(subcommand)]
        action: WebhookAction,
    },
    /// Print the totals charged for a subtotal or a gross amount
    Quote {
        /// Product subtotal in the store currency (e.g. 120.00)
        #[arg(long, conflicts_with = "gross_minor")]
        subtotal: Option<Decimal>,

        /// Charged amount in minor units (reverse VAT split)
        #[arg(long)]
        gross_minor: Option<i64>,
    },
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Upsert catalog products from a YAML file
    Products {
        /// Path to the products file
        #[arg(short, long, default_value = "crates/cli/seed/products.yaml")]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum WebhookAction {
    /// Print a signature header for a payload file
    Sign {
        /// File containing the exact request body
        #[arg(short, long)]
        payload: PathBuf,

        /// Signing secret (defaults to `PAYMENT_WEBHOOK_SECRET`)
        #[arg(short, long)]
        secret: Option<String>,

        /// Unix timestamp to sign with (defaults to now)
        #[arg(short, long)]
        timestamp: Option<i64>,
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
        Commands::Webhook { action } => match action {
            WebhookAction::Sign {
                payload,
                secret,
                timestamp,
            } => commands::webhook::sign(&payload, secret, timestamp).await?,
        },
        Commands::Quote {
            subtotal,
            gross_minor,
        } => commands::quote::run(subtotal, gross_minor)?,
    }
    Ok(())
}
