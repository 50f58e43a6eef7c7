//! Onclinic operator CLI
//!
//! Allocates identifiers, records stock movements and runs the inventory
//! reports against a local onclinic database. Every command prints JSON.

mod commands;

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use onclinic_core::{AppConfig, Database};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "onclinic")]
#[command(about = "Identifier allocation and stock ledger tool for onclinic")]
#[command(version)]
struct Cli {
    /// Configuration file (default: config/onclinic.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding the configured path
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reserve the next identifier in a category (clinic-bill, pharmacy-bill, prescription, patient)
    Allocate {
        category: String,

        /// Date the scope is computed for (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Inventory item management
    Item {
        #[command(subcommand)]
        command: ItemCommands,
    },

    /// Apply a signed stock change to an item (ID or SKU)
    Adjust {
        item: String,

        #[arg(allow_negative_numbers = true)]
        delta: i64,

        /// purchase, dispense, adjustment or correction
        reason: String,

        #[arg(long)]
        notes: Option<String>,

        /// Bill number the change belongs to
        #[arg(long)]
        bill: Option<String>,

        #[arg(long)]
        by: Option<String>,
    },

    /// Items at or below their low-stock threshold
    LowStock,

    /// Items expiring within N months
    Expiring {
        #[arg(long)]
        months: u32,

        /// Reference date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Compare every item's balance with its ledger
    Reconcile {
        /// Reset drifted balances to the ledger projection
        #[arg(long)]
        repair: bool,
    },

    /// Ledger entries for an item (ID or SKU)
    History { item: String },
}

#[derive(Subcommand)]
enum ItemCommands {
    /// Add an inventory item
    Add {
        #[arg(long)]
        name: String,

        #[arg(long)]
        sku: String,

        #[arg(long, default_value = "0")]
        opening_stock: i64,

        #[arg(long)]
        threshold: Option<i64>,

        /// YYYY-MM-DD
        #[arg(long)]
        expiry: Option<NaiveDate>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        manufacturer: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    }
}

/// Logs go to stderr so stdout stays valid JSON. `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run(cli: Cli) -> Result<String> {
    let mut config = AppConfig::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(path) = cli.database {
        config.database.path = path;
    }

    let db = Database::open_with_config(&config.database)
        .with_context(|| format!("failed to open database {}", config.database.path.display()))?;
    tracing::debug!(database = %config.database.path.display(), strategy = ?config.sequence.strategy, "database opened");
    let today = chrono::Local::now().date_naive();

    let output = match cli.command {
        Commands::Allocate { category, date } => {
            commands::allocate(&db, &config, &category, date.unwrap_or(today))?
        }
        Commands::Item { command } => match command {
            ItemCommands::Add {
                name,
                sku,
                opening_stock,
                threshold,
                expiry,
                category,
                manufacturer,
            } => commands::add_item(
                &db,
                &config,
                commands::ItemArgs {
                    name,
                    sku,
                    opening_stock,
                    threshold,
                    expiry,
                    category,
                    manufacturer,
                },
            )?,
        },
        Commands::Adjust {
            item,
            delta,
            reason,
            notes,
            bill,
            by,
        } => commands::adjust(&db, &config, &item, delta, &reason, notes, bill, by)?,
        Commands::LowStock => commands::low_stock(&db, &config)?,
        Commands::Expiring { months, date } => {
            commands::expiring(&db, &config, months, date.unwrap_or(today))?
        }
        Commands::Reconcile { repair } => commands::reconcile(&db, &config, repair)?,
        Commands::History { item } => commands::history(&db, &config, &item)?,
    };

    Ok(serde_json::to_string_pretty(&output)?)
}
