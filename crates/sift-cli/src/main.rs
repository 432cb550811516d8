//! Sift CLI - LLM-backed transaction categorization
//!
//! Usage:
//!   sift init                                   Initialize database
//!   sift classify --merchant NAME --amount N    Classify one transaction
//!   sift batch --file transactions.json         Classify a file of transactions
//!   sift backend                                Check the AI backend

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use sift_core::{AIBackend, Transaction};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = cli.config.as_deref();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db),
        Commands::Categories { action } => {
            let db = commands::open_db(&cli.db)?;
            match action {
                None | Some(CategoriesAction::List) => commands::cmd_categories_list(&db),
                Some(CategoriesAction::Add { name, description }) => {
                    commands::cmd_categories_add(&db, &name, &description)
                }
            }
        }
        Commands::Patterns { action } => {
            let db = commands::open_db(&cli.db)?;
            match action {
                None | Some(PatternsAction::List) => commands::cmd_patterns_list(&db),
                Some(PatternsAction::Add {
                    name,
                    category,
                    boost,
                    amount_min,
                    amount_max,
                    check_number,
                    merchant,
                }) => commands::cmd_patterns_add(
                    &db,
                    &name,
                    &category,
                    boost,
                    amount_min,
                    amount_max,
                    check_number.as_deref(),
                    merchant.as_deref(),
                )
                .map(|_| ()),
                Some(PatternsAction::Disable { id }) => {
                    commands::cmd_patterns_set_active(&db, id, false)
                }
                Some(PatternsAction::Enable { id }) => {
                    commands::cmd_patterns_set_active(&db, id, true)
                }
            }
        }
        Commands::Classify {
            merchant,
            amount,
            date,
            description,
            tx_type,
            check_number,
            json,
        } => {
            let db = commands::open_db(&cli.db)?;
            let classifier = commands::build_classifier(config)?;
            let ctx = commands::interruptible_context();

            let date = date.unwrap_or_else(|| Local::now().date_naive());
            let mut tx = Transaction::new("cli", &merchant, amount, date);
            if let Some(description) = description {
                tx.description = description;
            }
            tx.tx_type = tx_type;
            tx.check_number = check_number;
            tx.hash = tx.compute_hash();

            let result = commands::cmd_classify(&ctx, &db, &classifier, &tx, json).await;
            classifier.close();
            result.map(|_| ())
        }
        Commands::Batch {
            file,
            merchants,
            json,
        } => {
            let db = commands::open_db(&cli.db)?;
            let classifier = commands::build_classifier(config)?;
            let ctx = commands::interruptible_context();
            let result =
                commands::cmd_batch(&ctx, &db, &classifier, &file, merchants, json).await;
            classifier.close();
            result.map(|_| ())
        }
        Commands::Describe {
            category,
            examples,
            save,
        } => {
            let db = commands::open_db(&cli.db)?;
            let classifier = commands::build_classifier(config)?;
            let ctx = commands::interruptible_context();
            let result =
                commands::cmd_describe(&ctx, &db, &classifier, &category, &examples, save).await;
            classifier.close();
            result.map(|_| ())
        }
        Commands::Backend => {
            let client = commands::ai_client()?;
            if !commands::cmd_backend(&client).await? {
                anyhow::bail!("AI backend at {} is not responding", client.host());
            }
            Ok(())
        }
    }
}
