//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// Sift - Categorize transactions with a local or hosted LLM
#[derive(Parser)]
#[command(name = "sift")]
#[command(about = "LLM-backed transaction categorization", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "sift.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (defaults to the data-dir override, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database and seed default categories
    Init,

    /// Manage categories (list, add)
    Categories {
        #[command(subcommand)]
        action: Option<CategoriesAction>,
    },

    /// Manage check patterns (list, add, disable, enable)
    Patterns {
        #[command(subcommand)]
        action: Option<PatternsAction>,
    },

    /// Classify a single transaction
    Classify {
        /// Merchant name as it appears on the statement
        #[arg(long)]
        merchant: String,

        /// Amount (negative for expenses)
        #[arg(long, allow_hyphen_values = true)]
        amount: f64,

        /// Transaction date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Raw bank description (default: merchant)
        #[arg(long)]
        description: Option<String>,

        /// Bank transaction type (DEBIT, CREDIT, CHECK, ...)
        #[arg(long = "type")]
        tx_type: Option<String>,

        /// Check number, for check transactions
        #[arg(long)]
        check_number: Option<String>,

        /// Print the rankings as JSON
        #[arg(long)]
        json: bool,
    },

    /// Classify a JSON file of transactions
    Batch {
        /// JSON array of transactions
        #[arg(long, short)]
        file: PathBuf,

        /// Group by merchant and classify merchants instead of transactions
        #[arg(long)]
        merchants: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate a description for a category
    Describe {
        /// Category name
        category: String,

        /// Example transaction text (repeatable)
        #[arg(long = "example")]
        examples: Vec<String>,

        /// Save the description to the category
        #[arg(long)]
        save: bool,
    },

    /// Show the configured AI backend and check that it responds
    Backend,
}

#[derive(Subcommand)]
pub enum CategoriesAction {
    /// List categories
    List,

    /// Add a category, or update its description
    Add {
        /// Category name
        name: String,
        /// Description shown to the model
        #[arg(long, default_value = "")]
        description: String,
    },
}

#[derive(Subcommand)]
pub enum PatternsAction {
    /// List check patterns
    List,

    /// Add a check pattern
    Add {
        /// Pattern name
        #[arg(long)]
        name: String,
        /// Category to boost
        #[arg(long)]
        category: String,
        /// Amount added to the category's score (0.0-1.0)
        #[arg(long)]
        boost: f64,
        /// Minimum absolute amount
        #[arg(long)]
        amount_min: Option<f64>,
        /// Maximum absolute amount
        #[arg(long)]
        amount_max: Option<f64>,
        /// Regex matched against the check number
        #[arg(long)]
        check_number: Option<String>,
        /// Merchant substrings (pipe-separated, e.g., "CITY WATER|PG&E")
        #[arg(long)]
        merchant: Option<String>,
    },

    /// Disable a check pattern
    Disable {
        /// Pattern ID
        id: i64,
    },

    /// Re-enable a check pattern
    Enable {
        /// Pattern ID
        id: i64,
    },
}
