//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_config` - Resolve the classifier configuration
//! - `build_classifier` - Classifier over the environment-selected backend
//! - `cmd_init` - Initialize the database

use std::path::Path;

use anyhow::{Context, Result};
use sift_core::{AIBackend, AIClient, Classifier, RequestContext, SiftConfig, SqliteStorage};
use tracing::{debug, warn};

pub fn open_db(db_path: &Path) -> Result<SqliteStorage> {
    let path_str = db_path
        .to_str()
        .with_context(|| format!("Database path is not valid UTF-8: {}", db_path.display()))?;
    SqliteStorage::new(path_str).context("Failed to open database")
}

/// Explicit `--config` file, else the data-dir override or built-in defaults
pub fn load_config(config_path: Option<&Path>) -> Result<SiftConfig> {
    match config_path {
        Some(path) => SiftConfig::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => SiftConfig::load().context("Failed to load config"),
    }
}

/// AI client from `AI_BACKEND` and the backend's own variables
pub fn ai_client() -> Result<AIClient> {
    AIClient::from_env().context(
        "No AI backend configured. Set OLLAMA_HOST, or AI_BACKEND=openai_compatible with \
         OPENAI_COMPATIBLE_HOST, or AI_BACKEND=claude_cli",
    )
}

pub fn build_classifier(config_path: Option<&Path>) -> Result<Classifier> {
    let config = load_config(config_path)?;
    let client = ai_client()?;
    debug!(backend = client.kind(), host = client.host(), "Using AI backend");
    Ok(Classifier::new(client, &config))
}

/// Request context cancelled on Ctrl-C
pub fn interruptible_context() -> RequestContext {
    let ctx = RequestContext::new();
    let cancel = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight requests");
            cancel.cancel();
        }
    });
    ctx
}

pub fn cmd_init(db_path: &Path) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path)?;
    let added = db
        .seed_default_categories()
        .context("Failed to seed default categories")?;
    println!("   Seeded {} default categories", added);

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Point sift at a model: export OLLAMA_HOST=http://localhost:11434");
    println!("  2. Classify a transaction: sift classify --merchant \"STARBUCKS\" --amount -5.75");

    Ok(())
}
