//! Classification command implementations

use std::path::Path;

use anyhow::{Context, Result};
use sift_core::{
    CategoryRankings, Classifier, DescriptionResult, LlmSuggestion, MerchantRankings,
    MerchantSummary, RequestContext, SqliteStorage, Storage, Transaction,
};
use tracing::info;

use super::truncate;

/// Classify one transaction against the stored categories and patterns
pub async fn cmd_classify(
    ctx: &RequestContext,
    db: &SqliteStorage,
    classifier: &Classifier,
    transaction: &Transaction,
    json: bool,
) -> Result<CategoryRankings> {
    let categories = db.get_categories()?;
    if categories.is_empty() {
        println!("⚠️  No categories found; asking the model to propose one.");
    }
    let patterns = db.get_matching_check_patterns(transaction)?;
    if !patterns.is_empty() {
        info!(count = patterns.len(), "Check patterns matched");
    }

    let rankings = classifier
        .suggest_category_rankings(ctx, transaction, &categories, &patterns)
        .await
        .context("Classification failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rankings)?);
        return Ok(rankings);
    }

    println!();
    println!(
        "🏷️  {} ({:.2})",
        truncate(&transaction.merchant_name, 40),
        transaction.amount
    );
    println!("   ─────────────────────────────────────────────────────────────");
    if rankings.is_empty() {
        println!("   No suggestion");
    }
    let top = rankings.top().map(|r| r.category.clone());
    for ranking in &rankings {
        let marker = if Some(&ranking.category) == top.as_ref() {
            "→"
        } else {
            " "
        };
        let new = if ranking.is_new { " (new)" } else { "" };
        println!(
            "   {} {:<24} {:>5.1}%{}",
            marker,
            ranking.category,
            ranking.score * 100.0,
            new
        );
        if ranking.is_new && !ranking.description.is_empty() {
            println!("     {}", truncate(&ranking.description, 60));
        }
    }

    Ok(rankings)
}

/// Result of a batch run
#[derive(Debug)]
pub enum BatchOutput {
    Transactions(Vec<LlmSuggestion>),
    Merchants(MerchantRankings),
}

fn read_transactions(file: &Path) -> Result<Vec<Transaction>> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let mut transactions: Vec<Transaction> = serde_json::from_str(&content)
        .with_context(|| format!("Invalid transactions JSON in {}", file.display()))?;
    for tx in &mut transactions {
        tx.ensure_hash();
    }
    Ok(transactions)
}

/// Classify every transaction in a JSON file, or every merchant in it
pub async fn cmd_batch(
    ctx: &RequestContext,
    db: &SqliteStorage,
    classifier: &Classifier,
    file: &Path,
    merchants: bool,
    json: bool,
) -> Result<BatchOutput> {
    let transactions = read_transactions(file)?;
    let categories = db.get_categories()?;
    println!(
        "🔄 Classifying {} transactions from {}...",
        transactions.len(),
        file.display()
    );

    if merchants {
        let summaries = MerchantSummary::from_transactions(&transactions);
        let rankings = classifier
            .classify_merchant_batch(ctx, &summaries, &categories)
            .await
            .context("Merchant batch classification failed")?;

        if json {
            println!("{}", serde_json::to_string_pretty(&rankings)?);
        } else {
            for summary in &summaries {
                let top = rankings
                    .get(&summary.merchant_id)
                    .and_then(|r| r.first())
                    .map(|r| format!("{} ({:.0}%)", r.category, r.score * 100.0))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "   {:<30} {:>3} tx  {}",
                    truncate(&summary.merchant_name, 30),
                    summary.transaction_count,
                    top
                );
            }
        }
        return Ok(BatchOutput::Merchants(rankings));
    }

    let suggestions = classifier
        .batch_suggest_categories(ctx, &transactions, &categories)
        .await
        .context("Batch classification failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&suggestions)?);
    } else {
        for (tx, suggestion) in transactions.iter().zip(&suggestions) {
            println!(
                "   {:<12} {:<30} {:<20} {:>5.1}%",
                truncate(&tx.id, 12),
                truncate(&tx.merchant_name, 30),
                suggestion.category,
                suggestion.confidence * 100.0
            );
        }
    }
    println!("✅ Classified {} transactions", suggestions.len());

    Ok(BatchOutput::Transactions(suggestions))
}

/// Generate a category description, optionally saving it
pub async fn cmd_describe(
    ctx: &RequestContext,
    db: &SqliteStorage,
    classifier: &Classifier,
    category: &str,
    examples: &[String],
    save: bool,
) -> Result<DescriptionResult> {
    let result = classifier
        .generate_category_description(ctx, category, examples)
        .await
        .with_context(|| format!("Failed to describe '{}'", category))?;

    println!("📝 {}: {}", category, result.description);
    println!("   confidence {:.0}%", result.confidence * 100.0);

    if save {
        db.add_category(category, &result.description)
            .with_context(|| format!("Failed to save description for '{}'", category))?;
        println!("✅ Saved");
    }

    Ok(result)
}
