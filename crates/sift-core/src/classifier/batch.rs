//! Bounded-concurrency batch classification
//!
//! Work items run as tasks on a [`JoinSet`], each holding a permit from a
//! shared [`Semaphore`] while it talks to the provider. Results are written
//! into a slot per input position, so output order always matches input
//! order regardless of completion order. Every task finishes before errors
//! are inspected.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{classification_error, prompt, Classifier};
use crate::ai::{AIBackend, MerchantRankings};
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::models::{Category, LlmSuggestion, MerchantSummary, Transaction};

/// Pool size used when the configured concurrency is zero
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Merchants per provider call when the configured size is zero
pub const DEFAULT_MERCHANT_BATCH_SIZE: usize = 10;

/// Wait for a pool slot, giving up if the context ends first
async fn acquire(ctx: &RequestContext, pool: Arc<Semaphore>) -> Result<OwnedSemaphorePermit> {
    tokio::select! {
        permit = pool.acquire_owned() => {
            permit.map_err(|e| Error::Task(format!("worker pool closed: {}", e)))
        }
        err = ctx.done() => Err(err),
    }
}

/// Drain a join set into per-position slots
///
/// A panicked or aborted task is reported after all others finish.
async fn collect<T: 'static>(
    mut tasks: JoinSet<(usize, Result<T>)>,
    len: usize,
) -> Result<Vec<Result<T>>> {
    let mut slots: Vec<Option<Result<T>>> = (0..len).map(|_| None).collect();
    let mut join_error = None;

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(e) => {
                warn!(error = %e, "Batch worker failed");
                join_error.get_or_insert(e);
            }
        }
    }

    if let Some(e) = join_error {
        return Err(Error::Task(e.to_string()));
    }

    slots
        .into_iter()
        .map(|slot| slot.ok_or_else(|| Error::Task("batch worker produced no result".into())))
        .collect()
}

impl Classifier {
    fn pool_size(&self) -> usize {
        match self.batch.concurrency {
            0 => DEFAULT_CONCURRENCY,
            n => n,
        }
    }

    /// Classify many transactions, returning suggestions in input order
    ///
    /// On failure the first error in input order is returned, naming the
    /// transaction it came from.
    pub async fn batch_suggest_categories(
        &self,
        ctx: &RequestContext,
        transactions: &[Transaction],
        categories: &[Category],
    ) -> Result<Vec<LlmSuggestion>> {
        if transactions.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let pool = Arc::new(Semaphore::new(self.pool_size()));
        let categories: Arc<[Category]> = categories.into();
        let mut tasks = JoinSet::new();

        for (index, transaction) in transactions.iter().cloned().enumerate() {
            let classifier = self.clone();
            let ctx = ctx.clone();
            let pool = pool.clone();
            let categories = categories.clone();

            tasks.spawn(async move {
                let result = match acquire(&ctx, pool).await {
                    Ok(_permit) => {
                        classifier
                            .suggest_category(&ctx, &transaction, &categories)
                            .await
                    }
                    Err(err) => Err(err),
                };
                (index, result)
            });
        }

        let results = collect(tasks, transactions.len()).await?;

        let mut suggestions = Vec::with_capacity(results.len());
        for (transaction, result) in transactions.iter().zip(results) {
            match result {
                Ok(suggestion) => suggestions.push(suggestion),
                Err(err) => {
                    warn!(transaction = %transaction.id, error = %err, "Batch classification failed");
                    return Err(Error::Batch {
                        transaction_id: transaction.id.clone(),
                        source: Box::new(err),
                    });
                }
            }
        }

        info!(
            count = suggestions.len(),
            workers = self.pool_size(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch classification complete"
        );
        Ok(suggestions)
    }

    /// Rank categories for merchants, several merchants per provider call
    ///
    /// Every input merchant gets an entry. A merchant the provider skipped or
    /// answered with unusable rankings gets an empty list; a chunk whose call
    /// fails outright fails the batch.
    pub async fn classify_merchant_batch(
        &self,
        ctx: &RequestContext,
        merchants: &[MerchantSummary],
        categories: &[Category],
    ) -> Result<MerchantRankings> {
        let chunk_size = match self.batch.merchant_batch_size {
            0 => DEFAULT_MERCHANT_BATCH_SIZE,
            n => n,
        };
        let chunks: Vec<Vec<MerchantSummary>> =
            merchants.chunks(chunk_size).map(<[_]>::to_vec).collect();
        if chunks.is_empty() {
            return Ok(MerchantRankings::new());
        }

        let started = Instant::now();
        let pool = Arc::new(Semaphore::new(self.pool_size()));
        let mut tasks = JoinSet::new();

        for (index, chunk) in chunks.iter().cloned().enumerate() {
            let classifier = self.clone();
            let ctx = ctx.clone();
            let pool = pool.clone();
            let prompt = prompt::merchant_batch_prompt(&chunk, categories);

            tasks.spawn(async move {
                let result = match acquire(&ctx, pool).await {
                    Ok(_permit) => {
                        let client = &*classifier.client;
                        let prompt = &prompt;
                        classifier
                            .call(&ctx, move |ctx| async move {
                                client.classify_merchant_batch(&ctx, prompt).await
                            })
                            .await
                            .map_err(classification_error)
                    }
                    Err(err) => Err(err),
                };
                (index, result)
            });
        }

        let results = collect(tasks, chunks.len()).await?;

        let mut rankings = MerchantRankings::new();
        for (chunk, result) in chunks.iter().zip(results) {
            let mut parsed = result?;
            for merchant in chunk {
                let entry = parsed.remove(&merchant.merchant_id).unwrap_or_else(|| {
                    debug!(merchant = %merchant.merchant_id, "Merchant missing from batch response");
                    Vec::new()
                });
                rankings.insert(merchant.merchant_id.clone(), entry);
            }
        }

        info!(
            merchants = rankings.len(),
            calls = chunks.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Merchant batch classification complete"
        );
        Ok(rankings)
    }
}
