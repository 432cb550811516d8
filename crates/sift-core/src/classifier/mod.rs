//! Classification orchestration
//!
//! The [`Classifier`] wraps an [`AIClient`] with the machinery that makes
//! provider output usable: every call waits on the rate limiter and runs
//! under the retry policy, responses are parsed into ranked categories,
//! check-pattern boosts are applied, and the top suggestion is cached by
//! transaction fingerprint.
//!
//! Clones share the client, limiter, and cache.

mod batch;
pub mod prompt;

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info};

use crate::ai::{AIBackend, AIClient, DescriptionResult};
use crate::cache::SuggestionCache;
use crate::config::{BatchConfig, SiftConfig};
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::models::{Category, CategoryRankings, CheckPattern, LlmSuggestion, Transaction};
use crate::patch::{apply_patches, parse_path, parse_patch_list};
use crate::ratelimit::RateLimiter;
use crate::retry::{retry, RetryOptions};

#[derive(Clone)]
pub struct Classifier {
    client: Arc<AIClient>,
    limiter: Arc<RateLimiter>,
    cache: Arc<SuggestionCache>,
    retry: RetryOptions,
    batch: BatchConfig,
}

impl Classifier {
    /// Build a classifier from loaded configuration.
    ///
    /// Must be called within a Tokio runtime: the limiter and cache spawn
    /// their background tasks here.
    pub fn new(client: AIClient, config: &SiftConfig) -> Self {
        let limiter = RateLimiter::new(config.rate_limit.requests_per_minute);
        let cache =
            SuggestionCache::with_sweep_interval(config.cache.ttl(), config.cache.sweep_interval());
        Self::with_components(
            client,
            limiter,
            cache,
            config.retry.clone(),
            config.batch.clone(),
        )
    }

    /// Build a classifier with the embedded default configuration
    pub fn with_defaults(client: AIClient) -> Self {
        Self::new(client, &SiftConfig::default())
    }

    /// Build a classifier around existing components
    pub fn with_components(
        client: AIClient,
        limiter: RateLimiter,
        cache: SuggestionCache,
        retry: RetryOptions,
        batch: BatchConfig,
    ) -> Self {
        info!(
            backend = client.kind(),
            model = client.model(),
            rate = limiter.capacity(),
            max_attempts = retry.max_attempts,
            "Classifier ready"
        );
        Self {
            client: Arc::new(client),
            limiter: Arc::new(limiter),
            cache: Arc::new(cache),
            retry,
            batch,
        }
    }

    pub fn client(&self) -> &AIClient {
        &self.client
    }

    pub fn cache(&self) -> &SuggestionCache {
        &self.cache
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn retry_options(&self) -> &RetryOptions {
        &self.retry
    }

    pub fn batch_config(&self) -> &BatchConfig {
        &self.batch
    }

    /// Stop the limiter refill and cache sweep tasks
    pub fn close(&self) {
        self.limiter.close();
        self.cache.close();
    }

    /// Run one provider operation, rate-limited and retried.
    ///
    /// Each attempt waits for a limiter token first. Every provider failure
    /// except cancellation is retried; limiter errors are not.
    async fn call<T, F, Fut>(&self, ctx: &RequestContext, op: F) -> Result<T>
    where
        F: Fn(RequestContext) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let limiter = &*self.limiter;
        let op = &op;
        retry(ctx, &self.retry, move |ctx| async move {
            limiter.wait(&ctx).await?;
            op(ctx).await.map_err(|err| {
                if err.is_cancelled() {
                    err
                } else {
                    Error::retryable(err)
                }
            })
        })
        .await
    }

    /// Ranked categories for one transaction
    ///
    /// A cached suggestion comes back as a one-element list without touching
    /// the limiter or the provider. Otherwise the provider ranks every
    /// supplied category, each supplied active pattern's boost is added to
    /// the ranking it targets, and the top ranking is cached.
    ///
    /// With no categories the provider is asked to propose one; the result
    /// (possibly empty) is returned without being cached.
    pub async fn suggest_category_rankings(
        &self,
        ctx: &RequestContext,
        transaction: &Transaction,
        categories: &[Category],
        check_patterns: &[CheckPattern],
    ) -> Result<CategoryRankings> {
        let key = cache_key(transaction);
        if let Some(hit) = self.cache.get(&key) {
            debug!(transaction = %transaction.id, category = %hit.category, "Suggestion cache hit");
            return Ok(hit.to_rankings());
        }

        let active: Vec<CheckPattern> = check_patterns
            .iter()
            .filter(|p| p.active)
            .cloned()
            .collect();
        let prompt = &prompt::rankings_prompt(transaction, categories, &active);
        let client = &*self.client;

        if categories.is_empty() {
            let rankings = self
                .call(ctx, move |ctx| async move {
                    match client.classify_with_rankings(&ctx, prompt).await {
                        Err(Error::NoRankings) => Ok(CategoryRankings::default()),
                        other => other,
                    }
                })
                .await
                .map_err(classification_error)?;
            debug!(
                transaction = %transaction.id,
                proposed = rankings.top().map(|r| r.category.as_str()).unwrap_or(""),
                "No categories supplied, provider proposed"
            );
            return Ok(rankings);
        }

        let mut rankings = self
            .call(ctx, move |ctx| async move {
                client.classify_with_rankings(&ctx, prompt).await
            })
            .await
            .map_err(classification_error)?;

        rankings.apply_check_patterns(&active);

        let top = rankings.top().ok_or(Error::NoRankings)?;
        debug!(
            transaction = %transaction.id,
            category = %top.category,
            score = top.score,
            rankings = rankings.len(),
            "Classified transaction"
        );
        self.cache
            .set(&key, LlmSuggestion::from_ranking(&transaction.id, top));

        Ok(rankings)
    }

    /// Single best category for a transaction
    pub async fn suggest_category(
        &self,
        ctx: &RequestContext,
        transaction: &Transaction,
        categories: &[Category],
    ) -> Result<LlmSuggestion> {
        let rankings = self
            .suggest_category_rankings(ctx, transaction, categories, &[])
            .await?;
        let top = rankings.top().ok_or(Error::NoRankings)?;
        Ok(LlmSuggestion::from_ranking(&transaction.id, top))
    }

    /// Describe a category, using example transaction texts as context
    pub async fn generate_category_description(
        &self,
        ctx: &RequestContext,
        name: &str,
        examples: &[String],
    ) -> Result<DescriptionResult> {
        if name.trim().is_empty() {
            return Err(Error::InvalidData("category name is empty".into()));
        }
        let prompt = &prompt::description_prompt(name, examples);
        let client = &*self.client;
        self.call(ctx, move |ctx| async move {
            client.generate_description(&ctx, prompt).await
        })
        .await
    }

    /// Free-form analysis call; returns the provider's raw text
    pub async fn analyze(
        &self,
        ctx: &RequestContext,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<String> {
        let client = &*self.client;
        self.call(ctx, move |ctx| async move {
            client.analyze(&ctx, prompt, system_prompt).await
        })
        .await
    }

    /// Ask the provider to repair one field of a JSON document
    ///
    /// The provider returns a patch list which is applied in order; the
    /// patched document is returned as compact JSON.
    pub async fn correct_field(
        &self,
        ctx: &RequestContext,
        document: &str,
        field_path: &str,
        problem: &str,
    ) -> Result<String> {
        parse_path(field_path)?;
        let _: serde_json::Value = serde_json::from_str(document)?;

        let prompt = &prompt::correct_field_prompt(document, field_path, problem);
        let client = &*self.client;
        let patches = self
            .call(ctx, move |ctx| async move {
                let raw = client.complete(&ctx, prompt).await?;
                parse_patch_list(&raw)
            })
            .await?;

        debug!(field = field_path, patches = patches.len(), "Applying field correction");
        apply_patches(document, &patches)
    }
}

/// Cache slot for a transaction: its fingerprint, computed if missing
fn cache_key(transaction: &Transaction) -> String {
    if transaction.hash.is_empty() {
        transaction.compute_hash()
    } else {
        transaction.hash.clone()
    }
}

/// Final error for a failed classification call
///
/// Cancellation, a closed limiter, and unparseable output come back as-is;
/// provider failures are wrapped.
fn classification_error(err: Error) -> Error {
    match err.into_inner() {
        err @ (Error::Cancelled(_) | Error::Closed(_) | Error::NoRankings) => err,
        err => Error::ClassificationFailed(Box::new(err)),
    }
}
