//! Sift Core Library
//!
//! Orchestration for LLM-backed transaction categorization:
//! - Pluggable AI backends (Ollama, OpenAI-compatible servers, the claude CLI)
//! - Robust parsing of free-form model output into ranked categories
//! - Token-bucket rate limiting, retry with backoff, and a TTL suggestion cache
//! - Check-pattern confidence boosts
//! - Bounded-concurrency batch classification
//! - Path-addressed JSON patches for field corrections
//! - SQLite storage for categories and check patterns

pub mod ai;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod models;
pub mod patch;
pub mod ratelimit;
pub mod retry;
pub mod storage;

/// Test utilities including mock Ollama server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{
    clean_markdown_wrapper, AIBackend, AIClient, CallKind, ClaudeCliBackend, Classification,
    DescriptionResult, MerchantRankings, MockBackend, OllamaBackend, OpenAICompatibleBackend,
    Prompt,
};
pub use cache::SuggestionCache;
pub use classifier::Classifier;
pub use config::SiftConfig;
pub use context::RequestContext;
pub use error::{Error, Result};
pub use models::{
    Category, CategoryRanking, CategoryRankings, CheckPattern, LlmSuggestion, MerchantSummary,
    Transaction,
};
pub use patch::{apply_patches, Patch};
pub use ratelimit::RateLimiter;
pub use retry::{retry, RetryOptions};
pub use storage::{MemoryStorage, SqliteStorage, Storage};
