//! Pluggable AI backend abstraction
//!
//! This module provides a backend-agnostic interface for the provider calls
//! the classifier makes. Backends only know how to turn a [`Prompt`] into raw
//! text; the typed operations (rankings, merchant batches, descriptions) are
//! shared default methods that run the raw text through [`extract`] and
//! [`parsing`].
//!
//! # Architecture
//!
//! - `AIBackend` trait: `complete` plus typed default operations
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OllamaBackend`, `OpenAICompatibleBackend`,
//!   `ClaudeCliBackend`, `MockBackend`
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_BACKEND`: Backend to use (ollama, openai_compatible, claude_cli, mock). Default: ollama
//! - `OLLAMA_HOST`: Ollama server URL (required for ollama backend)
//! - `OLLAMA_MODEL`: Default model name (default: llama3.2)
//! - `OPENAI_COMPATIBLE_HOST`: Server URL (required for openai_compatible backend)
//! - `OPENAI_COMPATIBLE_MODEL`: Model name (default: gpt-3.5-turbo)
//! - `OPENAI_COMPATIBLE_API_KEY`: API key if required (optional)
//! - `CLAUDE_CLI_BINARY`: Path to the `claude` binary (default: found on PATH)
//! - `CLAUDE_CLI_MODEL`: Model alias for the CLI (optional)

mod claude_cli;
pub mod extract;
mod mock;
mod ollama;
mod openai_compatible;
pub mod parsing;
pub mod types;

pub use claude_cli::{detect_claude_binary, ClaudeCliBackend};
pub use extract::clean_markdown_wrapper;
pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use openai_compatible::OpenAICompatibleBackend;
pub use parsing::MerchantRankings;
pub use types::*;

#[cfg(any(test, feature = "test-utils"))]
pub(crate) use mock::guess_categories;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::context::RequestContext;
use crate::error::{is_transient_status, Error, Result};
use crate::models::CategoryRankings;

use parsing::{parse_classification, parse_description, parse_merchant_batch, parse_rankings};

/// Trait defining the interface for all AI backends
///
/// Backends implement `complete` and the metadata methods. Implementations
/// must bound `complete` by the context (see [`RequestContext::run`]) so a
/// cancelled caller never waits on the provider.
#[async_trait]
pub trait AIBackend: Send + Sync {
    /// Send a prompt and return the model's raw text
    async fn complete(&self, ctx: &RequestContext, prompt: &Prompt) -> Result<String>;

    /// Check if the backend is available
    async fn health_check(&self) -> bool;

    /// Get the model name (for logging)
    fn model(&self) -> &str;

    /// Get the host URL or binary path (for logging)
    fn host(&self) -> &str;

    /// Single-answer classification
    async fn classify(&self, ctx: &RequestContext, prompt: &Prompt) -> Result<Classification> {
        let raw = self.complete(ctx, prompt).await?;
        parse_classification(&raw)
    }

    /// Ranked classification over the categories named in the prompt
    async fn classify_with_rankings(
        &self,
        ctx: &RequestContext,
        prompt: &Prompt,
    ) -> Result<CategoryRankings> {
        let raw = self.complete(ctx, prompt).await?;
        parse_rankings(&raw)
    }

    /// Rankings for several merchants in one call, keyed by merchant id
    async fn classify_merchant_batch(
        &self,
        ctx: &RequestContext,
        prompt: &Prompt,
    ) -> Result<MerchantRankings> {
        let raw = self.complete(ctx, prompt).await?;
        parse_merchant_batch(&raw)
    }

    /// Generate a description for a category
    async fn generate_description(
        &self,
        ctx: &RequestContext,
        prompt: &Prompt,
    ) -> Result<DescriptionResult> {
        let raw = self.complete(ctx, prompt).await?;
        parse_description(&raw)
    }

    /// Free-form analysis; returns the raw text
    async fn analyze(
        &self,
        ctx: &RequestContext,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<String> {
        let prompt = Prompt::analysis(prompt).with_system(system_prompt);
        self.complete(ctx, &prompt).await
    }
}

/// Map a non-success HTTP status to a provider error
///
/// Rate limiting and server-side failures are transient; everything else
/// (bad credentials, unknown model, malformed request) is permanent.
pub(crate) fn status_error(provider: &str, status: StatusCode, body: &str) -> Error {
    let body = body.trim();
    let message = if body.is_empty() {
        format!("{} returned {}", provider, status)
    } else {
        format!("{} returned {}: {}", provider, status, body)
    };
    if is_transient_status(status.as_u16()) {
        Error::ProviderTransient(message)
    } else {
        Error::ProviderPermanent(message)
    }
}

/// Concrete AI client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
/// All variants implement the same AIBackend operations.
#[derive(Clone)]
pub enum AIClient {
    /// Ollama backend (HTTP API)
    Ollama(OllamaBackend),
    /// OpenAI-compatible backend (Docker Model Runner, vLLM, LocalAI, llama-server, etc.)
    OpenAICompatible(OpenAICompatibleBackend),
    /// Local `claude` CLI in print mode
    ClaudeCli(ClaudeCliBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AIClient {
    /// Create an AI client from environment variables
    ///
    /// Checks `AI_BACKEND` to determine which backend to use:
    /// - `ollama` (default): Uses OLLAMA_HOST and OLLAMA_MODEL
    /// - `openai_compatible`: Uses OPENAI_COMPATIBLE_HOST and OPENAI_COMPATIBLE_MODEL
    /// - `claude_cli`: Uses CLAUDE_CLI_BINARY (or `claude` on PATH) and CLAUDE_CLI_MODEL
    /// - `mock`: Creates a mock backend for testing
    ///
    /// Returns None if the required environment variables are not set.
    pub fn from_env() -> Option<Self> {
        let backend = std::env::var("AI_BACKEND").unwrap_or_else(|_| "ollama".to_string());

        match backend.to_lowercase().as_str() {
            "ollama" => OllamaBackend::from_env().map(AIClient::Ollama),
            "openai_compatible" | "openai" | "vllm" | "localai" | "llamacpp" => {
                OpenAICompatibleBackend::from_env().map(AIClient::OpenAICompatible)
            }
            "claude_cli" | "claude" => ClaudeCliBackend::from_env().map(AIClient::ClaudeCli),
            "mock" => Some(AIClient::Mock(MockBackend::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown AI_BACKEND, falling back to ollama");
                OllamaBackend::from_env().map(AIClient::Ollama)
            }
        }
    }

    /// Create an Ollama backend directly
    pub fn ollama(host: &str, model: &str) -> Self {
        AIClient::Ollama(OllamaBackend::new(host, model))
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }

    /// Short backend name for display
    pub fn kind(&self) -> &'static str {
        match self {
            AIClient::Ollama(_) => "ollama",
            AIClient::OpenAICompatible(_) => "openai_compatible",
            AIClient::ClaudeCli(_) => "claude_cli",
            AIClient::Mock(_) => "mock",
        }
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        match self {
            AIClient::Ollama(b) => AIClient::Ollama(b.with_model(model)),
            AIClient::OpenAICompatible(b) => AIClient::OpenAICompatible(b.with_model(model)),
            AIClient::ClaudeCli(b) => AIClient::ClaudeCli(b.with_model(model)),
            AIClient::Mock(b) => AIClient::Mock(b.with_model(model)),
        }
    }
}

impl From<MockBackend> for AIClient {
    fn from(backend: MockBackend) -> Self {
        AIClient::Mock(backend)
    }
}

// Implement AIBackend for AIClient by delegating to the inner backend.
// The typed operations use the trait defaults on top of `complete`.
#[async_trait]
impl AIBackend for AIClient {
    async fn complete(&self, ctx: &RequestContext, prompt: &Prompt) -> Result<String> {
        match self {
            AIClient::Ollama(b) => b.complete(ctx, prompt).await,
            AIClient::OpenAICompatible(b) => b.complete(ctx, prompt).await,
            AIClient::ClaudeCli(b) => b.complete(ctx, prompt).await,
            AIClient::Mock(b) => b.complete(ctx, prompt).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            AIClient::Ollama(b) => b.health_check().await,
            AIClient::OpenAICompatible(b) => b.health_check().await,
            AIClient::ClaudeCli(b) => b.health_check().await,
            AIClient::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::Ollama(b) => b.model(),
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::ClaudeCli(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::Ollama(b) => b.host(),
            AIClient::OpenAICompatible(b) => b.host(),
            AIClient::ClaudeCli(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ai_client_mock() {
        let client = AIClient::mock();
        assert_eq!(client.model(), "mock");
        assert_eq!(client.host(), "mock://localhost");
        assert_eq!(client.kind(), "mock");
    }

    #[tokio::test]
    async fn test_mock_health_check() {
        assert!(AIClient::mock().health_check().await);
        assert!(!AIClient::from(MockBackend::unhealthy()).health_check().await);
    }

    #[test]
    fn test_status_error_mapping() {
        let err = status_error("Ollama", StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(matches!(err, Error::ProviderTransient(ref m) if m.contains("slow down")));
        let err = status_error("Ollama", StatusCode::BAD_GATEWAY, "");
        assert!(matches!(err, Error::ProviderTransient(_)));
        let err = status_error("Ollama", StatusCode::UNAUTHORIZED, "");
        assert!(matches!(err, Error::ProviderPermanent(_)));
    }

    #[tokio::test]
    async fn test_analyze_uses_analysis_kind() {
        let mock = MockBackend::new().respond_with("insight");
        let client = AIClient::from(mock.clone());
        let out = client
            .analyze(&RequestContext::new(), "Summarize", Some("You are terse"))
            .await
            .unwrap();
        assert_eq!(out, "insight");
        let prompt = &mock.prompts()[0];
        assert_eq!(prompt.kind, CallKind::Analysis);
        assert_eq!(prompt.system.as_deref(), Some("You are terse"));
    }

    #[tokio::test]
    async fn test_generate_description_default_method() {
        let client = AIClient::mock();
        let result = client
            .generate_description(&RequestContext::new(), &Prompt::description("Coffee Shops"))
            .await
            .unwrap();
        assert!(!result.description.is_empty());
    }
}
