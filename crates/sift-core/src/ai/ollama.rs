//! Ollama backend implementation
//!
//! HTTP client for the Ollama generate API (`POST {host}/api/generate`).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::RequestContext;
use crate::error::Result;

use super::types::Prompt;
use super::{status_error, AIBackend};

/// Model used when `OLLAMA_MODEL` is unset
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.2";

#[derive(Clone)]
pub struct OllamaBackend {
    http_client: Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            http_client: self.http_client.clone(),
            base_url: self.base_url.clone(),
            model: model.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OLLAMA_HOST").ok()?;
        let model =
            std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_OLLAMA_MODEL.to_string());
        Some(Self::new(&host, &model))
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let request = OllamaRequest {
            model: &self.model,
            prompt: &prompt.user,
            system: prompt.system.as_deref(),
            stream: false,
            options: OllamaOptions { temperature: 0.1 },
        };

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error("Ollama", status, &body));
        }

        let ollama_response: OllamaResponse = response.json().await?;
        debug!(
            kind = prompt.kind.as_str(),
            "Ollama response: {}", ollama_response.response
        );
        Ok(ollama_response.response)
    }
}

/// Request to Ollama API
#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Response from Ollama API
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[async_trait]
impl AIBackend for OllamaBackend {
    async fn complete(&self, ctx: &RequestContext, prompt: &Prompt) -> Result<String> {
        ctx.run(prompt.default_timeout(), self.generate(prompt)).await
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::test_utils::MockOllamaServer;

    #[tokio::test]
    async fn test_complete_returns_raw_text() {
        let server = MockOllamaServer::start().await;
        server.respond_with("RANKINGS:\nCoffee Shops|0.9");
        let backend = OllamaBackend::new(&server.url(), "llama3.2");

        let text = backend
            .complete(&RequestContext::new(), &Prompt::classification("classify"))
            .await
            .unwrap();
        assert_eq!(text, "RANKINGS:\nCoffee Shops|0.9");
        assert_eq!(server.request_count(), 1);
    }

    #[tokio::test]
    async fn test_rankings_via_default_method() {
        let server = MockOllamaServer::start().await;
        server.respond_with(r#"{"rankings":[{"category":"Gas","score":0.8}]}"#);
        let backend = OllamaBackend::new(&server.url(), "llama3.2");

        let rankings = backend
            .classify_with_rankings(&RequestContext::new(), &Prompt::classification("x"))
            .await
            .unwrap();
        assert_eq!(rankings.top().unwrap().category, "Gas");
    }

    #[tokio::test]
    async fn test_server_errors_are_transient() {
        let server = MockOllamaServer::start().await;
        server.fail_with_status(503);
        let backend = OllamaBackend::new(&server.url(), "llama3.2");

        let err = backend
            .complete(&RequestContext::new(), &Prompt::classification("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProviderTransient(_)));
    }

    #[tokio::test]
    async fn test_client_errors_are_permanent() {
        let server = MockOllamaServer::start().await;
        server.fail_with_status(404);
        let backend = OllamaBackend::new(&server.url(), "llama3.2");

        let err = backend
            .complete(&RequestContext::new(), &Prompt::classification("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProviderPermanent(_)));
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockOllamaServer::start().await;
        let backend = OllamaBackend::new(&server.url(), "llama3.2");
        assert!(backend.health_check().await);

        let backend = OllamaBackend::new("http://127.0.0.1:1", "llama3.2");
        assert!(!backend.health_check().await);
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let backend = OllamaBackend::new("http://localhost:11434/", "llama3.2");
        assert_eq!(backend.host(), "http://localhost:11434");
        assert_eq!(backend.with_model("gemma3").model(), "gemma3");
    }
}
