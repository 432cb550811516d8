//! OpenAI-compatible backend implementation
//!
//! Works with any server that implements the OpenAI chat completions API:
//! - Docker Model Runner (http://localhost:12434)
//! - vLLM (http://localhost:8000)
//! - LocalAI (http://localhost:8080)
//! - llama-server / llama.cpp (http://localhost:8080)
//!
//! # Configuration
//!
//! Environment variables:
//! - `OPENAI_COMPATIBLE_HOST`: Server URL (required)
//! - `OPENAI_COMPATIBLE_MODEL`: Model name (default: gpt-3.5-turbo)
//! - `OPENAI_COMPATIBLE_API_KEY`: API key if required (optional)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::RequestContext;
use crate::error::{Error, Result};

use super::types::Prompt;
use super::{status_error, AIBackend};

/// Model used when `OPENAI_COMPATIBLE_MODEL` is unset
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";

#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAICompatibleBackend {
    /// Create a new OpenAI-compatible backend
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
        }
    }

    /// Create with an API key
    pub fn with_api_key(base_url: &str, model: &str, api_key: &str) -> Self {
        let mut backend = Self::new(base_url, model);
        backend.api_key = Some(api_key.to_string());
        backend
    }

    /// Create a new instance with a different model
    pub fn with_model(&self, model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..self.clone()
        }
    }

    /// Create from environment variables
    ///
    /// Required: `OPENAI_COMPATIBLE_HOST`
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("OPENAI_COMPATIBLE_HOST").ok()?;
        let model = std::env::var("OPENAI_COMPATIBLE_MODEL")
            .unwrap_or_else(|_| DEFAULT_OPENAI_MODEL.to_string());
        let api_key = std::env::var("OPENAI_COMPATIBLE_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());

        let mut backend = Self::new(&host, &model);
        backend.api_key = api_key;
        Some(backend)
    }

    /// POST the prompt as a chat completion and return the first choice's text
    async fn chat_completion(&self, prompt: &Prompt) -> Result<String> {
        let messages = prompt
            .system
            .as_deref()
            .map(|system| ChatMessage {
                role: "system",
                content: system,
            })
            .into_iter()
            .chain(std::iter::once(ChatMessage {
                role: "user",
                content: &prompt.user,
            }))
            .collect();

        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: Some(0.1),
            stream: false,
        };

        let mut request = self
            .http_client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = self.api_key.as_deref() {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error("OpenAI-compatible server", status, &text));
        }

        let reply: ChatReply = response.json().await?;
        let content = reply
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| {
                Error::ProviderPermanent("chat completion returned no content".into())
            })?;

        debug!(kind = prompt.kind.as_str(), model = %self.model, "Chat completion: {}", content);
        Ok(content)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    choices: Vec<ReplyChoice>,
}

#[derive(Debug, Deserialize)]
struct ReplyChoice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl AIBackend for OpenAICompatibleBackend {
    async fn complete(&self, ctx: &RequestContext, prompt: &Prompt) -> Result<String> {
        ctx.run(prompt.default_timeout(), self.chat_completion(prompt))
            .await
    }

    /// Healthy if `/v1/models` or `/health` answers with success
    async fn health_check(&self) -> bool {
        for path in ["/v1/models", "/health"] {
            let url = format!("{}{}", self.base_url, path);
            match self.http_client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return true,
                Ok(resp) => debug!(%url, status = %resp.status(), "Health probe failed"),
                Err(e) => debug!(%url, error = %e, "Health probe failed"),
            }
        }
        false
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
    use crate::test_utils::MockOllamaServer;

    #[tokio::test]
    async fn test_chat_completion_sends_system_and_key() {
        let server = MockOllamaServer::start().await;
        server.respond_with("hello");
        let backend = OpenAICompatibleBackend::with_api_key(&server.url(), "mock-model", "sk-test");

        let prompt = Prompt::analysis("What changed?").with_system(Some("Be brief."));
        let text = backend
            .complete(&RequestContext::new(), &prompt)
            .await
            .unwrap();
        assert_eq!(text, "hello");

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].prompt, "What changed?");
        assert_eq!(requests[0].system.as_deref(), Some("Be brief."));
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer sk-test"));
    }

    #[tokio::test]
    async fn test_rate_limited_is_transient() {
        let server = MockOllamaServer::start().await;
        server.fail_with_status(429);
        let backend = OpenAICompatibleBackend::new(&server.url(), "mock-model");

        let err = backend
            .complete(&RequestContext::new(), &Prompt::classification("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProviderTransient(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_unauthorized_is_permanent() {
        let server = MockOllamaServer::start().await;
        server.fail_with_status(401);
        let backend = OpenAICompatibleBackend::new(&server.url(), "mock-model");

        let err = backend
            .complete(&RequestContext::new(), &Prompt::classification("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProviderPermanent(_)));
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockOllamaServer::start().await;
        let backend = OpenAICompatibleBackend::new(&server.url(), "mock-model");
        assert!(backend.health_check().await);
    }
}
