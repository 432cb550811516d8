//! Mock backend for testing
//!
//! Returns canned text for prompts containing a configured needle, and
//! falls back to keyword heuristics so unconfigured calls still produce
//! parseable output. Clones share their rules and counters, which lets a
//! test keep a handle while the classifier owns another.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::{Error, Result};

use super::types::{CallKind, Prompt};
use super::AIBackend;

#[derive(Debug, Clone)]
struct MockRule {
    needle: String,
    response: String,
    delay: Duration,
}

/// Mock AI backend for testing
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    rules: Arc<Mutex<Vec<MockRule>>>,
    calls: Arc<AtomicUsize>,
    pending_failures: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<Prompt>>>,
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            ..Default::default()
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self::default()
    }

    /// Create a new instance with a different model (no-op for mock)
    pub fn with_model(&self, _model: &str) -> Self {
        self.clone()
    }

    /// Reply with `response` to prompts containing `needle`
    ///
    /// Rules are checked in insertion order; an empty needle matches
    /// everything.
    pub fn respond_to(self, needle: &str, response: &str) -> Self {
        self.respond_to_with_delay(needle, response, Duration::ZERO)
    }

    /// Like [`MockBackend::respond_to`], sleeping `delay` before replying
    pub fn respond_to_with_delay(self, needle: &str, response: &str, delay: Duration) -> Self {
        self.lock_rules().push(MockRule {
            needle: needle.to_string(),
            response: response.to_string(),
            delay,
        });
        self
    }

    /// Reply with `response` to every prompt not matched by an earlier rule
    pub fn respond_with(self, response: &str) -> Self {
        self.respond_to("", response)
    }

    /// Fail the next `n` calls with a transient provider error
    pub fn fail_next(&self, n: usize) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Number of `complete` calls so far, including failed ones
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn lock_rules(&self) -> std::sync::MutexGuard<'_, Vec<MockRule>> {
        self.rules.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn take_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn matching_rule(&self, prompt: &Prompt) -> Option<MockRule> {
        let text = prompt.combined();
        self.lock_rules()
            .iter()
            .find(|rule| text.contains(&rule.needle))
            .cloned()
    }
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn complete(&self, ctx: &RequestContext, prompt: &Prompt) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(prompt.clone());

        if self.take_failure() {
            return Err(Error::ProviderTransient("mock failure".into()));
        }

        let (response, delay) = match self.matching_rule(prompt) {
            Some(rule) => (rule.response, rule.delay),
            None => (heuristic_response(prompt), Duration::ZERO),
        };

        ctx.run(prompt.default_timeout(), async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(response)
        })
        .await
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}

/// Category guesses for the transaction a prompt describes
pub(crate) fn guess_categories(prompt: &str) -> (&'static str, &'static str) {
    keyword_categories(&subject_text(prompt))
}

/// Category guesses for well-known merchants: (best, runner-up)
fn keyword_categories(text: &str) -> (&'static str, &'static str) {
    let t = text.to_uppercase();
    match t.as_str() {
        t if t.contains("STARBUCKS") || t.contains("PEET") || t.contains("DUTCH BROS") => {
            ("Coffee Shops", "Dining")
        }
        t if t.contains("SHELL") || t.contains("CHEVRON") || t.contains("EXXON") => {
            ("Gas & Fuel", "Auto & Transport")
        }
        t if t.contains("WHOLE FOODS") || t.contains("SAFEWAY") || t.contains("TRADER JOE") => {
            ("Groceries", "Dining")
        }
        t if t.contains("NETFLIX") || t.contains("SPOTIFY") || t.contains("HULU") => {
            ("Subscriptions", "Entertainment")
        }
        t if t.contains("UBER") || t.contains("LYFT") => ("Auto & Transport", "Travel"),
        t if t.contains("MCDONALD") || t.contains("CHIPOTLE") => ("Dining", "Groceries"),
        t if t.contains("CHECK") => ("Housing", "Utilities"),
        _ => ("Shopping", "Other"),
    }
}

/// Transaction-describing lines of a prompt, or the whole prompt
fn subject_text(prompt: &str) -> String {
    let lines: Vec<&str> = prompt
        .lines()
        .map(str::trim)
        .filter(|l| {
            l.starts_with("Merchant:") || l.starts_with("Description:") || l.starts_with("Type:")
        })
        .collect();
    if lines.is_empty() {
        prompt.to_string()
    } else {
        lines.join("\n")
    }
}

fn heuristic_response(prompt: &Prompt) -> String {
    match prompt.kind {
        CallKind::Classification if prompt.user.contains("merchantId:") => {
            merchant_batch_response(&prompt.user)
        }
        CallKind::Classification if prompt.user.contains("propose a new category") => {
            r#"{"rankings":[],"newCategory":{"name":"General","score":0.6,"description":"Everyday purchases without a better fit"}}"#
                .to_string()
        }
        CallKind::Classification => {
            let (top, second) = guess_categories(&prompt.user);
            serde_json::json!({
                "rankings": [
                    {"category": top, "score": 0.9},
                    {"category": second, "score": 0.4}
                ]
            })
            .to_string()
        }
        CallKind::Description => serde_json::json!({
            "description": "Purchases typically grouped under this category",
            "confidence": 0.8
        })
        .to_string(),
        CallKind::Analysis if prompt.user.contains("\"path\"") => "[]".to_string(),
        CallKind::Analysis => "Mock analysis: no notable findings.".to_string(),
    }
}

/// One entry per `merchantId: "..."` line in the prompt
fn merchant_batch_response(prompt: &str) -> String {
    let classifications: Vec<serde_json::Value> = prompt
        .lines()
        .filter_map(|line| {
            let start = line.find("merchantId: \"")? + "merchantId: \"".len();
            let len = line[start..].find('"')?;
            let id = &line[start..start + len];
            let (top, second) = keyword_categories(line);
            Some(serde_json::json!({
                "merchantId": id,
                "rankings": [
                    {"category": top, "score": 0.9},
                    {"category": second, "score": 0.4}
                ]
            }))
        })
        .collect();
    serde_json::json!({ "classifications": classifications }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rules_match_in_order() {
        let mock = MockBackend::new()
            .respond_to("STARBUCKS", "coffee")
            .respond_with("anything else");
        let ctx = RequestContext::new();

        let out = mock
            .complete(&ctx, &Prompt::classification("Merchant: STARBUCKS"))
            .await
            .unwrap();
        assert_eq!(out, "coffee");
        let out = mock
            .complete(&ctx, &Prompt::classification("Merchant: SHELL"))
            .await
            .unwrap();
        assert_eq!(out, "anything else");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_clones_share_counters() {
        let mock = MockBackend::new();
        let handle = mock.clone();
        mock.complete(&RequestContext::new(), &Prompt::classification("x"))
            .await
            .unwrap();
        assert_eq!(handle.call_count(), 1);
        assert_eq!(handle.prompts()[0].user, "x");
    }

    #[tokio::test]
    async fn test_fail_next() {
        let mock = MockBackend::new();
        mock.fail_next(1);
        let ctx = RequestContext::new();
        let prompt = Prompt::classification("Merchant: SHELL");
        assert!(matches!(
            mock.complete(&ctx, &prompt).await,
            Err(Error::ProviderTransient(_))
        ));
        assert!(mock.complete(&ctx, &prompt).await.is_ok());
    }

    #[tokio::test]
    async fn test_heuristic_rankings_parse() {
        let mock = MockBackend::new();
        let rankings = mock
            .classify_with_rankings(
                &RequestContext::new(),
                &Prompt::classification("Merchant: STARBUCKS #1234\nAmount: -5.50"),
            )
            .await
            .unwrap();
        assert_eq!(rankings.top().unwrap().category, "Coffee Shops");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_respects_deadline() {
        let mock =
            MockBackend::new().respond_to_with_delay("", "late", Duration::from_secs(10));
        let ctx = RequestContext::new().with_timeout(Duration::from_secs(1));
        let err = mock
            .complete(&ctx, &Prompt::classification("x"))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_merchant_batch_response_shape() {
        let raw = merchant_batch_response(
            "- merchantId: \"starbucks\" | name: \"Starbucks\"\n- merchantId: \"shell\" | name: \"Shell\"",
        );
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["classifications"].as_array().unwrap().len(), 2);
        assert_eq!(value["classifications"][1]["rankings"][0]["category"], "Gas & Fuel");
    }
}
