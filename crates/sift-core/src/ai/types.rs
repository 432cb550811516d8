//! AI backend request and response types
//!
//! These types are backend-agnostic and used across all AI implementations.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default deadline for classification and description calls
pub const QUICK_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for free-form analysis calls
pub const ANALYSIS_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// What a provider call is for; selects its default deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Classification,
    Description,
    Analysis,
}

impl CallKind {
    pub fn default_timeout(self) -> Duration {
        match self {
            CallKind::Classification | CallKind::Description => QUICK_CALL_TIMEOUT,
            CallKind::Analysis => ANALYSIS_TIMEOUT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallKind::Classification => "classification",
            CallKind::Description => "description",
            CallKind::Analysis => "analysis",
        }
    }
}

/// A rendered prompt ready to send to a backend
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub kind: CallKind,
    /// Optional system instructions (sent as a system message where supported)
    pub system: Option<String>,
    pub user: String,
}

impl Prompt {
    pub fn classification(user: impl Into<String>) -> Self {
        Self::new(CallKind::Classification, user)
    }

    pub fn description(user: impl Into<String>) -> Self {
        Self::new(CallKind::Description, user)
    }

    pub fn analysis(user: impl Into<String>) -> Self {
        Self::new(CallKind::Analysis, user)
    }

    fn new(kind: CallKind, user: impl Into<String>) -> Self {
        Self {
            kind,
            system: None,
            user: user.into(),
        }
    }

    pub fn with_system(mut self, system: Option<&str>) -> Self {
        self.system = system.filter(|s| !s.trim().is_empty()).map(str::to_string);
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.kind.default_timeout()
    }

    /// System and user text joined for backends without a system slot
    pub fn combined(&self) -> String {
        match self.system {
            Some(ref system) => format!("{}\n\n{}", system, self.user),
            None => self.user.clone(),
        }
    }
}

/// Result of a single-answer classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub category: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub is_new: bool,
    #[serde(default)]
    pub description: String,
}

/// Result of category description generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptionResult {
    pub description: String,
    #[serde(default)]
    pub confidence: f64,
}

/// Provider-proposed category outside the supplied list
#[derive(Debug, Clone, Deserialize)]
pub struct NewCategoryPayload {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub score: serde_json::Value,
    #[serde(default)]
    pub description: String,
}

/// `{"rankings": [...], "newCategory": {...}}`
///
/// Entries stay as raw values and are validated one by one, so a single
/// malformed ranking is skipped rather than failing the decode. Each entry
/// carries `category`, `score` (number, numeric string, or percentage),
/// and optionally `isNew` and `description`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingsPayload {
    #[serde(default)]
    pub rankings: Vec<serde_json::Value>,
    #[serde(default)]
    pub new_category: Option<serde_json::Value>,
}

/// `{"classifications": [{"merchantId": ..., "rankings": [...]}]}`
///
/// Entries stay as raw values so one malformed merchant cannot sink the
/// whole batch.
#[derive(Debug, Clone, Deserialize)]
pub struct MerchantBatchPayload {
    #[serde(default)]
    pub classifications: Vec<serde_json::Value>,
}
