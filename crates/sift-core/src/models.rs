//! Data models for Sift

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

/// A transaction to classify
///
/// Owned by the caller; the core only reads it. `hash` is the content
/// fingerprint used as the suggestion cache key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    /// Content fingerprint (see [`Transaction::compute_hash`])
    #[serde(default)]
    pub hash: String,
    pub merchant_name: String,
    /// Raw bank description
    #[serde(default)]
    pub description: String,
    /// Negative = expense, positive = income
    pub amount: f64,
    pub date: NaiveDate,
    /// Bank-provided type (DEBIT, CREDIT, CHECK, ...)
    #[serde(default, rename = "type")]
    pub tx_type: Option<String>,
    #[serde(default)]
    pub check_number: Option<String>,
    /// Bank-provided category strings
    #[serde(default)]
    pub category_hints: Vec<String>,
}

impl Transaction {
    /// Build a transaction with its fingerprint filled in
    pub fn new(id: &str, merchant_name: &str, amount: f64, date: NaiveDate) -> Self {
        let mut tx = Self {
            id: id.to_string(),
            hash: String::new(),
            merchant_name: merchant_name.to_string(),
            description: merchant_name.to_string(),
            amount,
            date,
            tx_type: None,
            check_number: None,
            category_hints: Vec::new(),
        };
        tx.hash = tx.compute_hash();
        tx
    }

    /// SHA-256 over date, amount, description, and merchant (hex-encoded)
    ///
    /// Two records from different sources with the same content produce the
    /// same hash and therefore share a cache slot.
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.date.to_string().as_bytes());
        hasher.update(format!("{:.2}", self.amount).as_bytes());
        hasher.update(self.description.as_bytes());
        hasher.update(self.merchant_name.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Fill in `hash` if the caller left it empty
    pub fn ensure_hash(&mut self) {
        if self.hash.is_empty() {
            self.hash = self.compute_hash();
        }
    }

    pub fn is_check(&self) -> bool {
        self.check_number.is_some()
            || self
                .tx_type
                .as_deref()
                .is_some_and(|t| t.eq_ignore_ascii_case("check"))
    }
}

/// A spending category offered to the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Category {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

/// A rule that boosts a category's score for matching transactions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckPattern {
    #[serde(default)]
    pub id: i64,
    pub pattern_name: String,
    /// Category whose ranking is boosted
    pub category: String,
    /// Added to the matching ranking's score
    pub confidence_boost: f64,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub amount_min: Option<f64>,
    #[serde(default)]
    pub amount_max: Option<f64>,
    /// Regex applied to the transaction's check number
    #[serde(default)]
    pub check_number_pattern: Option<String>,
    /// Pipe-separated substrings matched case-insensitively against the merchant
    #[serde(default)]
    pub merchant_pattern: Option<String>,
}

fn default_active() -> bool {
    true
}

impl CheckPattern {
    pub fn new(pattern_name: &str, category: &str, confidence_boost: f64) -> Self {
        Self {
            id: 0,
            pattern_name: pattern_name.to_string(),
            category: category.to_string(),
            confidence_boost,
            active: true,
            amount_min: None,
            amount_max: None,
            check_number_pattern: None,
            merchant_pattern: None,
        }
    }

    /// Whether this pattern applies to a transaction
    ///
    /// Inactive patterns never match. Every criterion that is set must hold;
    /// a pattern with no criteria matches check transactions only.
    pub fn matches(&self, tx: &Transaction) -> bool {
        if !self.active {
            return false;
        }

        let amount = tx.amount.abs();
        if self.amount_min.is_some_and(|min| amount < min) {
            return false;
        }
        if self.amount_max.is_some_and(|max| amount > max) {
            return false;
        }

        if let Some(ref pattern) = self.check_number_pattern {
            let Some(ref number) = tx.check_number else {
                return false;
            };
            match Regex::new(pattern) {
                Ok(re) if re.is_match(number) => {}
                Ok(_) => return false,
                Err(e) => {
                    warn!(pattern = %self.pattern_name, error = %e, "Invalid check number pattern");
                    return false;
                }
            }
        }

        if let Some(ref pattern) = self.merchant_pattern {
            let merchant = tx.merchant_name.to_uppercase();
            let hit = pattern
                .split('|')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .any(|p| merchant.contains(&p.to_uppercase()));
            if !hit {
                return false;
            }
        }

        let has_criteria = self.amount_min.is_some()
            || self.amount_max.is_some()
            || self.check_number_pattern.is_some()
            || self.merchant_pattern.is_some();
        has_criteria || tx.is_check()
    }
}

/// One category with its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRanking {
    pub category: String,
    /// Always within [0, 1]
    pub score: f64,
    #[serde(default)]
    pub is_new: bool,
    /// Only meaningful when `is_new`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl CategoryRanking {
    pub fn new(category: &str, score: f64) -> Self {
        Self {
            category: category.to_string(),
            score: clamp_score(score),
            is_new: false,
            description: String::new(),
        }
    }

    pub fn new_category(category: &str, score: f64, description: &str) -> Self {
        Self {
            category: category.to_string(),
            score: clamp_score(score),
            is_new: true,
            description: description.to_string(),
        }
    }
}

/// Clamp a score into [0, 1]; NaN becomes 0
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Ordered ranking list in provider output order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryRankings(pub Vec<CategoryRanking>);

impl CategoryRankings {
    pub fn new(rankings: Vec<CategoryRanking>) -> Self {
        Self(rankings)
    }

    /// First element with the highest score; ties keep the earlier element
    pub fn top(&self) -> Option<&CategoryRanking> {
        let mut best: Option<&CategoryRanking> = None;
        for ranking in &self.0 {
            match best {
                Some(b) if ranking.score <= b.score => {}
                _ => best = Some(ranking),
            }
        }
        best
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CategoryRanking> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<CategoryRanking> {
        self.0
    }

    /// Additively apply the boost of every active pattern targeting a ranked
    /// category. Order is left untouched.
    pub fn apply_check_patterns(&mut self, patterns: &[CheckPattern]) {
        for ranking in &mut self.0 {
            for pattern in patterns.iter().filter(|p| p.active) {
                if pattern.category.eq_ignore_ascii_case(&ranking.category) {
                    ranking.score = clamp_score(ranking.score + pattern.confidence_boost);
                }
            }
        }
    }
}

impl From<Vec<CategoryRanking>> for CategoryRankings {
    fn from(rankings: Vec<CategoryRanking>) -> Self {
        Self(rankings)
    }
}

impl<'a> IntoIterator for &'a CategoryRankings {
    type Item = &'a CategoryRanking;
    type IntoIter = std::slice::Iter<'a, CategoryRanking>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Single-answer classification result (also the cached value)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmSuggestion {
    pub transaction_id: String,
    pub category: String,
    pub confidence: f64,
    pub is_new: bool,
    #[serde(default)]
    pub description: String,
}

impl LlmSuggestion {
    pub fn from_ranking(transaction_id: &str, ranking: &CategoryRanking) -> Self {
        Self {
            transaction_id: transaction_id.to_string(),
            category: ranking.category.clone(),
            confidence: ranking.score,
            is_new: ranking.is_new,
            description: ranking.description.clone(),
        }
    }

    /// Reshape into the one-element ranking list returned on cache hits
    pub fn to_rankings(&self) -> CategoryRankings {
        CategoryRankings(vec![CategoryRanking {
            category: self.category.clone(),
            score: self.confidence,
            is_new: self.is_new,
            description: self.description.clone(),
        }])
    }
}

/// Aggregated view of one merchant for batch classification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantSummary {
    pub merchant_id: String,
    pub merchant_name: String,
    #[serde(default)]
    pub transaction_count: usize,
    #[serde(default)]
    pub total_amount: f64,
    #[serde(default)]
    pub sample_descriptions: Vec<String>,
}

impl MerchantSummary {
    /// Group transactions by merchant name, in first-seen order
    pub fn from_transactions(transactions: &[Transaction]) -> Vec<Self> {
        let mut summaries: Vec<Self> = Vec::new();
        for tx in transactions {
            let key = tx.merchant_name.trim().to_lowercase();
            match summaries.iter_mut().find(|s| s.merchant_id == key) {
                Some(summary) => {
                    summary.transaction_count += 1;
                    summary.total_amount += tx.amount;
                    if summary.sample_descriptions.len() < 3
                        && !summary.sample_descriptions.contains(&tx.description)
                    {
                        summary.sample_descriptions.push(tx.description.clone());
                    }
                }
                None => summaries.push(Self {
                    merchant_id: key,
                    merchant_name: tx.merchant_name.clone(),
                    transaction_count: 1,
                    total_amount: tx.amount,
                    sample_descriptions: vec![tx.description.clone()],
                }),
            }
        }
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    #[test]
    fn test_top_prefers_earlier_on_tie() {
        let rankings = CategoryRankings::new(vec![
            CategoryRanking::new("Dining", 0.7),
            CategoryRanking::new("Coffee Shops", 0.9),
            CategoryRanking::new("Groceries", 0.9),
        ]);
        assert_eq!(rankings.top().unwrap().category, "Coffee Shops");
        assert!(CategoryRankings::default().top().is_none());
    }

    #[test]
    fn test_scores_clamped_on_construction() {
        assert_eq!(CategoryRanking::new("A", 1.5).score, 1.0);
        assert_eq!(CategoryRanking::new("A", -0.2).score, 0.0);
        assert_eq!(CategoryRanking::new("A", f64::NAN).score, 0.0);
    }

    #[test]
    fn test_check_pattern_boost_is_additive() {
        let mut rankings = CategoryRankings::new(vec![
            CategoryRanking::new("Housing", 0.50),
            CategoryRanking::new("Utilities", 0.60),
        ]);
        rankings.apply_check_patterns(&[CheckPattern::new("Rent check", "Housing", 0.30)]);
        assert!((rankings.0[0].score - 0.80).abs() < 1e-9);
        assert!((rankings.0[1].score - 0.60).abs() < 1e-9);
        // Order is preserved even though Housing now scores highest
        assert_eq!(rankings.0[0].category, "Housing");
    }

    #[test]
    fn test_inactive_pattern_is_ignored() {
        let mut pattern = CheckPattern::new("Rent check", "Housing", 0.30);
        pattern.active = false;
        let mut rankings = CategoryRankings::new(vec![CategoryRanking::new("Housing", 0.5)]);
        rankings.apply_check_patterns(&[pattern]);
        assert_eq!(rankings.0[0].score, 0.5);
    }

    #[test]
    fn test_boost_caps_at_one() {
        let mut rankings = CategoryRankings::new(vec![CategoryRanking::new("Housing", 0.9)]);
        rankings.apply_check_patterns(&[CheckPattern::new("Rent", "Housing", 0.5)]);
        assert_eq!(rankings.0[0].score, 1.0);
    }

    #[test]
    fn test_hash_is_content_based() {
        let a = Transaction::new("a", "STARBUCKS", -5.50, date());
        let b = Transaction::new("b", "STARBUCKS", -5.50, date());
        let c = Transaction::new("c", "STARBUCKS", -6.00, date());
        assert_eq!(a.hash, b.hash);
        assert_ne!(a.hash, c.hash);
        assert_eq!(a.hash.len(), 64);
    }

    #[test]
    fn test_check_pattern_amount_and_number() {
        let mut tx = Transaction::new("1", "CHECK 1042", -1500.0, date());
        tx.check_number = Some("1042".into());

        let mut pattern = CheckPattern::new("Rent", "Housing", 0.3);
        pattern.amount_min = Some(1000.0);
        pattern.amount_max = Some(2000.0);
        pattern.check_number_pattern = Some(r"^10\d\d$".into());
        assert!(pattern.matches(&tx));

        pattern.amount_max = Some(1200.0);
        assert!(!pattern.matches(&tx));
    }

    #[test]
    fn test_check_pattern_merchant_or() {
        let tx = Transaction::new("1", "City Water Dept", -80.0, date());
        let mut pattern = CheckPattern::new("Water", "Utilities", 0.2);
        pattern.merchant_pattern = Some("water|sewer".into());
        assert!(pattern.matches(&tx));
        pattern.merchant_pattern = Some("electric".into());
        assert!(!pattern.matches(&tx));
    }

    #[test]
    fn test_criteria_free_pattern_matches_checks_only() {
        let pattern = CheckPattern::new("Any check", "Other", 0.1);
        let plain = Transaction::new("1", "TARGET", -20.0, date());
        let mut check = Transaction::new("2", "CHECK", -20.0, date());
        check.tx_type = Some("CHECK".into());
        assert!(!pattern.matches(&plain));
        assert!(pattern.matches(&check));
    }

    #[test]
    fn test_transaction_json_shape() {
        let json = r#"{"id":"t1","hash":"","merchantName":"Starbucks","amount":-5.5,
            "date":"2024-03-15","type":"DEBIT","categoryHints":["Dining"]}"#;
        let mut tx: Transaction = serde_json::from_str(json).unwrap();
        tx.ensure_hash();
        assert_eq!(tx.tx_type.as_deref(), Some("DEBIT"));
        assert!(!tx.hash.is_empty());
    }

    #[test]
    fn test_merchant_summary_grouping() {
        let txs = vec![
            Transaction::new("1", "Starbucks", -5.0, date()),
            Transaction::new("2", "Shell", -40.0, date()),
            Transaction::new("3", "STARBUCKS ", -6.0, date()),
        ];
        let summaries = MerchantSummary::from_transactions(&txs);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].merchant_id, "starbucks");
        assert_eq!(summaries[0].transaction_count, 2);
        assert!((summaries[0].total_amount + 11.0).abs() < 1e-9);
    }
}
