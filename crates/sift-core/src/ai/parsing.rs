//! Parsing helpers for AI backend responses
//!
//! Every parser runs the raw text through [`clean_markdown_wrapper`] first,
//! since models wrap their payload in fences and commentary. Ranking
//! responses get two text fallbacks when no JSON is present: the
//! `RANKINGS:` block format and the older single-answer
//! `CATEGORY:`/`CONFIDENCE:` format.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{clamp_score, CategoryRanking, CategoryRankings};

use super::extract::clean_markdown_wrapper;
use super::types::{
    Classification, DescriptionResult, MerchantBatchPayload, NewCategoryPayload, RankingsPayload,
};

/// Rankings keyed by merchant id
pub type MerchantRankings = HashMap<String, Vec<CategoryRanking>>;

/// Truncate long responses for error messages
fn truncate(text: &str) -> String {
    const LIMIT: usize = 200;
    if text.chars().count() > LIMIT {
        format!("{}...", text.chars().take(LIMIT).collect::<String>())
    } else {
        text.to_string()
    }
}

/// Parse a ranked category list from a provider response
///
/// Tries the JSON payload, then the `RANKINGS:` text block, then the legacy
/// single-answer format. Fails with [`Error::NoRankings`] when none of them
/// yields at least one ranking.
pub fn parse_rankings(response: &str) -> Result<CategoryRankings> {
    let payload = clean_markdown_wrapper(response);

    if let Ok(parsed) = serde_json::from_str::<RankingsPayload>(payload) {
        let rankings = rankings_from_payload(parsed);
        if !rankings.is_empty() {
            return Ok(rankings);
        }
        debug!("JSON rankings payload was empty, trying text formats");
    }

    let rankings = parse_rankings_text(response);
    if !rankings.is_empty() {
        return Ok(rankings);
    }

    if let Some(ranking) = parse_legacy(response) {
        return Ok(CategoryRankings::new(vec![ranking]));
    }

    debug!(raw = %truncate(response), "No rankings found in response");
    Err(Error::NoRankings)
}

/// Validate a decoded rankings payload
///
/// Scores are clamped, entries without a category or a usable score are
/// dropped, and a proposed new category is kept only when fully specified.
pub fn rankings_from_payload(payload: RankingsPayload) -> CategoryRankings {
    let mut rankings: Vec<CategoryRanking> = payload
        .rankings
        .iter()
        .filter_map(ranking_from_value)
        .collect();

    if let Some(new) = payload.new_category.and_then(new_category_from_value) {
        rankings.push(new);
    }

    CategoryRankings::new(rankings)
}

fn ranking_from_value(entry: &Value) -> Option<CategoryRanking> {
    let category = entry.get("category").and_then(Value::as_str)?.trim();
    if category.is_empty() {
        return None;
    }
    let Some(score) = entry.get("score").and_then(score_from_value) else {
        warn!(category, "Skipping ranking without a usable score");
        return None;
    };
    let is_new = match entry.get("isNew") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    };
    let description = match entry.get("description") {
        Some(Value::String(s)) if is_new => s.trim().to_string(),
        _ => String::new(),
    };
    Some(CategoryRanking {
        category: category.to_string(),
        score,
        is_new,
        description,
    })
}

fn new_category_from_value(value: Value) -> Option<CategoryRanking> {
    let payload: NewCategoryPayload = serde_json::from_value(value).ok()?;
    let score = score_from_value(&payload.score)?;
    new_category(&payload.name, score, &payload.description)
}

/// A new-category ranking, if name, positive score, and description are present
fn new_category(name: &str, score: f64, description: &str) -> Option<CategoryRanking> {
    let name = name.trim();
    let description = description.trim();
    if name.is_empty() || description.is_empty() || score <= 0.0 {
        return None;
    }
    Some(CategoryRanking::new_category(name, score, description))
}

fn score_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().map(clamp_score),
        Value::String(s) => parse_score(s),
        _ => None,
    }
}

/// Parse a model-emitted score into [0, 1]
///
/// Accepts `0.85`, `85%`, and values with stray characters (`0.85.`,
/// `~0.7`, `**0.9**`). Returns `None` when nothing numeric remains.
pub fn parse_score(raw: &str) -> Option<f64> {
    let raw = raw.trim();

    let (number, percent) = match raw.strip_suffix('%') {
        Some(stripped) => (stripped.trim(), true),
        None => (raw, false),
    };

    let value = match number.parse::<f64>() {
        Ok(v) => v,
        Err(_) => {
            let cleaned: String = number
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            let cleaned = cleaned.trim_end_matches('.');
            cleaned.parse::<f64>().ok()?
        }
    };

    if !value.is_finite() {
        return None;
    }

    // A stray '%' anywhere also marks a percentage
    let percent = percent || number.contains('%');
    Some(clamp_score(if percent { value / 100.0 } else { value }))
}

fn strip_key<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let head = line.get(..key.len())?;
    if head.eq_ignore_ascii_case(key) {
        Some(line[key.len()..].trim())
    } else {
        None
    }
}

/// Parse the `RANKINGS:` text block
///
/// ```text
/// RANKINGS:
/// Coffee Shops|0.92
/// Dining | 75%
///
/// NEW_CATEGORY:
/// name: Pet Care
/// score: 0.4
/// description: Vets, grooming, and pet supplies
/// ```
///
/// Lines that do not parse are skipped. Returns an empty list when the
/// block is missing or yields nothing.
pub fn parse_rankings_text(response: &str) -> CategoryRankings {
    #[derive(PartialEq)]
    enum Section {
        Preamble,
        Rankings,
        NewCategory,
    }

    let mut section = Section::Preamble;
    let mut rankings = Vec::new();
    let mut new_name = String::new();
    let mut new_score = None;
    let mut new_description = String::new();

    for line in response.lines() {
        let line = line.trim().trim_start_matches(['-', '*']).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = strip_key(line, "RANKINGS:") {
            section = Section::Rankings;
            if rest.is_empty() {
                continue;
            }
            // Allow a ranking on the header line itself
            if let Some(ranking) = parse_ranking_line(rest) {
                rankings.push(ranking);
            }
            continue;
        }
        if strip_key(line, "NEW_CATEGORY:").is_some() {
            section = Section::NewCategory;
            continue;
        }

        match section {
            Section::Preamble => {}
            Section::Rankings => {
                if let Some(ranking) = parse_ranking_line(line) {
                    rankings.push(ranking);
                }
            }
            Section::NewCategory => {
                if let Some(v) = strip_key(line, "name:") {
                    new_name = v.to_string();
                } else if let Some(v) = strip_key(line, "score:") {
                    new_score = parse_score(v);
                } else if let Some(v) = strip_key(line, "description:") {
                    new_description = v.to_string();
                }
            }
        }
    }

    if let Some(new) = new_score.and_then(|s| new_category(&new_name, s, &new_description)) {
        rankings.push(new);
    }

    CategoryRankings::new(rankings)
}

fn parse_ranking_line(line: &str) -> Option<CategoryRanking> {
    let Some((category, score)) = line.split_once('|') else {
        debug!(line, "Skipping ranking line without separator");
        return None;
    };
    let category = category.trim();
    if category.is_empty() {
        return None;
    }
    match parse_score(score) {
        Some(score) => Some(CategoryRanking::new(category, score)),
        None => {
            warn!(line, "Skipping ranking line with unparsable score");
            None
        }
    }
}

/// Parse the single-answer format
///
/// ```text
/// CATEGORY: Coffee Shops
/// CONFIDENCE: 0.9
/// NEW: false
/// DESCRIPTION:
/// ```
pub fn parse_legacy(response: &str) -> Option<CategoryRanking> {
    let mut category = String::new();
    let mut confidence = 0.0;
    let mut is_new = false;
    let mut description = String::new();

    for line in response.lines() {
        let line = line.trim().trim_start_matches(['-', '*']).trim();
        if let Some(v) = strip_key(line, "CATEGORY:") {
            category = v.to_string();
        } else if let Some(v) = strip_key(line, "CONFIDENCE:") {
            confidence = parse_score(v).unwrap_or(0.0);
        } else if let Some(v) = strip_key(line, "NEW:") {
            is_new = matches!(v.to_ascii_lowercase().as_str(), "true" | "yes" | "1");
        } else if let Some(v) = strip_key(line, "DESCRIPTION:") {
            description = v.to_string();
        }
    }

    if category.is_empty() {
        return None;
    }

    Some(CategoryRanking {
        category,
        score: confidence,
        is_new,
        description: if is_new { description } else { String::new() },
    })
}

/// Parse a single-answer classification
pub fn parse_classification(response: &str) -> Result<Classification> {
    let payload = clean_markdown_wrapper(response);

    if let Ok(mut parsed) = serde_json::from_str::<Classification>(payload) {
        if !parsed.category.trim().is_empty() {
            parsed.category = parsed.category.trim().to_string();
            parsed.confidence = clamp_score(parsed.confidence);
            return Ok(parsed);
        }
    }

    parse_legacy(response)
        .map(|r| Classification {
            category: r.category,
            confidence: r.score,
            is_new: r.is_new,
            description: r.description,
        })
        .ok_or_else(|| {
            Error::Parse(format!(
                "No classification found in AI response | Raw: {}",
                truncate(response)
            ))
        })
}

/// Parse a generated category description
pub fn parse_description(response: &str) -> Result<DescriptionResult> {
    let payload = clean_markdown_wrapper(response);
    let mut parsed: DescriptionResult = serde_json::from_str(payload).map_err(|e| {
        Error::Parse(format!(
            "Invalid description JSON from AI: {} | Raw: {}",
            e,
            truncate(payload)
        ))
    })?;

    parsed.description = parsed.description.trim().to_string();
    if parsed.description.is_empty() {
        return Err(Error::Parse("AI returned an empty description".into()));
    }
    parsed.confidence = clamp_score(parsed.confidence);
    Ok(parsed)
}

/// Parse a merchant batch response into per-merchant rankings
///
/// The envelope must decode; individual merchants whose rankings fail
/// validation map to an empty list instead of failing the batch.
pub fn parse_merchant_batch(response: &str) -> Result<MerchantRankings> {
    let payload = clean_markdown_wrapper(response);
    let parsed: MerchantBatchPayload = serde_json::from_str(payload).map_err(|e| {
        Error::Parse(format!(
            "Invalid merchant batch JSON from AI: {} | Raw: {}",
            e,
            truncate(payload)
        ))
    })?;

    let mut results = MerchantRankings::new();
    for entry in parsed.classifications {
        let Some(merchant_id) = merchant_id(&entry) else {
            warn!("Skipping merchant classification without merchantId");
            continue;
        };

        let rankings = match serde_json::from_value::<RankingsPayload>(entry) {
            Ok(payload) => rankings_from_payload(payload).into_inner(),
            Err(e) => {
                warn!(merchant_id = %merchant_id, error = %e, "Invalid rankings for merchant");
                Vec::new()
            }
        };
        results.insert(merchant_id, rankings);
    }

    Ok(results)
}

fn merchant_id(entry: &Value) -> Option<String> {
    match entry.get("merchantId")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
