//! Prompt templates for classifier calls
//!
//! Templates are markdown files compiled into the binary. Each has a
//! `# System` and a `# User` section; `{{var}}` placeholders are replaced
//! and `{{#if var}}...{{/if}}` blocks are kept only when `var` is non-empty.

use std::collections::HashMap;

use crate::ai::Prompt;
use crate::models::{Category, CheckPattern, MerchantSummary, Transaction};

/// Embedded templates (compiled into binary)
mod defaults {
    pub const CLASSIFY_RANKINGS: &str = include_str!("../../../../prompts/classify_rankings.md");
    pub const CLASSIFY_NEW_CATEGORY: &str =
        include_str!("../../../../prompts/classify_new_category.md");
    pub const CLASSIFY_MERCHANTS: &str = include_str!("../../../../prompts/classify_merchants.md");
    pub const DESCRIBE_CATEGORY: &str = include_str!("../../../../prompts/describe_category.md");
    pub const CORRECT_FIELD: &str = include_str!("../../../../prompts/correct_field.md");
}

/// Known prompt templates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptId {
    ClassifyRankings,
    /// Used when the caller supplies no categories
    ClassifyNewCategory,
    ClassifyMerchants,
    DescribeCategory,
    CorrectField,
}

impl PromptId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClassifyRankings => "classify_rankings",
            Self::ClassifyNewCategory => "classify_new_category",
            Self::ClassifyMerchants => "classify_merchants",
            Self::DescribeCategory => "describe_category",
            Self::CorrectField => "correct_field",
        }
    }

    fn content(&self) -> &'static str {
        match self {
            Self::ClassifyRankings => defaults::CLASSIFY_RANKINGS,
            Self::ClassifyNewCategory => defaults::CLASSIFY_NEW_CATEGORY,
            Self::ClassifyMerchants => defaults::CLASSIFY_MERCHANTS,
            Self::DescribeCategory => defaults::DESCRIBE_CATEGORY,
            Self::CorrectField => defaults::CORRECT_FIELD,
        }
    }

    /// Render the system and user sections with `vars`
    fn render(&self, vars: &HashMap<&str, String>) -> (Option<String>, String) {
        let content = self.content();
        let system = extract_section(content, "# System").map(|s| render(s, vars));
        let user = extract_section(content, "# User")
            .map(|s| render(s, vars))
            .unwrap_or_else(|| render(content, vars));
        (system, user)
    }
}

fn extract_section<'a>(content: &'a str, header: &str) -> Option<&'a str> {
    let start = content.find(header)?;
    let after_header = &content[start + header.len()..];

    // Next header or end of content
    let end = after_header.find("\n# ").unwrap_or(after_header.len());

    Some(after_header[..end].trim())
}

/// Substitute every `{{var}}` in one pass; values are never re-scanned
fn render(template: &str, vars: &HashMap<&str, String>) -> String {
    let template = remove_unmatched_conditionals(template, vars);
    let mut result = String::with_capacity(template.len());
    let mut rest = template.as_str();

    while let Some(open) = rest.find("{{") {
        result.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            rest = &rest[open..];
            break;
        };
        match vars.get(after[..close].trim()) {
            Some(value) => result.push_str(value),
            None => result.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &after[close + 2..];
    }

    result.push_str(rest);
    result
}

/// Keep `{{#if var}}` blocks whose variable is non-empty, drop the rest
fn remove_unmatched_conditionals(content: &str, vars: &HashMap<&str, String>) -> String {
    let mut result = content.to_string();

    while let Some(if_start) = result.find("{{#if ") {
        let var_start = if_start + 6;
        let Some(var_end) = result[var_start..].find("}}") else {
            break;
        };
        let var_name = &result[var_start..var_start + var_end];
        let block_start = var_start + var_end + 2;
        let Some(endif_pos) = result[block_start..].find("{{/if}}") else {
            break;
        };
        let full_end = block_start + endif_pos + 7;

        let keep = vars.get(var_name).is_some_and(|v| !v.is_empty());
        result = if keep {
            format!(
                "{}{}{}",
                &result[..if_start],
                &result[block_start..block_start + endif_pos],
                &result[full_end..]
            )
        } else {
            format!("{}{}", &result[..if_start], &result[full_end..])
        };
    }

    result
}

fn transaction_vars(tx: &Transaction) -> HashMap<&'static str, String> {
    let mut vars = HashMap::new();
    vars.insert("merchant", tx.merchant_name.trim().to_string());
    vars.insert("description", tx.description.trim().to_string());
    vars.insert("amount", format!("{:.2}", tx.amount));
    vars.insert("date", tx.date.to_string());
    vars.insert("tx_type", tx.tx_type.clone().unwrap_or_default());
    vars.insert("check_number", tx.check_number.clone().unwrap_or_default());
    vars.insert("hints", tx.category_hints.join(", "));
    vars
}

fn category_list(categories: &[Category]) -> String {
    categories
        .iter()
        .map(|c| {
            if c.description.trim().is_empty() {
                format!("- {}", c.name)
            } else {
                format!("- {}: {}", c.name, c.description.trim())
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Ranking prompt for one transaction
///
/// With no categories the provider is asked to propose one instead.
/// `patterns` are the active check patterns matching the transaction.
pub fn rankings_prompt(
    tx: &Transaction,
    categories: &[Category],
    patterns: &[CheckPattern],
) -> Prompt {
    let mut vars = transaction_vars(tx);
    let id = if categories.is_empty() {
        PromptId::ClassifyNewCategory
    } else {
        vars.insert("categories", category_list(categories));
        vars.insert(
            "pattern_hints",
            patterns
                .iter()
                .map(|p| format!("- {} suggests {}", p.pattern_name, p.category))
                .collect::<Vec<_>>()
                .join("\n"),
        );
        PromptId::ClassifyRankings
    };

    let (system, user) = id.render(&vars);
    Prompt::classification(user).with_system(system.as_deref())
}

/// One prompt for a chunk of merchants
///
/// Each merchant is a single line starting with its quoted `merchantId`.
pub fn merchant_batch_prompt(merchants: &[MerchantSummary], categories: &[Category]) -> Prompt {
    let lines = merchants
        .iter()
        .map(|m| {
            let samples = m
                .sample_descriptions
                .iter()
                .map(|s| format!("{:?}", s))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "- merchantId: {:?} name: {:?} transactions: {} total: {:.2} samples: [{}]",
                m.merchant_id, m.merchant_name, m.transaction_count, m.total_amount, samples
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut vars = HashMap::new();
    vars.insert("categories", category_list(categories));
    vars.insert("merchants", lines);

    let (system, user) = PromptId::ClassifyMerchants.render(&vars);
    Prompt::classification(user).with_system(system.as_deref())
}

/// Description prompt for a category, with example transaction texts
pub fn description_prompt(name: &str, examples: &[String]) -> Prompt {
    let mut vars = HashMap::new();
    vars.insert("name", name.trim().to_string());
    vars.insert(
        "examples",
        examples
            .iter()
            .filter(|e| !e.trim().is_empty())
            .map(|e| format!("- {}", e.trim()))
            .collect::<Vec<_>>()
            .join("\n"),
    );

    let (system, user) = PromptId::DescribeCategory.render(&vars);
    Prompt::description(user).with_system(system.as_deref())
}

/// Patch-list prompt for repairing one field of a JSON document
pub fn correct_field_prompt(document: &str, field: &str, problem: &str) -> Prompt {
    let mut vars = HashMap::new();
    vars.insert("document", document.trim().to_string());
    vars.insert("field", field.to_string());
    vars.insert("problem", problem.trim().to_string());

    let (system, user) = PromptId::CorrectField.render(&vars);
    Prompt::analysis(user).with_system(system.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::CallKind;
    use chrono::NaiveDate;

    fn starbucks() -> Transaction {
        Transaction::new(
            "tx-1",
            "STARBUCKS #1234",
            -5.75,
            NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
        )
    }

    #[test]
    fn test_rankings_prompt_lists_categories() {
        let categories = vec![
            Category::new("Coffee Shops", "Cafes"),
            Category::new("Dining", ""),
        ];
        let prompt = rankings_prompt(&starbucks(), &categories, &[]);

        assert_eq!(prompt.kind, CallKind::Classification);
        assert!(prompt.system.is_some());
        assert!(prompt.user.contains("Merchant: STARBUCKS #1234"));
        assert!(prompt.user.contains("Amount: -5.75"));
        assert!(prompt.user.contains("- Coffee Shops: Cafes"));
        assert!(prompt.user.contains("- Dining\n"));
        assert!(!prompt.user.contains("propose a new category"));
        assert!(!prompt.user.contains("Rules that matched"));
        assert!(!prompt.user.contains("Type:"));
        assert!(!prompt.user.contains("{{"));
    }

    #[test]
    fn test_rankings_prompt_with_pattern_hints() {
        let mut tx = starbucks();
        tx.tx_type = Some("CHECK".into());
        tx.check_number = Some("1042".into());
        let patterns = vec![CheckPattern::new("Rent check", "Housing", 0.3)];
        let prompt = rankings_prompt(&tx, &[Category::new("Housing", "")], &patterns);

        assert!(prompt.user.contains("Type: CHECK"));
        assert!(prompt.user.contains("Check number: 1042"));
        assert!(prompt.user.contains("- Rent check suggests Housing"));
    }

    #[test]
    fn test_empty_categories_asks_for_new_category() {
        let prompt = rankings_prompt(&starbucks(), &[], &[]);
        assert!(prompt.user.contains("propose a new category"));
        assert!(!prompt.user.contains("Categories:"));
    }

    #[test]
    fn test_merchant_batch_prompt_lines() {
        let merchants = vec![MerchantSummary {
            merchant_id: "m-1".into(),
            merchant_name: "SHELL OIL".into(),
            transaction_count: 2,
            total_amount: -80.0,
            sample_descriptions: vec!["SHELL OIL 5742".into()],
        }];
        let prompt = merchant_batch_prompt(&merchants, &[Category::new("Gas & Fuel", "")]);
        assert!(prompt
            .user
            .lines()
            .any(|l| l.contains("merchantId: \"m-1\"") && l.contains("SHELL OIL")));
    }

    #[test]
    fn test_description_and_correction_prompts() {
        let prompt = description_prompt("Pet Care", &["PETCO #12".into(), " ".into()]);
        assert_eq!(prompt.kind, CallKind::Description);
        assert!(prompt.user.contains("\"Pet Care\""));
        assert!(prompt.user.contains("- PETCO #12"));

        let prompt = description_prompt("Pet Care", &[]);
        assert!(!prompt.user.contains("Example transactions"));

        let prompt = correct_field_prompt(r#"{"amount":"abc"}"#, "amount", "not a number");
        assert_eq!(prompt.kind, CallKind::Analysis);
        assert!(prompt.user.contains("\"path\""));
        assert!(prompt.user.contains("`amount`"));
    }

    #[test]
    fn test_placeholder_in_value_not_expanded() {
        let tx = Transaction::new(
            "tx-2",
            "ACME {{categories}}",
            -12.0,
            NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
        );
        let prompt = rankings_prompt(&tx, &[Category::new("Shopping", "Stores")], &[]);
        assert!(prompt.user.contains("Merchant: ACME {{categories}}"));
        assert_eq!(prompt.user.matches("- Shopping: Stores").count(), 1);

        let mut vars = HashMap::new();
        vars.insert("a", "{{b}}".to_string());
        vars.insert("b", "B".to_string());
        assert_eq!(render("{{a}}-{{b}}-{{c}}", &vars), "{{b}}-B-{{c}}");
    }

    #[test]
    fn test_conditionals() {
        let mut vars = HashMap::new();
        vars.insert("a", "x".to_string());
        vars.insert("b", String::new());
        let out = render("[{{#if a}}A={{a}}{{/if}}][{{#if b}}B{{/if}}][{{#if c}}C{{/if}}]", &vars);
        assert_eq!(out, "[A=x][][]");
    }
}
