//! Check pattern command implementations

use anyhow::{Context, Result};
use sift_core::{CheckPattern, SqliteStorage};

pub fn cmd_patterns_list(db: &SqliteStorage) -> Result<()> {
    let patterns = db.list_check_patterns()?;

    if patterns.is_empty() {
        println!("No check patterns. Add one with 'sift patterns add'.");
        return Ok(());
    }

    println!();
    println!("🧾 Check patterns");
    println!("   ─────────────────────────────────────────────────────────────");
    for p in &patterns {
        let status = if p.active { "  " } else { "⏸ " };
        let mut criteria = Vec::new();
        if let Some(min) = p.amount_min {
            criteria.push(format!("≥ ${:.2}", min));
        }
        if let Some(max) = p.amount_max {
            criteria.push(format!("≤ ${:.2}", max));
        }
        if let Some(ref re) = p.check_number_pattern {
            criteria.push(format!("check /{}/", re));
        }
        if let Some(ref m) = p.merchant_pattern {
            criteria.push(format!("merchant {}", m));
        }
        let criteria = if criteria.is_empty() {
            "any check".to_string()
        } else {
            criteria.join(", ")
        };
        println!(
            "   {}[{}] {} → {} (+{:.2}) [{}]",
            status, p.id, p.pattern_name, p.category, p.confidence_boost, criteria
        );
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_patterns_add(
    db: &SqliteStorage,
    name: &str,
    category: &str,
    boost: f64,
    amount_min: Option<f64>,
    amount_max: Option<f64>,
    check_number: Option<&str>,
    merchant: Option<&str>,
) -> Result<i64> {
    if !(0.0..=1.0).contains(&boost) {
        anyhow::bail!("Boost must be between 0.0 and 1.0, got {}", boost);
    }

    let mut pattern = CheckPattern::new(name, category, boost);
    pattern.amount_min = amount_min;
    pattern.amount_max = amount_max;
    pattern.check_number_pattern = check_number.map(str::to_string);
    pattern.merchant_pattern = merchant.map(str::to_string);

    let id = db
        .add_check_pattern(&pattern)
        .with_context(|| format!("Failed to add check pattern '{}'", name))?;
    println!("✅ Added check pattern '{}' (id: {})", name, id);
    Ok(id)
}

pub fn cmd_patterns_set_active(db: &SqliteStorage, id: i64, active: bool) -> Result<()> {
    db.set_check_pattern_active(id, active)
        .with_context(|| format!("Failed to update check pattern {}", id))?;
    if active {
        println!("✅ Enabled check pattern {}", id);
    } else {
        println!("⏸  Disabled check pattern {}", id);
    }
    Ok(())
}
