//! Category command implementations

use anyhow::{Context, Result};
use sift_core::{SqliteStorage, Storage};

use super::truncate;

pub fn cmd_categories_list(db: &SqliteStorage) -> Result<()> {
    let categories = db.get_categories()?;

    if categories.is_empty() {
        println!("No categories found. Run 'sift init' to seed default categories.");
        return Ok(());
    }

    println!();
    println!("🗂️  Categories ({})", categories.len());
    println!("   ─────────────────────────────────────────────────────────────");
    for category in &categories {
        if category.description.is_empty() {
            println!("   • {}", category.name);
        } else {
            println!(
                "   • {:<20} {}",
                category.name,
                truncate(&category.description, 50)
            );
        }
    }

    Ok(())
}

pub fn cmd_categories_add(db: &SqliteStorage, name: &str, description: &str) -> Result<()> {
    let id = db
        .add_category(name, description)
        .with_context(|| format!("Failed to add category '{}'", name))?;
    println!("✅ Saved category '{}' (id: {})", name.trim(), id);
    Ok(())
}
