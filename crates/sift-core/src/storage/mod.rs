//! Category and check-pattern storage
//!
//! The classifier never reads storage itself: callers load categories and
//! patterns and pass them per call. This module gives those callers a
//! common interface with a SQLite implementation for the CLI and an
//! in-memory one for tests and embedding.

mod sqlite;

pub use sqlite::{DbConn, DbPool, SqliteStorage};

use std::sync::{Arc, RwLock};

use crate::error::Result;
use crate::models::{Category, CheckPattern, Transaction};

/// Read access to categories and check patterns
pub trait Storage: Send + Sync {
    /// All categories, ordered by name
    fn get_categories(&self) -> Result<Vec<Category>>;

    /// Check patterns with `active = true`
    fn get_active_check_patterns(&self) -> Result<Vec<CheckPattern>>;

    /// Active patterns whose criteria match `transaction`
    fn get_matching_check_patterns(&self, transaction: &Transaction) -> Result<Vec<CheckPattern>> {
        Ok(self
            .get_active_check_patterns()?
            .into_iter()
            .filter(|p| p.matches(transaction))
            .collect())
    }
}

/// Storage held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    categories: Arc<RwLock<Vec<Category>>>,
    patterns: Arc<RwLock<Vec<CheckPattern>>>,
}

impl MemoryStorage {
    pub fn new(categories: Vec<Category>, patterns: Vec<CheckPattern>) -> Self {
        Self {
            categories: Arc::new(RwLock::new(categories)),
            patterns: Arc::new(RwLock::new(patterns)),
        }
    }

    pub fn add_category(&self, category: Category) {
        self.categories
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(category);
    }

    pub fn add_check_pattern(&self, pattern: CheckPattern) {
        self.patterns
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(pattern);
    }
}

impl Storage for MemoryStorage {
    fn get_categories(&self) -> Result<Vec<Category>> {
        let mut categories = self
            .categories
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    fn get_active_check_patterns(&self) -> Result<Vec<CheckPattern>> {
        Ok(self
            .patterns
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|p| p.active)
            .cloned()
            .collect())
    }
}
