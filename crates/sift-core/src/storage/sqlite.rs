//! SQLite storage with connection pooling and migrations

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};
use tracing::info;

use super::Storage;
use crate::error::{Error, Result};
use crate::models::{Category, CheckPattern};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Categories created by `sift init`
const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("Auto & Transport", "Car payments, parking, rideshare, transit fares"),
    ("Coffee Shops", "Coffee, tea, and cafe purchases"),
    ("Dining", "Restaurants, takeout, and food delivery"),
    ("Entertainment", "Movies, concerts, events, and games"),
    ("Gas & Fuel", "Gas stations and EV charging"),
    ("Groceries", "Supermarkets and grocery delivery"),
    ("Healthcare", "Doctors, pharmacies, and insurance copays"),
    ("Housing", "Rent, mortgage, HOA dues, and repairs"),
    ("Income", "Paychecks, refunds, and interest"),
    ("Shopping", "General merchandise, clothing, and electronics"),
    ("Subscriptions", "Recurring streaming, software, and memberships"),
    ("Travel", "Flights, hotels, and rental cars"),
    ("Utilities", "Electric, water, gas, internet, and phone"),
    ("Other", "Anything without a better fit"),
];

/// SQLite-backed storage
#[derive(Clone)]
pub struct SqliteStorage {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl SqliteStorage {
    /// Open (or create) the database at `path` and run migrations
    pub fn new(path: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(10).build(manager)?;

        let storage = Self {
            pool,
            db_path: path.to_string(),
        };
        storage.run_migrations()?;

        Ok(storage)
    }

    /// Create a throwaway database (for testing)
    ///
    /// Uses a temporary file rather than `:memory:` so every pooled
    /// connection sees the same database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "sift_test_{}_{}.db",
            std::process::id(),
            id
        ));

        // Remove any existing file
        let _ = std::fs::remove_file(&path);

        Self::new(&path.to_string_lossy())
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE COLLATE NOCASE,
                description TEXT NOT NULL DEFAULT '',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS check_patterns (
                id INTEGER PRIMARY KEY,
                pattern_name TEXT NOT NULL,
                category TEXT NOT NULL,
                confidence_boost REAL NOT NULL DEFAULT 0,
                active INTEGER NOT NULL DEFAULT 1,
                amount_min REAL,
                amount_max REAL,
                check_number_pattern TEXT,
                merchant_pattern TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_check_patterns_active ON check_patterns(active);
            "#,
        )?;

        info!("Database migrations complete");
        Ok(())
    }

    /// Insert a category, or update the description of an existing one
    pub fn add_category(&self, name: &str, description: &str) -> Result<i64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidData("category name is empty".into()));
        }

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO categories (name, description) VALUES (?, ?)
            ON CONFLICT(name) DO UPDATE SET description = excluded.description
            "#,
            params![name, description.trim()],
        )?;
        let id = conn.query_row(
            "SELECT id FROM categories WHERE name = ?",
            params![name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Insert the default category set, skipping names that exist.
    /// Returns how many were added.
    pub fn seed_default_categories(&self) -> Result<usize> {
        let conn = self.conn()?;
        let mut added = 0;
        for (name, description) in DEFAULT_CATEGORIES {
            added += conn.execute(
                "INSERT OR IGNORE INTO categories (name, description) VALUES (?, ?)",
                params![name, description],
            )?;
        }
        if added > 0 {
            info!(added, "Seeded default categories");
        }
        Ok(added)
    }

    pub fn add_check_pattern(&self, pattern: &CheckPattern) -> Result<i64> {
        if pattern.pattern_name.trim().is_empty() || pattern.category.trim().is_empty() {
            return Err(Error::InvalidData(
                "check pattern needs a name and a category".into(),
            ));
        }
        if let Some(ref re) = pattern.check_number_pattern {
            regex::Regex::new(re)?;
        }

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO check_patterns (
                pattern_name, category, confidence_boost, active,
                amount_min, amount_max, check_number_pattern, merchant_pattern
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                pattern.pattern_name.trim(),
                pattern.category.trim(),
                pattern.confidence_boost,
                pattern.active,
                pattern.amount_min,
                pattern.amount_max,
                pattern.check_number_pattern,
                pattern.merchant_pattern,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn set_check_pattern_active(&self, id: i64, active: bool) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE check_patterns SET active = ? WHERE id = ?",
            params![active, id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("check pattern {}", id)));
        }
        Ok(())
    }

    pub fn get_check_pattern(&self, id: i64) -> Result<Option<CheckPattern>> {
        let conn = self.conn()?;
        let pattern = conn
            .query_row(
                &format!("{} WHERE id = ?", SELECT_PATTERNS),
                params![id],
                row_to_pattern,
            )
            .optional()?;
        Ok(pattern)
    }

    /// Every check pattern, active or not
    pub fn list_check_patterns(&self) -> Result<Vec<CheckPattern>> {
        self.query_patterns(&format!("{} ORDER BY id", SELECT_PATTERNS))
    }

    fn query_patterns(&self, sql: &str) -> Result<Vec<CheckPattern>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let patterns = stmt
            .query_map([], row_to_pattern)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(patterns)
    }
}

const SELECT_PATTERNS: &str = r#"
    SELECT id, pattern_name, category, confidence_boost, active,
           amount_min, amount_max, check_number_pattern, merchant_pattern
    FROM check_patterns
"#;

fn row_to_pattern(row: &Row) -> rusqlite::Result<CheckPattern> {
    Ok(CheckPattern {
        id: row.get(0)?,
        pattern_name: row.get(1)?,
        category: row.get(2)?,
        confidence_boost: row.get(3)?,
        active: row.get(4)?,
        amount_min: row.get(5)?,
        amount_max: row.get(6)?,
        check_number_pattern: row.get(7)?,
        merchant_pattern: row.get(8)?,
    })
}

impl Storage for SqliteStorage {
    fn get_categories(&self) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name, description FROM categories ORDER BY name")?;
        let categories = stmt
            .query_map([], |row| {
                Ok(Category {
                    name: row.get(0)?,
                    description: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    fn get_active_check_patterns(&self) -> Result<Vec<CheckPattern>> {
        self.query_patterns(&format!("{} WHERE active = 1 ORDER BY id", SELECT_PATTERNS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Transaction;
    use chrono::NaiveDate;

    #[test]
    fn test_seed_is_idempotent() {
        let db = SqliteStorage::in_memory().unwrap();
        let first = db.seed_default_categories().unwrap();
        assert_eq!(first, DEFAULT_CATEGORIES.len());
        assert_eq!(db.seed_default_categories().unwrap(), 0);
        assert_eq!(db.get_categories().unwrap().len(), DEFAULT_CATEGORIES.len());
    }

    #[test]
    fn test_add_category_upserts_description() {
        let db = SqliteStorage::in_memory().unwrap();
        let id = db.add_category("Pet Care", "Vets").unwrap();
        let again = db.add_category("pet care", "Vets and grooming").unwrap();
        assert_eq!(id, again);

        let categories = db.get_categories().unwrap();
        assert_eq!(categories.len(), 1);
        assert_eq!(categories[0].description, "Vets and grooming");
        assert!(db.add_category("  ", "x").is_err());
    }

    #[test]
    fn test_check_pattern_lifecycle() {
        let db = SqliteStorage::in_memory().unwrap();
        let mut rent = CheckPattern::new("Rent", "Housing", 0.3);
        rent.amount_min = Some(1000.0);
        rent.check_number_pattern = Some(r"^\d{4}$".into());
        let id = db.add_check_pattern(&rent).unwrap();

        let stored = db.get_check_pattern(id).unwrap().unwrap();
        assert_eq!(stored.amount_min, Some(1000.0));
        assert!(stored.active);

        let mut tx = Transaction::new(
            "1",
            "CHECK 1042",
            -1500.0,
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
        );
        tx.check_number = Some("1042".into());
        assert_eq!(db.get_matching_check_patterns(&tx).unwrap().len(), 1);

        db.set_check_pattern_active(id, false).unwrap();
        assert!(db.get_active_check_patterns().unwrap().is_empty());
        assert_eq!(db.list_check_patterns().unwrap().len(), 1);
        assert!(db.get_matching_check_patterns(&tx).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let db = SqliteStorage::in_memory().unwrap();
        let mut bad = CheckPattern::new("Bad", "Housing", 0.1);
        bad.check_number_pattern = Some("(".into());
        assert!(matches!(db.add_check_pattern(&bad), Err(Error::Regex(_))));
    }

    #[test]
    fn test_toggle_missing_pattern() {
        let db = SqliteStorage::in_memory().unwrap();
        assert!(matches!(
            db.set_check_pattern_active(99, true),
            Err(Error::NotFound(_))
        ));
    }
}
