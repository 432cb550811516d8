//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::io::Write;

use chrono::NaiveDate;
use sift_core::{AIClient, Classifier, MockBackend, RequestContext, SqliteStorage, Storage, Transaction};

use crate::commands::{self, truncate, BatchOutput};

fn setup_test_db() -> SqliteStorage {
    let db = SqliteStorage::in_memory().unwrap();
    db.seed_default_categories().unwrap();
    db
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 2, 14).unwrap()
}

// ========== Init / Config Tests ==========

#[test]
fn test_cmd_init_creates_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sift.db");
    commands::cmd_init(&path).unwrap();
    assert!(path.exists());

    // Re-running is harmless
    commands::cmd_init(&path).unwrap();
    let db = commands::open_db(&path).unwrap();
    assert!(!db.get_categories().unwrap().is_empty());
}

#[test]
fn test_load_config_explicit_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[batch]\nconcurrency = 3").unwrap();
    let config = commands::load_config(Some(file.path())).unwrap();
    assert_eq!(config.batch.concurrency, 3);

    let missing = file.path().with_extension("missing");
    assert!(commands::load_config(Some(&missing)).is_err());
}

// ========== Category / Pattern Command Tests ==========

#[test]
fn test_cmd_categories() {
    let db = SqliteStorage::in_memory().unwrap();
    assert!(commands::cmd_categories_list(&db).is_ok());

    commands::cmd_categories_add(&db, "Pet Care", "Vets and supplies").unwrap();
    assert!(commands::cmd_categories_add(&db, "  ", "").is_err());

    let categories = db.get_categories().unwrap();
    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0].name, "Pet Care");
    assert!(commands::cmd_categories_list(&db).is_ok());
}

#[test]
fn test_cmd_patterns_lifecycle() {
    let db = setup_test_db();
    let id = commands::cmd_patterns_add(
        &db,
        "Rent",
        "Housing",
        0.3,
        Some(1000.0),
        None,
        Some(r"^\d{4}$"),
        None,
    )
    .unwrap();
    assert!(commands::cmd_patterns_list(&db).is_ok());

    commands::cmd_patterns_set_active(&db, id, false).unwrap();
    assert!(db.get_active_check_patterns().unwrap().is_empty());
    commands::cmd_patterns_set_active(&db, id, true).unwrap();
    assert_eq!(db.get_active_check_patterns().unwrap().len(), 1);

    assert!(commands::cmd_patterns_set_active(&db, 999, false).is_err());
}

#[test]
fn test_cmd_patterns_add_validates() {
    let db = setup_test_db();
    assert!(commands::cmd_patterns_add(&db, "Big", "Housing", 1.5, None, None, None, None).is_err());
    assert!(commands::cmd_patterns_add(&db, "Bad", "Housing", 0.1, None, None, Some("("), None).is_err());
}

// ========== Classification Command Tests ==========

#[tokio::test]
async fn test_cmd_classify_applies_matching_patterns() {
    let db = setup_test_db();
    commands::cmd_patterns_add(&db, "Rent", "Housing", 0.3, Some(1000.0), None, None, None)
        .unwrap();

    let mock = MockBackend::new().respond_with(
        r#"{"rankings":[{"category":"Utilities","score":0.6},{"category":"Housing","score":0.5}]}"#,
    );
    let classifier = Classifier::with_defaults(AIClient::from(mock.clone()));
    let mut tx = Transaction::new("cli", "CHECK 2210", -1650.0, date());
    tx.check_number = Some("2210".into());

    let rankings =
        commands::cmd_classify(&RequestContext::new(), &db, &classifier, &tx, false)
            .await
            .unwrap();
    assert_eq!(rankings.top().unwrap().category, "Housing");
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn test_cmd_batch_transactions_and_merchants() {
    let db = setup_test_db();
    let classifier = Classifier::with_defaults(AIClient::mock());

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[
            {{"id": "1", "merchantName": "STARBUCKS", "amount": -4.5, "date": "2024-02-01"}},
            {{"id": "2", "merchantName": "SHELL OIL", "amount": -38.0, "date": "2024-02-02"}},
            {{"id": "3", "merchantName": "Starbucks", "amount": -5.0, "date": "2024-02-03"}}
        ]"#
    )
    .unwrap();

    let ctx = RequestContext::new();
    match commands::cmd_batch(&ctx, &db, &classifier, file.path(), false, false)
        .await
        .unwrap()
    {
        BatchOutput::Transactions(suggestions) => {
            let names: Vec<_> = suggestions.iter().map(|s| s.category.as_str()).collect();
            assert_eq!(names, vec!["Coffee Shops", "Gas & Fuel", "Coffee Shops"]);
        }
        other => panic!("unexpected: {other:?}"),
    }

    match commands::cmd_batch(&ctx, &db, &classifier, file.path(), true, true)
        .await
        .unwrap()
    {
        BatchOutput::Merchants(rankings) => {
            assert_eq!(rankings.len(), 2);
            assert_eq!(rankings["shell oil"][0].category, "Gas & Fuel");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn test_cmd_batch_rejects_bad_file() {
    let db = setup_test_db();
    let classifier = Classifier::with_defaults(AIClient::mock());
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "not json").unwrap();

    let result = commands::cmd_batch(
        &RequestContext::new(),
        &db,
        &classifier,
        file.path(),
        false,
        false,
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_cmd_describe_saves() {
    let db = setup_test_db();
    let classifier = Classifier::with_defaults(AIClient::mock());
    let examples = vec!["PETCO #123".to_string()];

    let result = commands::cmd_describe(
        &RequestContext::new(),
        &db,
        &classifier,
        "Pet Care",
        &examples,
        true,
    )
    .await
    .unwrap();

    let saved = db
        .get_categories()
        .unwrap()
        .into_iter()
        .find(|c| c.name == "Pet Care")
        .unwrap();
    assert_eq!(saved.description, result.description);
}

#[tokio::test]
async fn test_cmd_backend_reports_health() {
    assert!(commands::cmd_backend(&AIClient::mock()).await.unwrap());
    let unhealthy = AIClient::from(MockBackend::unhealthy());
    assert!(!commands::cmd_backend(&unhealthy).await.unwrap());
}

// ========== Helper Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a longer merchant name", 10), "a longe...");
    assert_eq!(truncate("café crème brûlée", 8), "café ...");
}
