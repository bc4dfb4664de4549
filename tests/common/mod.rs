//! Shared test fixtures

#![allow(dead_code)]

use clap::Parser;
use reqflow::config::AppConfig;
use reqflow::notify::MemoryMailer;
use reqflow::AppState;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;

pub const SAM: &str = "sam@claimclimbers.com";
pub const MATT: &str = "matt@claimclimbers.com";
pub const AMY: &str = "amy@claimclimbers.com";
pub const REQUESTOR: &str = "jo@claimclimbers.com";

pub async fn setup_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    for statement in [
        r#"
        CREATE TABLE IF NOT EXISTS sheet_rows (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS sheet_columns (
            position INTEGER PRIMARY KEY,
            header TEXT NOT NULL UNIQUE
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS sheet_cells (
            row_id INTEGER NOT NULL REFERENCES sheet_rows(row_id),
            position INTEGER NOT NULL REFERENCES sheet_columns(position),
            value TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (row_id, position)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS properties (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL
        )
        "#,
        r#"
        INSERT OR IGNORE INTO sheet_columns (position, header) VALUES
            (1, 'Department'),
            (2, 'Requisition Title'),
            (3, 'Requestor Name'),
            (4, 'Email Address'),
            (5, '1st Approval Status'),
            (6, '1st Approval Timestamp'),
            (7, '1st Approval By'),
            (8, '2nd Approval Status'),
            (9, '2nd Approval Timestamp'),
            (10, '2nd Approval By')
        "#,
    ] {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .expect("Failed to set up schema");
    }

    pool
}

pub fn test_config() -> AppConfig {
    AppConfig::try_parse_from([
        "reqflow",
        "--stakeholders",
        "sam@claimclimbers.com,matt@claimclimbers.com,amy@claimclimbers.com",
        "--base-url",
        "http://approvals.test",
        "--lock-timeout-secs",
        "5",
    ])
    .expect("Failed to build test config")
}

pub async fn setup_state() -> (Arc<AppState>, Arc<MemoryMailer>, SqlitePool) {
    let pool = setup_pool().await;
    let mailer = Arc::new(MemoryMailer::new());
    let state = AppState::new(&test_config(), pool.clone(), mailer.clone())
        .await
        .expect("Failed to build app state");
    (state, mailer, pool)
}

pub fn submission() -> HashMap<String, String> {
    HashMap::from([
        ("Department".to_string(), "Ops".to_string()),
        ("Requisition Title".to_string(), "Rope kit".to_string()),
        ("Requestor Name".to_string(), "Jo Field".to_string()),
        ("Email Address".to_string(), REQUESTOR.to_string()),
    ])
}

/// Pull the shared token out of an action-request email body
pub fn extract_token(html_body: &str) -> String {
    let start = html_body
        .find("token=")
        .expect("email body has no action token")
        + "token=".len();
    let rest = &html_body[start..];
    let end = rest.find('"').unwrap_or(rest.len());
    rest[..end].to_string()
}

/// Read one cell of a row by header label
pub async fn cell(pool: &SqlitePool, row_id: i64, header: &str) -> Option<String> {
    sqlx::query_as::<_, (String,)>(
        r#"
        SELECT s.value
        FROM sheet_cells s
        JOIN sheet_columns c ON c.position = s.position
        WHERE s.row_id = ? AND c.header = ?
        "#,
    )
    .bind(row_id)
    .bind(header)
    .fetch_optional(pool)
    .await
    .expect("cell query failed")
    .map(|(value,)| value)
}

pub async fn token_count(pool: &SqlitePool) -> i64 {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM properties")
        .fetch_one(pool)
        .await
        .expect("token count query failed");
    count
}
