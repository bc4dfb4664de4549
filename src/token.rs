//! Single-use approval tokens
//!
//! Tokens live in the generic key-value property store, keyed by
//! `"{row}_{stage}_{approver}"`. At most one live token per key: issuing
//! overwrites, which silently kills any older emailed link for the same
//! (row, stage, approver).

use rand::distributions::Alphanumeric;
use rand::Rng;
use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::Stage;

const TOKEN_LEN: usize = 32;

/// Issues, verifies, and invalidates approval tokens. Sole owner of the
/// token lifecycle.
#[derive(Clone)]
pub struct TokenStore {
    pool: SqlitePool,
}

impl TokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn key(row: i64, stage: Stage, approver: &str) -> String {
        format!("{}_{}_{}", row, stage.number(), approver)
    }

    /// Generate and persist a fresh token, replacing any previous one for
    /// the same key.
    pub async fn issue(&self, row: i64, stage: Stage, approver: &str) -> Result<String> {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect();

        sqlx::query(
            r#"
            INSERT INTO properties (key, value)
            VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(Self::key(row, stage, approver))
        .bind(&token)
        .execute(&self.pool)
        .await?;

        Ok(token)
    }

    /// True iff a token is stored for the key and equals the supplied
    /// value. Does not consume it.
    pub async fn verify(&self, row: i64, stage: Stage, approver: &str, token: &str) -> Result<bool> {
        let stored: Option<(String,)> =
            sqlx::query_as("SELECT value FROM properties WHERE key = ?")
                .bind(Self::key(row, stage, approver))
                .fetch_optional(&self.pool)
                .await?;

        Ok(stored.map(|(value,)| value == token).unwrap_or(false))
    }

    /// Remove the stored token for the key. No-op when absent.
    pub async fn invalidate(&self, row: i64, stage: Stage, approver: &str) -> Result<()> {
        sqlx::query("DELETE FROM properties WHERE key = ?")
            .bind(Self::key(row, stage, approver))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Remove every listed approver's token for (row, stage). Used when a
    /// stage-1 decision advances the row: the siblings' unused links die
    /// with it.
    pub async fn invalidate_stage(
        &self,
        row: i64,
        stage: Stage,
        approvers: &[String],
    ) -> Result<()> {
        for approver in approvers {
            self.invalidate(row, stage, approver).await?;
        }
        Ok(())
    }
}
