//! Row store adapter for the sheet-shaped tables
//!
//! Rows are integer-keyed; columns are resolved by header label through a
//! `HeaderIndex` snapshot loaded once at startup. Decision cells for a
//! stage are three adjacent columns anchored at the stage's status header.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::models::{Decision, DecisionRecord, DecisionStatus, Requisition, Stage};

// Well-known submitted-field headers
pub const DEPARTMENT: &str = "Department";
pub const REQUISITION_TITLE: &str = "Requisition Title";
pub const REQUESTOR_NAME: &str = "Requestor Name";
pub const EMAIL_ADDRESS: &str = "Email Address";

/// Header-row snapshot mapping labels to column positions
pub struct HeaderIndex {
    positions: HashMap<String, i64>,
}

impl HeaderIndex {
    /// Load the header row. Called once at startup; the result is injected
    /// into the `RowStore` constructor.
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT header, position FROM sheet_columns")
                .fetch_all(pool)
                .await?;

        Ok(Self {
            positions: rows.into_iter().collect(),
        })
    }

    /// Resolve a header label. A miss is schema drift, not a runtime
    /// condition, and aborts the triggering operation.
    pub fn position(&self, header: &str) -> Result<i64> {
        self.positions
            .get(header)
            .copied()
            .ok_or_else(|| AppError::HeaderNotFound(header.to_string()))
    }

    fn max_position(&self) -> i64 {
        self.positions.values().copied().max().unwrap_or(0)
    }
}

/// Reads and writes named fields of integer-keyed rows. Sole owner of row
/// field mutation.
#[derive(Clone)]
pub struct RowStore {
    pool: SqlitePool,
    headers: Arc<RwLock<HeaderIndex>>,
}

impl RowStore {
    pub fn new(pool: SqlitePool, headers: HeaderIndex) -> Self {
        Self {
            pool,
            headers: Arc::new(RwLock::new(headers)),
        }
    }

    pub async fn column_index(&self, header: &str) -> Result<i64> {
        self.headers.read().await.position(header)
    }

    /// Resolve a header, appending a new column for labels the snapshot
    /// has never seen (submitted forms may carry arbitrary extra fields).
    async fn ensure_column(&self, header: &str) -> Result<i64> {
        if let Ok(position) = self.headers.read().await.position(header) {
            return Ok(position);
        }

        let mut headers = self.headers.write().await;
        // Lost the race to another appender
        if let Ok(position) = headers.position(header) {
            return Ok(position);
        }

        let position = headers.max_position() + 1;
        sqlx::query("INSERT INTO sheet_columns (position, header) VALUES (?, ?)")
            .bind(position)
            .bind(header)
            .execute(&self.pool)
            .await?;
        headers.positions.insert(header.to_string(), position);

        Ok(position)
    }

    async fn set_cell(&self, row_id: i64, position: i64, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sheet_cells (row_id, position, value)
            VALUES (?, ?, ?)
            ON CONFLICT(row_id, position) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(row_id)
        .bind(position)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Append a new row with the submitted fields, seeding both stage
    /// status cells to Pending. Returns the assigned row id.
    pub async fn append_row(&self, fields: &HashMap<String, String>) -> Result<i64> {
        let result = sqlx::query("INSERT INTO sheet_rows (created_at) VALUES (?)")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        let row_id = result.last_insert_rowid();

        for (header, value) in fields {
            let position = self.ensure_column(header).await?;
            self.set_cell(row_id, position, value).await?;
        }

        for stage in [Stage::First, Stage::Second] {
            let position = self.column_index(stage.status_header()).await?;
            self.set_cell(row_id, position, DecisionStatus::Pending.as_str())
                .await?;
        }

        Ok(row_id)
    }

    /// Read the full row as a header-keyed mapping
    pub async fn read_row(&self, row_id: i64) -> Result<HashMap<String, String>> {
        let cells: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT c.header, s.value
            FROM sheet_cells s
            JOIN sheet_columns c ON c.position = s.position
            WHERE s.row_id = ?
            "#,
        )
        .bind(row_id)
        .fetch_all(&self.pool)
        .await?;

        if cells.is_empty() {
            return Err(AppError::RowNotFound(row_id));
        }

        Ok(cells.into_iter().collect())
    }

    /// Write the three adjacent decision cells (status, timestamp,
    /// approver) anchored at the stage's status column. Overwrites
    /// unconditionally; callers hold the document lock.
    pub async fn write_decision_fields(
        &self,
        row_id: i64,
        stage: Stage,
        decision: Decision,
        timestamp: DateTime<Utc>,
        approver: &str,
    ) -> Result<()> {
        let status_position = self.column_index(stage.status_header()).await?;

        self.set_cell(row_id, status_position, DecisionStatus::from(decision).as_str())
            .await?;
        self.set_cell(row_id, status_position + 1, &timestamp.to_rfc3339())
            .await?;
        self.set_cell(row_id, status_position + 2, approver).await?;

        Ok(())
    }

    /// Typed view of a row: submitted fields plus both decision records
    pub async fn read_requisition(&self, row_id: i64) -> Result<Requisition> {
        let fields = self.read_row(row_id).await?;
        let first = decision_record(&fields, Stage::First)?;
        let second = decision_record(&fields, Stage::Second)?;

        Ok(Requisition {
            row_id,
            fields,
            first,
            second,
        })
    }
}

fn decision_record(fields: &HashMap<String, String>, stage: Stage) -> Result<DecisionRecord> {
    let status = match fields.get(stage.status_header()).map(String::as_str) {
        None | Some("") => DecisionStatus::Pending,
        Some(value) => value.parse().map_err(AppError::Internal)?,
    };

    let decided_at = fields
        .get(stage.timestamp_header())
        .filter(|value| !value.is_empty())
        .map(|value| {
            DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc))
        })
        .transpose()
        .map_err(|e| AppError::Internal(format!("Invalid decision timestamp: {}", e)))?;

    let approver = fields
        .get(stage.approver_header())
        .filter(|value| !value.is_empty())
        .cloned();

    Ok(DecisionRecord {
        status,
        decided_at,
        approver,
    })
}
