//! Submission ingest - the row-creation trigger
//!
//! Fired by the external form once per submission with the new row's
//! field mapping. There is no interactive caller here, so failures are
//! logged and returned as plain HTTP errors rather than rendered pages.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::AppState;

/// POST /submissions handler
pub async fn handler(
    State(state): State<Arc<AppState>>,
    Json(fields): Json<HashMap<String, String>>,
) -> Result<impl IntoResponse> {
    let row = state.workflow.handle_submission(&fields).await.map_err(|e| {
        tracing::error!("Submission ingest failed: {}", e);
        e
    })?;

    Ok((StatusCode::CREATED, Json(json!({ "row": row }))))
}
