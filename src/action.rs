//! HTTP action endpoint for emailed approve/deny links
//!
//! Every outcome is a rendered HTML page with status 200; errors are
//! shown, never signaled, and nothing propagates as an unhandled fault to
//! the stakeholder's browser.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Html;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::WorkflowState;
use crate::workflow::{DecisionAction, DecisionOutcome};
use crate::AppState;

/// Raw query parameters; everything optional so parse failures become
/// rendered pages instead of extractor rejections
#[derive(Debug, Default, Deserialize)]
pub struct ActionParams {
    pub row: Option<String>,
    pub stage: Option<String>,
    pub decision: Option<String>,
    pub approver: Option<String>,
    pub token: Option<String>,
}

impl ActionParams {
    fn require(value: Option<String>, name: &str) -> Result<String> {
        value
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AppError::InvalidRequest(format!("Missing parameter: {}", name)))
    }

    pub fn parse(self) -> Result<DecisionAction> {
        let row = Self::require(self.row, "row")?
            .parse::<i64>()
            .map_err(|_| AppError::InvalidRequest("Parameter 'row' must be an integer".into()))?;
        let stage = Self::require(self.stage, "stage")?
            .parse()
            .map_err(|_| AppError::InvalidRequest("Parameter 'stage' must be 1 or 2".into()))?;
        let decision = Self::require(self.decision, "decision")?.parse().map_err(|_| {
            AppError::InvalidRequest("Parameter 'decision' must be Approved or Denied".into())
        })?;
        let approver = Self::require(self.approver, "approver")?;
        let token = Self::require(self.token, "token")?;

        Ok(DecisionAction {
            row,
            stage,
            decision,
            approver,
            token,
        })
    }
}

/// GET /action handler
pub async fn handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ActionParams>,
) -> Html<String> {
    match process(&state, &headers, params).await {
        Ok(outcome) => Html(render_confirmation(&outcome)),
        Err(e) => {
            match &e {
                AppError::InvalidRequest(_)
                | AppError::InvalidToken
                | AppError::Unauthorized
                | AppError::LockTimeout => tracing::warn!("Rejected action: {}", e),
                other => tracing::error!("Action failed: {}", other),
            }
            Html(render_error(&e))
        }
    }
}

async fn process(
    state: &AppState,
    headers: &HeaderMap,
    params: ActionParams,
) -> Result<DecisionOutcome> {
    let action = params.parse()?;

    // The fronting proxy authenticates the clicker and passes the email
    // along in a trusted header
    let acting_email = headers
        .get(state.identity_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or(AppError::Unauthorized)?;

    state.workflow.handle_decision(action, &acting_email).await
}

fn render_confirmation(outcome: &DecisionOutcome) -> String {
    let next = match outcome.state {
        WorkflowState::AwaitingSecond => {
            "The 2nd approval round has been sent to the stakeholders.".to_string()
        }
        WorkflowState::Terminal(decision) => format!(
            "The requestor has been notified that the requisition was {}.",
            decision.as_str()
        ),
        WorkflowState::AwaitingFirst => String::new(),
    };

    format!(
        r#"<html><head><title>Decision recorded</title></head><body>
<h2>Thank you</h2>
<p>Your <b>{}</b> decision for requisition #{} ({} approval) has been recorded.</p>
<p>{}</p>
</body></html>"#,
        outcome.decision.as_str(),
        outcome.row,
        outcome.stage.ordinal(),
        next,
    )
}

fn render_error(error: &AppError) -> String {
    let message = match error {
        AppError::InvalidRequest(_)
        | AppError::InvalidToken
        | AppError::Unauthorized => error.to_string(),
        // A vanished row looks like any other dead link from the outside
        AppError::RowNotFound(_) => AppError::InvalidToken.to_string(),
        AppError::LockTimeout => {
            "The approval system is busy right now. Your decision was not recorded; \
             please try the link again."
                .to_string()
        }
        _ => "Something went wrong while recording your decision. \
              Please contact the administrator."
            .to_string(),
    };

    format!(
        r#"<html><head><title>Unable to record decision</title></head><body>
<h2>Unable to record your decision</h2>
<p>{}</p>
</body></html>"#,
        message,
    )
}
