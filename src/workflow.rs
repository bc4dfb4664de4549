//! Approval state machine
//!
//! Drives a row through AwaitingFirst -> AwaitingSecond -> Terminal and
//! owns the decision protocol: token check, identity check, serialized
//! decision recording, and the follow-on notifications. Every
//! decision-recording operation runs under one process-wide document
//! lock, acquired with a bounded timeout.

use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{Decision, Stage, WorkflowState};
use crate::notify::NotificationService;
use crate::rows::RowStore;
use crate::token::TokenStore;

/// One stakeholder click, parsed from an action link
#[derive(Debug, Clone)]
pub struct DecisionAction {
    pub row: i64,
    pub stage: Stage,
    pub decision: Decision,
    pub approver: String,
    pub token: String,
}

/// What a successfully recorded decision led to
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub row: i64,
    pub stage: Stage,
    pub decision: Decision,
    pub state: WorkflowState,
}

pub struct ApprovalWorkflow {
    stakeholders: Vec<String>,
    lock_timeout: Duration,
    rows: RowStore,
    tokens: TokenStore,
    notifier: NotificationService,
    document_lock: Mutex<()>,
}

impl ApprovalWorkflow {
    pub fn new(
        stakeholders: Vec<String>,
        lock_timeout: Duration,
        rows: RowStore,
        tokens: TokenStore,
        notifier: NotificationService,
    ) -> Self {
        Self {
            stakeholders,
            lock_timeout,
            rows,
            tokens,
            notifier,
            document_lock: Mutex::new(()),
        }
    }

    pub fn stakeholders(&self) -> &[String] {
        &self.stakeholders
    }

    fn is_stakeholder(&self, email: &str) -> bool {
        self.stakeholders
            .iter()
            .any(|s| s.eq_ignore_ascii_case(email))
    }

    async fn issue_stage_tokens(&self, row: i64, stage: Stage) -> Result<Vec<(String, String)>> {
        let mut tokens = Vec::with_capacity(self.stakeholders.len());
        for approver in &self.stakeholders {
            let token = self.tokens.issue(row, stage, approver).await?;
            tokens.push((approver.clone(), token));
        }
        Ok(tokens)
    }

    /// Record a submitted requisition and run the stage-1 fan-out
    pub async fn handle_submission(&self, fields: &HashMap<String, String>) -> Result<i64> {
        let row_id = self.rows.append_row(fields).await?;
        tracing::info!("Recorded submission as row {}", row_id);
        self.handle_new_row(row_id).await?;
        Ok(row_id)
    }

    /// Stage-1 fan-out for a newly created row. Safe to invoke again for
    /// the same row: tokens are re-issued (overwriting the old ones) and
    /// the batch is re-sent; duplicate mail is accepted, not deduplicated.
    pub async fn handle_new_row(&self, row_id: i64) -> Result<()> {
        let req = self.rows.read_requisition(row_id).await?;
        let tokens = self.issue_stage_tokens(row_id, Stage::First).await?;
        self.notifier
            .send_stage_request(Stage::First, row_id, &req.fields, &tokens)
            .await?;
        Ok(())
    }

    /// Validate and record one decision click.
    ///
    /// Runs entirely under the document lock. The token is consumed after
    /// verification and before the row write, so a second click with the
    /// same token can never re-enter the write path. Token and identity
    /// failures leave the token stored.
    pub async fn handle_decision(
        &self,
        action: DecisionAction,
        acting_email: &str,
    ) -> Result<DecisionOutcome> {
        let _guard = tokio::time::timeout(self.lock_timeout, self.document_lock.lock())
            .await
            .map_err(|_| AppError::LockTimeout)?;

        let token_ok = self
            .tokens
            .verify(action.row, action.stage, &action.approver, &action.token)
            .await?;
        if !token_ok {
            return Err(AppError::InvalidToken);
        }

        if !acting_email.eq_ignore_ascii_case(&action.approver)
            || !self.is_stakeholder(&action.approver)
        {
            return Err(AppError::Unauthorized);
        }

        self.tokens
            .invalidate(action.row, action.stage, &action.approver)
            .await?;

        let req = self.rows.read_requisition(action.row).await?;
        match (req.state(), action.stage) {
            (WorkflowState::AwaitingFirst, Stage::First) => {}
            (WorkflowState::AwaitingSecond, Stage::Second) => {}
            // A verified token against a row already past its stage is a
            // stale link; same page as any other dead token.
            _ => return Err(AppError::InvalidToken),
        }

        self.rows
            .write_decision_fields(
                action.row,
                action.stage,
                action.decision,
                Utc::now(),
                &action.approver,
            )
            .await?;

        // The acted stage is closed: sweep its remaining tokens so unused
        // sibling links die with it.
        self.tokens
            .invalidate_stage(action.row, action.stage, &self.stakeholders)
            .await?;

        let state = match (action.stage, action.decision) {
            (Stage::First, Decision::Approved) => {
                let tokens = self.issue_stage_tokens(action.row, Stage::Second).await?;
                self.notifier
                    .send_stage_request(Stage::Second, action.row, &req.fields, &tokens)
                    .await?;
                WorkflowState::AwaitingSecond
            }
            (Stage::First, Decision::Denied) | (Stage::Second, _) => {
                self.notifier
                    .send_requestor_outcome(&req.fields, action.decision)
                    .await?;
                WorkflowState::Terminal(action.decision)
            }
        };

        tracing::info!(
            "Recorded {} by {} on row {} stage {}",
            action.decision.as_str(),
            action.approver,
            action.row,
            action.stage.as_str()
        );

        Ok(DecisionOutcome {
            row: action.row,
            stage: action.stage,
            decision: action.decision,
            state,
        })
    }
}
