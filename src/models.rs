//! Data models for requisitions and approval decisions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One of the two sequential approval rounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    First,
    Second,
}

impl Stage {
    /// Stage number as it appears in action URLs and token keys
    pub fn number(&self) -> u8 {
        match self {
            Stage::First => 1,
            Stage::Second => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::First => "1",
            Stage::Second => "2",
        }
    }

    pub fn ordinal(&self) -> &'static str {
        match self {
            Stage::First => "1st",
            Stage::Second => "2nd",
        }
    }

    /// Header of the stage's status column. The timestamp and approver
    /// columns sit at the next two positions.
    pub fn status_header(&self) -> &'static str {
        match self {
            Stage::First => "1st Approval Status",
            Stage::Second => "2nd Approval Status",
        }
    }

    pub fn timestamp_header(&self) -> &'static str {
        match self {
            Stage::First => "1st Approval Timestamp",
            Stage::Second => "2nd Approval Timestamp",
        }
    }

    pub fn approver_header(&self) -> &'static str {
        match self {
            Stage::First => "1st Approval By",
            Stage::Second => "2nd Approval By",
        }
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" => Ok(Stage::First),
            "2" => Ok(Stage::Second),
            _ => Err(format!("Invalid stage: {}", s)),
        }
    }
}

/// A stakeholder's verdict on one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Approved,
    Denied,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approved => "Approved",
            Decision::Denied => "Denied",
        }
    }
}

impl std::str::FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Approved" => Ok(Decision::Approved),
            "Denied" => Ok(Decision::Denied),
            _ => Err(format!("Invalid decision: {}", s)),
        }
    }
}

/// Value of a stage's status cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionStatus {
    Pending,
    Approved,
    Denied,
}

impl DecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::Pending => "Pending",
            DecisionStatus::Approved => "Approved",
            DecisionStatus::Denied => "Denied",
        }
    }
}

impl From<Decision> for DecisionStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approved => DecisionStatus::Approved,
            Decision::Denied => DecisionStatus::Denied,
        }
    }
}

impl std::str::FromStr for DecisionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(DecisionStatus::Pending),
            "Approved" => Ok(DecisionStatus::Approved),
            "Denied" => Ok(DecisionStatus::Denied),
            _ => Err(format!("Invalid decision status: {}", s)),
        }
    }
}

/// The three decision cells of one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub status: DecisionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
}

impl DecisionRecord {
    pub fn pending() -> Self {
        Self {
            status: DecisionStatus::Pending,
            decided_at: None,
            approver: None,
        }
    }
}

impl Default for DecisionRecord {
    fn default() -> Self {
        Self::pending()
    }
}

/// Where a row sits in the two-stage protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    AwaitingFirst,
    AwaitingSecond,
    Terminal(Decision),
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Terminal(_))
    }
}

/// A requisition row: submitted fields plus both decision records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requisition {
    pub row_id: i64,
    pub fields: HashMap<String, String>,
    pub first: DecisionRecord,
    pub second: DecisionRecord,
}

impl Requisition {
    /// Derive the workflow state from the two status cells. Stage-2 cells
    /// are only ever written after stage 1 is Approved, so a Pending
    /// second record under an Approved first means awaiting stage 2.
    pub fn state(&self) -> WorkflowState {
        match self.first.status {
            DecisionStatus::Pending => WorkflowState::AwaitingFirst,
            DecisionStatus::Denied => WorkflowState::Terminal(Decision::Denied),
            DecisionStatus::Approved => match self.second.status {
                DecisionStatus::Pending => WorkflowState::AwaitingSecond,
                DecisionStatus::Approved => WorkflowState::Terminal(Decision::Approved),
                DecisionStatus::Denied => WorkflowState::Terminal(Decision::Denied),
            },
        }
    }
}

/// True for the six decision-cell headers, which notification templates
/// leave out of the submitted-field table.
pub fn is_decision_header(header: &str) -> bool {
    [Stage::First, Stage::Second].iter().any(|stage| {
        header == stage.status_header()
            || header == stage.timestamp_header()
            || header == stage.approver_header()
    })
}
