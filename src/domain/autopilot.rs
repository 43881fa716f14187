use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_QA_CYCLES: u32 = 5;
pub const DEFAULT_MAX_REVIEW_ROUNDS: u32 = 3;
pub const REPEATED_FAILURE_ESCALATION: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutopilotPhase {
    Expansion,
    Planning,
    Execution,
    Qa,
    Validation,
    Complete,
}

impl AutopilotPhase {
    /// Phases from which a paused run resumes into `verifying` rather
    /// than `executing`.
    pub fn resumes_into_verification(&self) -> bool {
        matches!(self, Self::Qa | Self::Validation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutopilotState {
    Active,
    AwaitingQa,
    QaFailed,
    AwaitingReview,
    Rejected,
    Approved,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QaResult {
    Pending,
    Pass,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewerRole {
    Architect,
    Security,
    Code,
}

impl ReviewerRole {
    pub const ALL: [ReviewerRole; 3] = [
        ReviewerRole::Architect,
        ReviewerRole::Security,
        ReviewerRole::Code,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "architect" => Some(Self::Architect),
            "security" => Some(Self::Security),
            "code" => Some(Self::Code),
            _ => None,
        }
    }
}

impl fmt::Display for ReviewerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Architect => "architect",
            Self::Security => "security",
            Self::Code => "code",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Pending,
    Approve,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub decision: ReviewDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ReviewRecord {
    pub fn pending() -> Self {
        Self {
            decision: ReviewDecision::Pending,
            summary: None,
            actor: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSet {
    pub architect: ReviewRecord,
    pub security: ReviewRecord,
    pub code: ReviewRecord,
}

impl ReviewSet {
    pub fn pending() -> Self {
        Self {
            architect: ReviewRecord::pending(),
            security: ReviewRecord::pending(),
            code: ReviewRecord::pending(),
        }
    }

    pub fn get(&self, role: ReviewerRole) -> &ReviewRecord {
        match role {
            ReviewerRole::Architect => &self.architect,
            ReviewerRole::Security => &self.security,
            ReviewerRole::Code => &self.code,
        }
    }

    pub fn set(&mut self, role: ReviewerRole, record: ReviewRecord) {
        match role {
            ReviewerRole::Architect => self.architect = record,
            ReviewerRole::Security => self.security = record,
            ReviewerRole::Code => self.code = record,
        }
    }

    pub fn all_approved(&self) -> bool {
        ReviewerRole::ALL
            .iter()
            .all(|role| self.get(*role).decision == ReviewDecision::Approve)
    }

    pub fn any_rejected(&self) -> bool {
        ReviewerRole::ALL
            .iter()
            .any(|role| self.get(*role).decision == ReviewDecision::Reject)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaRecord {
    pub result: QaResult,
    pub cycles_completed: u32,
    pub max_cycles: u32,
    pub repeated_failure_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl QaRecord {
    pub fn fresh() -> Self {
        Self {
            result: QaResult::Pending,
            cycles_completed: 0,
            max_cycles: DEFAULT_MAX_QA_CYCLES,
            repeated_failure_count: 0,
            summary: None,
            failure_signature: None,
            actor: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub rounds_completed: u32,
    pub max_rounds: u32,
}

impl ValidationRecord {
    pub fn fresh() -> Self {
        Self {
            rounds_completed: 0,
            max_rounds: DEFAULT_MAX_REVIEW_ROUNDS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanFiles {
    pub spec: String,
    pub implementation: String,
    pub checklist: String,
}

/// QA/review escalation sub-lifecycle layered on the verifying state.
/// `phase` and `state` mirror the owning run; they are re-derived by the
/// lifecycle engine after every mutation rather than set piecemeal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAutopilot {
    pub phase: AutopilotPhase,
    pub state: AutopilotState,
    pub qa: QaRecord,
    pub validation: ValidationRecord,
    pub reviews: ReviewSet,
    pub plan_files: PlanFiles,
    pub updated_at: DateTime<Utc>,
}

impl RunAutopilot {
    /// QA escalation fires on three consecutive identical failures or on
    /// exhausting the cycle budget; the budget applies even to passing
    /// results.
    pub fn qa_escalated(&self) -> bool {
        self.qa.repeated_failure_count >= REPEATED_FAILURE_ESCALATION
            || self.qa.cycles_completed > self.qa.max_cycles
    }

    pub fn validation_escalated(&self) -> bool {
        self.validation.rounds_completed > self.validation.max_rounds
    }

    pub fn completion_approved(&self) -> bool {
        self.reviews.all_approved()
    }
}
