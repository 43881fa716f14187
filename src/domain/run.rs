use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::autopilot::RunAutopilot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Queued,
    Planning,
    Executing,
    Verifying,
    Paused,
    Blocked,
    Stopped,
    Failed,
    Completed,
}

impl RunStatus {
    /// The full adjacency table. No status is ever force-set without
    /// passing through this table; `paused -> verifying` is reachable
    /// only via the explicit resume routing rule in the lifecycle engine.
    pub fn allowed_transitions(&self) -> &'static [RunStatus] {
        use RunStatus::*;
        match self {
            Queued => &[Planning, Paused, Stopped, Failed],
            Planning => &[Executing, Paused, Stopped, Failed],
            Executing => &[Verifying, Blocked, Paused, Stopped, Failed],
            Verifying => &[Completed, Blocked, Failed, Paused, Stopped],
            Paused => &[Executing, Verifying, Stopped, Failed],
            Blocked => &[Executing, Paused, Stopped, Failed],
            Stopped => &[],
            Failed => &[],
            Completed => &[],
        }
    }

    pub fn can_transition_to(&self, target: RunStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Stopped | RunStatus::Failed | RunStatus::Completed
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Verifying => "verifying",
            Self::Paused => "paused",
            Self::Blocked => "blocked",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::Completed => "completed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersonaRole {
    #[serde(rename = "CEO")]
    Ceo,
    #[serde(rename = "CTO")]
    Cto,
    #[serde(rename = "PM")]
    Pm,
    #[serde(rename = "ENG")]
    Eng,
    #[serde(rename = "OPS")]
    Ops,
}

impl fmt::Display for PersonaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ceo => "CEO",
            Self::Cto => "CTO",
            Self::Pm => "PM",
            Self::Eng => "ENG",
            Self::Ops => "OPS",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub role: PersonaRole,
    pub specialty: String,
    pub objective: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub tasks_total: usize,
    pub tasks_done: usize,
    pub proofs_verified: usize,
}

/// One simulated company lifecycle. The persona roster is fixed at
/// creation: exactly one CEO plus one-to-four workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub goal: String,
    pub status: RunStatus,
    pub personas: Vec<Persona>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metrics: RunMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autopilot: Option<RunAutopilot>,
}

impl Run {
    /// Roster invariant check, applied whenever a run is constructed or
    /// rehydrated from disk.
    pub fn roster_violations(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let ceo_count = self
            .personas
            .iter()
            .filter(|p| p.role == PersonaRole::Ceo)
            .count();
        if ceo_count != 1 {
            issues.push(format!(
                "run must contain exactly one CEO persona, found {}",
                ceo_count
            ));
        }
        let workers = self.personas.len() - ceo_count;
        if !(1..=4).contains(&workers) {
            issues.push(format!(
                "run must contain one to four worker personas, found {}",
                workers
            ));
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_designed_transitions() {
        assert!(RunStatus::Queued.can_transition_to(RunStatus::Planning));
        assert!(RunStatus::Planning.can_transition_to(RunStatus::Executing));
        assert!(RunStatus::Executing.can_transition_to(RunStatus::Verifying));
        assert!(RunStatus::Verifying.can_transition_to(RunStatus::Completed));
        assert!(RunStatus::Blocked.can_transition_to(RunStatus::Executing));
        assert!(RunStatus::Paused.can_transition_to(RunStatus::Executing));
        assert!(RunStatus::Paused.can_transition_to(RunStatus::Verifying));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for status in [RunStatus::Stopped, RunStatus::Failed, RunStatus::Completed] {
            assert!(status.is_terminal());
            assert!(status.allowed_transitions().is_empty());
        }
    }

    #[test]
    fn test_undeclared_transitions_rejected() {
        assert!(!RunStatus::Queued.can_transition_to(RunStatus::Executing));
        assert!(!RunStatus::Executing.can_transition_to(RunStatus::Completed));
        assert!(!RunStatus::Completed.can_transition_to(RunStatus::Executing));
        assert!(!RunStatus::Blocked.can_transition_to(RunStatus::Verifying));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let s = serde_json::to_string(&RunStatus::Verifying).unwrap();
        assert_eq!(s, "\"verifying\"");
    }
}
