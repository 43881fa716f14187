//! Office snapshot: the single projection document rebuilt after every
//! accepted mutating command. Pure projection of stored state — nothing
//! here feeds back into control decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    ProofReason, ProofStatus, QaResult, ReviewDecision, RunMetrics, RunStatus, TaskPriority,
    TaskStatus,
};
use crate::error::Result;
use crate::store::Store;
use crate::store::lock::read_active_run;

pub const SNAPSHOT_STALE_AFTER_SEC: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotAutopilot {
    pub phase: crate::domain::AutopilotPhase,
    pub state: crate::domain::AutopilotState,
    pub qa_result: QaResult,
    pub qa_cycles_completed: u32,
    pub qa_max_cycles: u32,
    pub validation_rounds_completed: u32,
    pub validation_max_rounds: u32,
    pub approvals: SnapshotApprovals,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotApprovals {
    pub architect: ReviewDecision,
    pub security: ReviewDecision,
    pub code: ReviewDecision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRunSummary {
    pub run_id: String,
    pub goal: String,
    pub status: RunStatus,
    pub metrics: RunMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autopilot: Option<SnapshotAutopilot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotPersona {
    pub persona_id: String,
    pub role: String,
    pub assignment_count: usize,
    pub objective: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotTask {
    pub task_id: String,
    pub title: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub owner_persona_id: String,
    pub proof_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotFeedEntry {
    pub event_id: String,
    pub command: String,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotProof {
    pub proof_id: String,
    pub task_id: String,
    pub uri: String,
    pub status: ProofStatus,
    pub reason_code: ProofReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfficeSnapshot {
    pub generated_at: DateTime<Utc>,
    pub stale_after_sec: u64,
    pub run_summary: SnapshotRunSummary,
    pub org_view: Vec<SnapshotPersona>,
    pub task_board: Vec<SnapshotTask>,
    pub command_feed: Vec<SnapshotFeedEntry>,
    pub artifact_panel: Vec<SnapshotProof>,
}

const COMMAND_FEED_LIMIT: usize = 50;

fn empty_snapshot() -> OfficeSnapshot {
    OfficeSnapshot {
        generated_at: Utc::now(),
        stale_after_sec: SNAPSHOT_STALE_AFTER_SEC,
        run_summary: SnapshotRunSummary {
            run_id: "none".to_string(),
            goal: "No active run".to_string(),
            status: RunStatus::Stopped,
            metrics: RunMetrics::default(),
            autopilot: None,
        },
        org_view: Vec::new(),
        task_board: Vec::new(),
        command_feed: Vec::new(),
        artifact_panel: Vec::new(),
    }
}

async fn resolve_run_id(store: &Store, explicit: Option<&str>) -> Result<Option<String>> {
    if let Some(run_id) = explicit {
        return Ok(Some(run_id.to_string()));
    }
    if let Some(active) = read_active_run(store.paths()).await? {
        return Ok(Some(active));
    }
    let index = store.read_run_index().await?;
    Ok(index.last().cloned())
}

fn proof_rank(status: ProofStatus) -> u8 {
    match status {
        ProofStatus::Verified => 0,
        ProofStatus::Pending => 1,
        ProofStatus::Rejected => 2,
    }
}

/// Build the snapshot for the resolved run (explicit id, else the active
/// marker, else the newest indexed run) and write it atomically to
/// `data/snapshot/latest.json`.
pub async fn build_snapshot(store: &Store, explicit: Option<&str>) -> Result<OfficeSnapshot> {
    let Some(run_id) = resolve_run_id(store, explicit).await? else {
        let snapshot = empty_snapshot();
        crate::store::fs::write_json_atomic(&store.paths().snapshot_file, &snapshot).await?;
        return Ok(snapshot);
    };
    let Some(run) = store.read_run(&run_id).await? else {
        let snapshot = empty_snapshot();
        crate::store::fs::write_json_atomic(&store.paths().snapshot_file, &snapshot).await?;
        return Ok(snapshot);
    };

    let tasks = store.read_tasks(&run_id).await?;
    let events = store.read_events(&run_id).await?;
    let mut proofs = store.list_proofs(&run_id).await?;

    let snapshot = OfficeSnapshot {
        generated_at: Utc::now(),
        stale_after_sec: SNAPSHOT_STALE_AFTER_SEC,
        run_summary: SnapshotRunSummary {
            run_id: run.run_id.clone(),
            goal: run.goal.clone(),
            status: run.status,
            metrics: run.metrics,
            autopilot: run.autopilot.as_ref().map(|ap| SnapshotAutopilot {
                phase: ap.phase,
                state: ap.state,
                qa_result: ap.qa.result,
                qa_cycles_completed: ap.qa.cycles_completed,
                qa_max_cycles: ap.qa.max_cycles,
                validation_rounds_completed: ap.validation.rounds_completed,
                validation_max_rounds: ap.validation.max_rounds,
                approvals: SnapshotApprovals {
                    architect: ap.reviews.architect.decision,
                    security: ap.reviews.security.decision,
                    code: ap.reviews.code.decision,
                },
            }),
        },
        org_view: run
            .personas
            .iter()
            .map(|persona| SnapshotPersona {
                persona_id: persona.id.clone(),
                role: persona.role.to_string(),
                assignment_count: tasks
                    .iter()
                    .filter(|t| t.owner_persona_id == persona.id)
                    .count(),
                objective: persona.objective.clone(),
            })
            .collect(),
        task_board: tasks
            .iter()
            .map(|task| SnapshotTask {
                task_id: task.task_id.clone(),
                title: task.title.clone(),
                status: task.status,
                priority: task.priority,
                owner_persona_id: task.owner_persona_id.clone(),
                proof_ids: task.proof_ids.clone(),
            })
            .collect(),
        command_feed: events
            .iter()
            .rev()
            .take(COMMAND_FEED_LIMIT)
            .rev()
            .map(|event| SnapshotFeedEntry {
                event_id: event.event_id.clone(),
                command: event.command.clone(),
                actor: event.actor.clone(),
                timestamp: event.timestamp,
            })
            .collect(),
        artifact_panel: {
            proofs.sort_by_key(|p| proof_rank(p.verification.status));
            proofs
                .iter()
                .map(|proof| SnapshotProof {
                    proof_id: proof.proof_id.clone(),
                    task_id: proof.task_id.clone(),
                    uri: proof.uri.clone(),
                    status: proof.verification.status,
                    reason_code: proof.verification.reason_code,
                })
                .collect()
        },
    };

    crate::store::fs::write_json_atomic(&store.paths().snapshot_file, &snapshot).await?;
    Ok(snapshot)
}

/// A snapshot older than its staleness horizon should be treated as
/// unreliable by readers.
pub fn is_snapshot_stale(snapshot: &OfficeSnapshot, now: DateTime<Utc>) -> bool {
    (now - snapshot.generated_at).num_seconds() > snapshot.stale_after_sec as i64
}
