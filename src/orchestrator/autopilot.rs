//! Autopilot sub-lifecycle: creation at run start, the single mirroring
//! function that keeps `phase`/`state` consistent with the run status,
//! and the pure recorders for QA and review submissions.

use chrono::{DateTime, Utc};

use crate::config::ProjectPaths;
use crate::domain::{
    AutopilotPhase, AutopilotState, PlanFiles, QaRecord, QaResult, ReviewDecision, ReviewRecord,
    ReviewSet, ReviewerRole, Run, RunAutopilot, RunStatus, ValidationRecord,
};
use crate::error::Result;
use crate::store::fs::write_atomic;

/// Seed the autopilot record and its plan stubs for a new run.
pub async fn create_autopilot(
    paths: &ProjectPaths,
    run_id: &str,
    goal: &str,
    now: DateTime<Utc>,
) -> Result<RunAutopilot> {
    let spec_path = paths.plan_file(run_id, "spec");
    let impl_path = paths.plan_file(run_id, "impl");
    let checklist_path = paths.plan_file(run_id, "checklist");

    write_atomic(
        &spec_path,
        &format!("# Delivery spec\n\nGoal: {}\n", goal),
    )
    .await?;
    write_atomic(
        &impl_path,
        "# Implementation notes\n\nFilled in as execution progresses.\n",
    )
    .await?;
    write_atomic(
        &checklist_path,
        "# Verification checklist\n\n- [ ] QA pass recorded\n- [ ] Three reviewer approvals\n",
    )
    .await?;

    Ok(RunAutopilot {
        phase: AutopilotPhase::Expansion,
        state: AutopilotState::Active,
        qa: QaRecord::fresh(),
        validation: ValidationRecord::fresh(),
        reviews: ReviewSet::pending(),
        plan_files: PlanFiles {
            spec: spec_path.display().to_string(),
            implementation: impl_path.display().to_string(),
            checklist: checklist_path.display().to_string(),
        },
        updated_at: now,
    })
}

/// Re-derive `phase` and `state` from the run. This is the only place
/// the pair is written, so the mirror cannot drift from the run status.
/// Paused and stopped runs keep their last phase — that is what lets
/// `resume` route back into verification when QA or validation was
/// interrupted.
pub fn sync_autopilot(mut run: Run) -> Run {
    let Some(mut autopilot) = run.autopilot.take() else {
        return run;
    };

    match run.status {
        RunStatus::Queued => {
            autopilot.phase = AutopilotPhase::Expansion;
            autopilot.state = AutopilotState::Active;
        }
        RunStatus::Planning => {
            autopilot.phase = AutopilotPhase::Planning;
            autopilot.state = AutopilotState::Active;
        }
        RunStatus::Executing | RunStatus::Blocked => {
            autopilot.phase = AutopilotPhase::Execution;
            autopilot.state = AutopilotState::Active;
        }
        RunStatus::Verifying => match autopilot.qa.result {
            QaResult::Pending => {
                autopilot.phase = AutopilotPhase::Qa;
                autopilot.state = AutopilotState::AwaitingQa;
            }
            QaResult::Fail => {
                autopilot.phase = AutopilotPhase::Qa;
                autopilot.state = AutopilotState::QaFailed;
            }
            QaResult::Pass => {
                autopilot.phase = AutopilotPhase::Validation;
                autopilot.state = if autopilot.reviews.all_approved() {
                    AutopilotState::Approved
                } else if autopilot.reviews.any_rejected() {
                    AutopilotState::Rejected
                } else {
                    AutopilotState::AwaitingReview
                };
            }
        },
        RunStatus::Completed => {
            autopilot.phase = AutopilotPhase::Complete;
            autopilot.state = AutopilotState::Complete;
        }
        RunStatus::Failed => {
            if autopilot.qa_escalated() {
                autopilot.state = AutopilotState::QaFailed;
            } else if autopilot.validation_escalated() {
                autopilot.state = AutopilotState::Rejected;
            }
        }
        RunStatus::Paused | RunStatus::Stopped => {}
    }

    run.autopilot = Some(autopilot);
    run
}

/// Apply one QA submission. Every submission resets the three reviews to
/// pending: any regression forces architect, security and code to
/// re-approve.
pub fn record_qa(
    mut autopilot: RunAutopilot,
    result: QaResult,
    summary: &str,
    failure_signature: Option<&str>,
    actor: &str,
    now: DateTime<Utc>,
) -> RunAutopilot {
    debug_assert!(result != QaResult::Pending);

    let signature = if result == QaResult::Fail {
        Some(failure_signature.unwrap_or(summary).to_string())
    } else {
        None
    };
    let repeated = if result == QaResult::Fail {
        if autopilot.qa.failure_signature.as_deref() == signature.as_deref() {
            autopilot.qa.repeated_failure_count + 1
        } else {
            1
        }
    } else {
        0
    };

    autopilot.qa = QaRecord {
        result,
        cycles_completed: autopilot.qa.cycles_completed + 1,
        max_cycles: autopilot.qa.max_cycles,
        repeated_failure_count: repeated,
        summary: Some(summary.to_string()),
        failure_signature: signature,
        actor: Some(actor.to_string()),
        updated_at: Some(now),
    };
    autopilot.reviews = ReviewSet::pending();
    autopilot.updated_at = now;
    autopilot
}

/// Apply one review submission. A rejection opens a new validation round:
/// the QA result drops back to pending and every other review resets,
/// while the rejecting reviewer's decision stays on record.
pub fn record_review(
    mut autopilot: RunAutopilot,
    role: ReviewerRole,
    decision: ReviewDecision,
    summary: &str,
    actor: &str,
    now: DateTime<Utc>,
) -> RunAutopilot {
    debug_assert!(decision != ReviewDecision::Pending);

    let record = ReviewRecord {
        decision,
        summary: Some(summary.to_string()),
        actor: Some(actor.to_string()),
        updated_at: Some(now),
    };

    if decision == ReviewDecision::Reject {
        autopilot.qa = QaRecord {
            result: QaResult::Pending,
            repeated_failure_count: 0,
            failure_signature: None,
            summary: Some(summary.to_string()),
            actor: Some(actor.to_string()),
            updated_at: Some(now),
            ..autopilot.qa
        };
        autopilot.validation.rounds_completed += 1;
        autopilot.reviews = ReviewSet::pending();
    }
    autopilot.reviews.set(role, record);
    autopilot.updated_at = now;
    autopilot
}
