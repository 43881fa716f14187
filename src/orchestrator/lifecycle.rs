//! Run lifecycle engine: the only code that moves a run between
//! statuses, always through the adjacency table, and the progress
//! evaluator that applies at most one scheduling transition per pass.

use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::artifacts::can_complete_run;
use crate::config::ProjectPaths;
use crate::domain::{Run, RunStatus, Task};
use crate::error::{OfficeError, Result};
use crate::utils::new_run_id;

use super::autopilot::{create_autopilot, sync_autopilot};
use super::planner::{build_personas, plan_seeds, tasks_from_seeds};
use super::scheduler::{is_ready_for_verification, recompute_metrics, should_block_execution};

pub const MIN_PLANNED_TASKS: usize = 4;
pub const MAX_PLANNED_TASKS: usize = 20;

/// Move a run to `next`, or fail with an invalid-transition error that
/// names both ends. Reason strings land on the field matching the target
/// state.
pub fn transition_run(run: &Run, next: RunStatus, reason: Option<&str>) -> Result<Run> {
    if !run.status.can_transition_to(next) {
        return Err(OfficeError::invalid_transition(
            format!("Invalid run transition from {} to {}", run.status, next),
            Some(json!({ "run_id": run.run_id, "from": run.status, "to": next })),
        ));
    }

    let mut updated = run.clone();
    updated.status = next;
    updated.updated_at = Utc::now();
    if let Some(reason) = reason {
        match next {
            RunStatus::Paused => updated.pause_reason = Some(reason.to_string()),
            RunStatus::Blocked => updated.blocked_reason = Some(reason.to_string()),
            RunStatus::Stopped => updated.stop_reason = Some(reason.to_string()),
            RunStatus::Failed => updated.failure_reason = Some(reason.to_string()),
            _ => {}
        }
    }

    info!(run_id = %updated.run_id, from = %run.status, to = %next, "run transition");
    Ok(sync_autopilot(updated))
}

pub struct InitializedRun {
    pub run: Run,
    pub tasks: Vec<Task>,
}

/// Build a new run for the goal: roster, autopilot record, planned task
/// batch, and the queued -> planning -> executing ramp.
pub async fn initialize_run(
    goal: &str,
    paths: &ProjectPaths,
    run_id: Option<String>,
) -> Result<InitializedRun> {
    let now = Utc::now();
    let run_id = run_id.unwrap_or_else(|| new_run_id(now));
    let autopilot = create_autopilot(paths, &run_id, goal, now).await?;

    let run = Run {
        run_id,
        goal: goal.to_string(),
        status: RunStatus::Queued,
        personas: build_personas(),
        created_at: now,
        updated_at: now,
        metrics: Default::default(),
        pause_reason: None,
        blocked_reason: None,
        stop_reason: None,
        failure_reason: None,
        autopilot: Some(autopilot),
    };
    let roster_issues = run.roster_violations();
    if !roster_issues.is_empty() {
        return Err(OfficeError::internal(format!(
            "default roster violates composition invariant: {}",
            roster_issues.join("; ")
        )));
    }

    let run = transition_run(&run, RunStatus::Planning, None)?;

    let seeds = plan_seeds(goal);
    if !(MIN_PLANNED_TASKS..=MAX_PLANNED_TASKS).contains(&seeds.len()) {
        return Err(OfficeError::contract(
            format!(
                "Planned task count {} is outside {}..{}",
                seeds.len(),
                MIN_PLANNED_TASKS,
                MAX_PLANNED_TASKS
            ),
            None,
        ));
    }
    let tasks = tasks_from_seeds(&seeds, now);

    let mut run = transition_run(&run, RunStatus::Executing, None)?;
    run.metrics = recompute_metrics(&tasks, 0);
    let run = sync_autopilot(run);

    Ok(InitializedRun { run, tasks })
}

/// Recompute metrics, then evaluate the scheduling predicates in fixed
/// order — blocked, ready-for-verification, completable — applying at
/// most one transition per predicate.
pub fn evaluate_progress(run: &Run, tasks: &[Task], proofs_verified: usize) -> Result<Run> {
    let mut next = run.clone();
    next.metrics = recompute_metrics(tasks, proofs_verified);

    if next.status == RunStatus::Executing && should_block_execution(tasks) {
        next = transition_run(&next, RunStatus::Blocked, Some("Execution blocked by task state"))?;
    }

    if matches!(next.status, RunStatus::Executing | RunStatus::Blocked)
        && is_ready_for_verification(tasks)
        && next.status.can_transition_to(RunStatus::Verifying)
    {
        next = transition_run(&next, RunStatus::Verifying, None)?;
    }

    if next.status == RunStatus::Verifying
        && can_complete_run(next.metrics.tasks_done, next.metrics.proofs_verified)
    {
        let approved = next
            .autopilot
            .as_ref()
            .map(|ap| ap.completion_approved())
            .unwrap_or(true);
        if approved {
            next = transition_run(&next, RunStatus::Completed, None)?;
        }
    }

    Ok(sync_autopilot(next))
}

/// Explicit resume routing: a paused run goes back to `verifying` when
/// the autopilot was interrupted mid-QA or mid-validation, otherwise to
/// `executing`. Blocked runs always resume into `executing`.
pub fn resume_target(run: &Run) -> RunStatus {
    if run.status == RunStatus::Paused
        && run
            .autopilot
            .as_ref()
            .is_some_and(|ap| ap.phase.resumes_into_verification())
    {
        RunStatus::Verifying
    } else {
        RunStatus::Executing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AutopilotPhase, TaskPriority, TaskStatus};
    use crate::error::ErrorCode;
    use tempfile::TempDir;

    async fn initialized(goal: &str) -> InitializedRun {
        let dir = TempDir::new().unwrap();
        let paths = ProjectPaths::new(dir.path());
        initialize_run(goal, &paths, None).await.unwrap()
    }

    #[tokio::test]
    async fn test_initialize_ramps_to_executing() {
        let init = initialized("Build web snake game with keyboard controls and score").await;
        assert_eq!(init.run.status, RunStatus::Executing);
        assert!(init.tasks.len() >= MIN_PLANNED_TASKS);
        assert!(init.tasks.len() <= MAX_PLANNED_TASKS);
        assert_eq!(init.run.metrics.tasks_total, init.tasks.len());
        assert_eq!(init.run.metrics.tasks_done, 0);
        assert!(init.run.autopilot.is_some());
    }

    #[tokio::test]
    async fn test_illegal_transition_is_error_and_leaves_run_unchanged() {
        let init = initialized("Ship a validated demo artifact").await;
        let err = transition_run(&init.run, RunStatus::Completed, None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidTransition);
        assert_eq!(init.run.status, RunStatus::Executing);
    }

    #[tokio::test]
    async fn test_reason_lands_on_matching_field() {
        let init = initialized("Ship a validated demo artifact").await;
        let paused = transition_run(&init.run, RunStatus::Paused, Some("investor call")).unwrap();
        assert_eq!(paused.pause_reason.as_deref(), Some("investor call"));
        assert!(paused.stop_reason.is_none());
    }

    #[tokio::test]
    async fn test_progress_blocks_when_tasks_block() {
        let init = initialized("Ship a validated demo artifact").await;
        let mut tasks = init.tasks.clone();
        tasks[0].status = TaskStatus::Blocked;
        let evaluated = evaluate_progress(&init.run, &tasks, 0).unwrap();
        assert_eq!(evaluated.status, RunStatus::Blocked);
    }

    #[tokio::test]
    async fn test_progress_moves_to_verifying_when_gating_tasks_terminal() {
        let init = initialized("Ship a validated demo artifact").await;
        let mut tasks = init.tasks.clone();
        for task in tasks.iter_mut() {
            if task.priority.gates_verification() {
                task.status = TaskStatus::Done;
            }
        }
        let evaluated = evaluate_progress(&init.run, &tasks, 1).unwrap();
        assert_eq!(evaluated.status, RunStatus::Verifying);
    }

    #[tokio::test]
    async fn test_completion_gated_on_reviews_when_autopilot_present() {
        let init = initialized("Ship a validated demo artifact").await;
        let mut tasks = init.tasks.clone();
        for task in tasks.iter_mut() {
            task.status = TaskStatus::Done;
        }
        // All tasks done with a verified proof, but reviews still pending:
        // the run reaches verifying and stays there.
        let evaluated = evaluate_progress(&init.run, &tasks, 1).unwrap();
        assert_eq!(evaluated.status, RunStatus::Verifying);
    }

    #[tokio::test]
    async fn test_resume_target_routes_on_autopilot_phase() {
        let init = initialized("Ship a validated demo artifact").await;

        let mut paused = transition_run(&init.run, RunStatus::Paused, Some("break")).unwrap();
        assert_eq!(resume_target(&paused), RunStatus::Executing);

        paused.autopilot.as_mut().unwrap().phase = AutopilotPhase::Qa;
        assert_eq!(resume_target(&paused), RunStatus::Verifying);

        paused.autopilot.as_mut().unwrap().phase = AutopilotPhase::Validation;
        assert_eq!(resume_target(&paused), RunStatus::Verifying);
    }

    #[tokio::test]
    async fn test_planned_tasks_have_gating_priorities() {
        let init = initialized("Ship a validated demo artifact").await;
        assert!(
            init.tasks
                .iter()
                .any(|t| t.priority == TaskPriority::P0),
            "plan must include P0 work"
        );
    }
}
