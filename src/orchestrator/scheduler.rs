//! Scheduling predicates over the task set, evaluated after any task
//! mutation. Metrics are always derived from the full task list, never
//! incremented ad hoc.

use crate::domain::{RunMetrics, Task, TaskStatus};

pub fn should_block_execution(tasks: &[Task]) -> bool {
    let has_blocked = tasks.iter().any(|t| t.status == TaskStatus::Blocked);
    let has_in_progress = tasks.iter().any(|t| t.status == TaskStatus::InProgress);
    has_blocked && !has_in_progress
}

/// At least one task done, nothing in flight, and every P0/P1 task in a
/// terminal state.
pub fn is_ready_for_verification(tasks: &[Task]) -> bool {
    let has_done = tasks.iter().any(|t| t.status == TaskStatus::Done);
    let has_in_progress = tasks.iter().any(|t| t.status == TaskStatus::InProgress);
    let gating_complete = tasks
        .iter()
        .filter(|t| t.priority.gates_verification())
        .all(|t| t.status.is_terminal());

    has_done && !has_in_progress && gating_complete
}

pub fn recompute_metrics(tasks: &[Task], proofs_verified: usize) -> RunMetrics {
    RunMetrics {
        tasks_total: tasks.len(),
        tasks_done: tasks.iter().filter(|t| t.status == TaskStatus::Done).count(),
        proofs_verified,
    }
}
