//! Proof gates: the checks that decide whether claimed work unlocks a
//! task or a run.

use crate::domain::{ArtifactProof, Task};

/// A task may be marked done only when at least one of its attached
/// proofs is verified and actually belongs to it.
pub fn can_mark_task_done(task: &Task, proofs: &[ArtifactProof]) -> bool {
    proofs.iter().any(|proof| {
        task.proof_ids.contains(&proof.proof_id)
            && proof.task_id == task.task_id
            && proof.verification.is_verified()
    })
}

pub fn can_complete_run(tasks_done: usize, proofs_verified: usize) -> bool {
    tasks_done >= 1 && proofs_verified >= 1
}
