//! Proof-gated task completion through the message command, and the
//! automatic transition into verification.

mod common;

use common::*;
use office_pilot::orchestrator::{CommandRequest, MessageRequest};
use office_pilot::utils::sha256_hex;
use office_pilot::{ErrorCode, RunStatus, TaskStatus};

#[tokio::test]
async fn test_complete_task_with_verified_proof() {
    let ws = workspace();
    let processor = processor(&ws).await;

    let started = processor
        .process(start_request(&fresh_key("start")))
        .await
        .unwrap();
    let run_id = run_id_of(&started);

    let response = processor
        .process(complete_task_request(
            &ws,
            "TASK-001",
            b"the finished artifact",
            &fresh_key("complete"),
        ))
        .await
        .unwrap();
    assert_eq!(response["data"]["task_update"]["status"], "done");
    let proof_id = response["data"]["task_update"]["proof_id"]
        .as_str()
        .unwrap();
    assert_eq!(proof_id, "PRF-001");

    let tasks = processor.store().read_tasks(&run_id).await.unwrap();
    let task = tasks.iter().find(|t| t.task_id == "TASK-001").unwrap();
    assert_eq!(task.status, TaskStatus::Done);
    assert_eq!(task.proof_ids, vec!["PRF-001".to_string()]);

    let run = processor.store().read_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.metrics.tasks_done, 1);
    assert_eq!(run.metrics.proofs_verified, 1);
}

#[tokio::test]
async fn test_wrong_digest_fails_command_and_keeps_rejected_proof() {
    let ws = workspace();
    let processor = processor(&ws).await;

    let started = processor
        .process(start_request(&fresh_key("start")))
        .await
        .unwrap();
    let run_id = run_id_of(&started);

    let artifacts_dir = ws.root().join("artifacts");
    std::fs::create_dir_all(&artifacts_dir).unwrap();
    let artifact = artifacts_dir.join("tampered.bin");
    std::fs::write(&artifact, b"actual bytes").unwrap();

    let err = processor
        .process(CommandRequest::Message(MessageRequest {
            to: "ceo".to_string(),
            text: "claiming completion".to_string(),
            task_id: Some("TASK-001".to_string()),
            proof_uri: Some(format!("file://{}", artifact.display())),
            proof_sha256: Some(sha256_hex(b"claimed other bytes")),
            complete_task: true,
            actor: ACTOR.to_string(),
            auth_token: TOKEN.to_string(),
            idempotency_key: fresh_key("complete"),
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ArtifactVerificationFailed);
    let payload = err.payload();
    assert_eq!(payload["error"]["details"]["reason_code"], "E_HASH_MISMATCH");

    // The rejected proof is part of the run's artifact history; the task
    // is untouched.
    let proofs = processor.store().list_proofs(&run_id).await.unwrap();
    assert_eq!(proofs.len(), 1);
    assert!(!proofs[0].verification.is_verified());

    let tasks = processor.store().read_tasks(&run_id).await.unwrap();
    let task = tasks.iter().find(|t| t.task_id == "TASK-001").unwrap();
    assert_eq!(task.status, TaskStatus::Ready);
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_escape_rejected_regardless_of_hash() {
    let ws = workspace();
    let processor = processor(&ws).await;

    processor
        .process(start_request(&fresh_key("start")))
        .await
        .unwrap();

    let artifacts_dir = ws.root().join("artifacts");
    std::fs::create_dir_all(&artifacts_dir).unwrap();
    let outside = ws.root().join("outside.bin");
    std::fs::write(&outside, b"escaped bytes").unwrap();
    let link = artifacts_dir.join("sneaky.bin");
    std::os::unix::fs::symlink(&outside, &link).unwrap();

    let err = processor
        .process(CommandRequest::Message(MessageRequest {
            to: "ceo".to_string(),
            text: "proof via symlink".to_string(),
            task_id: Some("TASK-001".to_string()),
            proof_uri: Some(format!("file://{}", link.display())),
            proof_sha256: Some(sha256_hex(b"escaped bytes")),
            complete_task: true,
            actor: ACTOR.to_string(),
            auth_token: TOKEN.to_string(),
            idempotency_key: fresh_key("complete"),
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ArtifactVerificationFailed);
    let payload = err.payload();
    assert_eq!(
        payload["error"]["details"]["reason_code"],
        "E_FILE_OUTSIDE_ARTIFACTS"
    );
}

#[tokio::test]
async fn test_completing_gating_tasks_moves_run_to_verifying() {
    let ws = workspace();
    let processor = processor(&ws).await;

    let run_id = drive_to_verifying(&processor, &ws).await;

    let run = processor.store().read_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Verifying);
    assert!(run.metrics.tasks_done >= 1);
    assert!(run.metrics.proofs_verified >= 1);

    let autopilot = run.autopilot.as_ref().unwrap();
    assert_eq!(autopilot.phase, office_pilot::domain::AutopilotPhase::Qa);
    assert_eq!(
        autopilot.state,
        office_pilot::domain::AutopilotState::AwaitingQa
    );
}

#[tokio::test]
async fn test_verification_waits_for_all_gating_tasks() {
    let ws = workspace();
    let processor = processor(&ws).await;

    let started = processor
        .process(start_request(&fresh_key("start")))
        .await
        .unwrap();
    let run_id = run_id_of(&started);

    // Complete only the first gating task; others remain open.
    processor
        .process(complete_task_request(
            &ws,
            "TASK-001",
            b"first artifact",
            &fresh_key("complete"),
        ))
        .await
        .unwrap();

    let run = processor.store().read_run(&run_id).await.unwrap().unwrap();
    assert_eq!(
        run.status,
        RunStatus::Executing,
        "verification must wait until every P0/P1 task is terminal"
    );
}

#[tokio::test]
async fn test_proof_ids_accumulate_per_run() {
    let ws = workspace();
    let processor = processor(&ws).await;

    processor
        .process(start_request(&fresh_key("start")))
        .await
        .unwrap();

    processor
        .process(complete_task_request(
            &ws,
            "TASK-001",
            b"artifact one",
            &fresh_key("complete"),
        ))
        .await
        .unwrap();
    let second = processor
        .process(complete_task_request(
            &ws,
            "TASK-002",
            b"artifact two",
            &fresh_key("complete"),
        ))
        .await
        .unwrap();
    assert_eq!(second["data"]["task_update"]["proof_id"], "PRF-002");
}
