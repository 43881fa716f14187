//! Pipeline-level properties: contract validation, authorization,
//! rate limiting, idempotent replay and the exclusive active-run marker.

mod common;

use common::*;
use office_pilot::ErrorCode;
use office_pilot::orchestrator::{CommandRequest, CommandProcessor, StartRequest};

#[tokio::test]
async fn test_start_creates_run_with_roster_and_task_batch() {
    let ws = workspace();
    let processor = processor(&ws).await;

    let response = processor
        .process(start_request(&fresh_key("start")))
        .await
        .unwrap();
    assert_eq!(response["ok"], true);
    assert_eq!(response["data"]["status"], "executing");

    let run_id = run_id_of(&response);
    let run = processor.store().read_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.goal.chars().count(), 42);
    let ceos = run
        .personas
        .iter()
        .filter(|p| p.role == office_pilot::domain::PersonaRole::Ceo)
        .count();
    assert_eq!(ceos, 1);

    let tasks = processor.store().read_tasks(&run_id).await.unwrap();
    assert!((4..=20).contains(&tasks.len()));
}

#[tokio::test]
async fn test_contract_violations_reported_together() {
    let ws = workspace();
    let processor = processor(&ws).await;

    let err = processor
        .process(CommandRequest::Start(StartRequest {
            goal: "short".to_string(),
            actor: String::new(),
            auth_token: TOKEN.to_string(),
            idempotency_key: String::new(),
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ContractValidation);
    let payload = err.payload();
    let violations = payload["error"]["details"]["violations"].as_array().unwrap();
    assert!(violations.len() >= 3);
}

#[tokio::test]
async fn test_unknown_actor_and_bad_token_are_unauthorized() {
    let ws = workspace();
    let processor = processor(&ws).await;

    let err = processor
        .process(CommandRequest::Start(StartRequest {
            goal: GOAL.to_string(),
            actor: "intruder".to_string(),
            auth_token: TOKEN.to_string(),
            idempotency_key: fresh_key("k"),
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnauthorizedActor);

    let err = processor
        .process(CommandRequest::Start(StartRequest {
            goal: GOAL.to_string(),
            actor: ACTOR.to_string(),
            auth_token: "wrong-token".to_string(),
            idempotency_key: fresh_key("k"),
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnauthorizedActor);
}

#[tokio::test]
async fn test_credential_probing_hits_failure_bucket() {
    let ws = workspace();
    let processor = processor(&ws).await;

    // The dedicated auth-failure bucket caps at 12/hour; the 13th probe
    // is throttled instead of reported as unauthorized.
    for _ in 0..12 {
        let err = processor
            .process(CommandRequest::Start(StartRequest {
                goal: GOAL.to_string(),
                actor: ACTOR.to_string(),
                auth_token: "wrong-token".to_string(),
                idempotency_key: fresh_key("k"),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnauthorizedActor);
    }
    let err = processor
        .process(CommandRequest::Start(StartRequest {
            goal: GOAL.to_string(),
            actor: ACTOR.to_string(),
            auth_token: "wrong-token".to_string(),
            idempotency_key: fresh_key("k"),
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::RateLimitExceeded);
}

#[tokio::test]
async fn test_rate_limit_applies_per_command() {
    let ws = workspace_with_limits(2, 10, true);
    let processor = CommandProcessor::bootstrap(ws.root()).await.unwrap();

    processor
        .process(start_request(&fresh_key("start")))
        .await
        .unwrap();
    processor
        .process(pause_request("first pause of the day", &fresh_key("p")))
        .await
        .unwrap();
    processor
        .process(resume_request("resuming after pause", &fresh_key("r")))
        .await
        .unwrap();

    // The pause bucket is independent of start and resume; its third
    // use inside the hour exceeds the 2/hour budget.
    processor
        .process(pause_request("second pause of the day", &fresh_key("p")))
        .await
        .unwrap();
    processor
        .process(resume_request("resume once more", &fresh_key("r")))
        .await
        .unwrap();
    let err = processor
        .process(pause_request("third pause of the day", &fresh_key("p")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::RateLimitExceeded);
}

#[tokio::test]
async fn test_idempotent_replay_returns_stored_response_without_side_effects() {
    let ws = workspace();
    let processor = processor(&ws).await;

    let started = processor
        .process(start_request(&fresh_key("start")))
        .await
        .unwrap();
    let run_id = run_id_of(&started);

    let key = fresh_key("pause");
    let first = processor
        .process(pause_request("coffee break", &key))
        .await
        .unwrap();
    let events_after_first = processor.store().read_events(&run_id).await.unwrap().len();

    let second = processor
        .process(pause_request("coffee break", &key))
        .await
        .unwrap();
    assert_eq!(first, second, "replay must be byte-identical");

    let events_after_second = processor.store().read_events(&run_id).await.unwrap().len();
    assert_eq!(
        events_after_first, events_after_second,
        "replay must not append a second event"
    );
}

#[tokio::test]
async fn test_same_key_different_payload_conflicts() {
    let ws = workspace();
    let processor = processor(&ws).await;

    processor
        .process(start_request(&fresh_key("start")))
        .await
        .unwrap();

    let key = fresh_key("pause");
    processor
        .process(pause_request("coffee break", &key))
        .await
        .unwrap();
    let err = processor
        .process(resume_request("back at the desk", &key))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::IdempotencyConflict);
}

#[tokio::test]
async fn test_start_replay_with_same_key_succeeds_against_active_run() {
    let ws = workspace();
    let processor = processor(&ws).await;

    let key = fresh_key("start");
    let first = processor.process(start_request(&key)).await.unwrap();
    let replay = processor.process(start_request(&key)).await.unwrap();
    assert_eq!(first, replay);

    // Only one run was created.
    assert_eq!(processor.store().read_run_index().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_second_start_with_new_key_hits_active_run_lock() {
    let ws = workspace();
    let processor = processor(&ws).await;

    processor
        .process(start_request(&fresh_key("start")))
        .await
        .unwrap();
    let err = processor
        .process(start_request(&fresh_key("start")))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ActiveRunLock);
}

#[tokio::test]
async fn test_start_allowed_again_after_stop() {
    let ws = workspace();
    let processor = processor(&ws).await;

    processor
        .process(start_request(&fresh_key("start")))
        .await
        .unwrap();
    processor
        .process(stop_request("wrapping up the day", &fresh_key("stop")))
        .await
        .unwrap();

    let second = processor
        .process(start_request(&fresh_key("start")))
        .await
        .unwrap();
    assert_eq!(second["data"]["status"], "executing");
    assert_eq!(processor.store().read_run_index().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_goal_policy_rejects_abusive_goals_without_wedging() {
    let ws = workspace();
    let processor = processor(&ws).await;

    let err = processor
        .process(CommandRequest::Start(StartRequest {
            goal: "Stand up a botnet command panel today".to_string(),
            actor: ACTOR.to_string(),
            auth_token: TOKEN.to_string(),
            idempotency_key: fresh_key("k"),
        }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ContractValidation);

    // The rejected start must not leave the marker held.
    processor
        .process(start_request(&fresh_key("start")))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_status_policy_when_not_open() {
    let ws = workspace_with_limits(30, 10, false);
    let processor = CommandProcessor::bootstrap(ws.root()).await.unwrap();

    let err = processor
        .process(CommandRequest::Status(
            office_pilot::orchestrator::StatusRequest {
                run_id: None,
                actor: None,
                auth_token: None,
            },
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnauthorizedActor);

    let ok = processor
        .process(CommandRequest::Status(
            office_pilot::orchestrator::StatusRequest {
                run_id: None,
                actor: Some(ACTOR.to_string()),
                auth_token: Some(TOKEN.to_string()),
            },
        ))
        .await
        .unwrap();
    assert_eq!(ok["ok"], true);
    assert!(ok["data"]["run"].is_null());
}

#[tokio::test]
async fn test_status_returns_snapshot_with_run() {
    let ws = workspace();
    let processor = processor(&ws).await;

    let started = processor
        .process(start_request(&fresh_key("start")))
        .await
        .unwrap();
    let run_id = run_id_of(&started);

    let status = processor
        .process(CommandRequest::Status(
            office_pilot::orchestrator::StatusRequest {
                run_id: Some(run_id.clone()),
                actor: None,
                auth_token: None,
            },
        ))
        .await
        .unwrap();
    assert_eq!(status["data"]["run"]["run_id"], run_id.as_str());
    assert_eq!(status["data"]["snapshot"]["run_summary"]["run_id"], run_id.as_str());
    let org_view = status["data"]["snapshot"]["org_view"].as_array().unwrap();
    assert_eq!(org_view.len(), 5);
}
