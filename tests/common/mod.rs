//! Shared fixtures: a temp workspace with a seeded auth config and
//! helpers for driving the command pipeline.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;
use tempfile::TempDir;

use office_pilot::orchestrator::{
    CommandProcessor, CommandRequest, MessageRequest, QaRequest, ReasonedRequest, ReviewRequest,
    StartRequest,
};
use office_pilot::utils::sha256_hex;

pub const ACTOR: &str = "investor-1";
pub const TOKEN: &str = "secret-token";
// 42 characters, and keyword-matched so the plan gains web/game tasks.
pub const GOAL: &str = "Build a web snake game with score tracking";

static KEY_COUNTER: AtomicUsize = AtomicUsize::new(0);

pub fn fresh_key(prefix: &str) -> String {
    format!(
        "{}-{}",
        prefix,
        KEY_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

pub fn workspace_with_limits(default_mutating: u32, stop: u32, read_only_open: bool) -> Workspace {
    let dir = TempDir::new().unwrap();
    let config_dir = dir.path().join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    let config = format!(
        r#"read_only_open = {read_only_open}

[mutating_actors]
investor-1 = ["start", "pause", "resume", "reprioritize", "message", "complete-task", "qa", "review", "stop"]
viewer-1 = []

[actor_tokens]
investor-1 = "{TOKEN}"
viewer-1 = "viewer-token"

[reviewer_grants]
investor-1 = ["architect", "security", "code"]

[rate_limits_per_hour]
default_mutating = {default_mutating}
stop = {stop}

[proof_policy]
https_allowlist = []
fetch_timeout_ms = 5000
max_bytes = 20971520
"#
    );
    std::fs::write(config_dir.join("office.toml"), config).unwrap();
    Workspace { dir }
}

pub fn workspace() -> Workspace {
    workspace_with_limits(30, 10, true)
}

pub async fn processor(workspace: &Workspace) -> CommandProcessor {
    CommandProcessor::bootstrap(workspace.root()).await.unwrap()
}

pub fn start_request(key: &str) -> CommandRequest {
    CommandRequest::Start(StartRequest {
        goal: GOAL.to_string(),
        actor: ACTOR.to_string(),
        auth_token: TOKEN.to_string(),
        idempotency_key: key.to_string(),
    })
}

pub fn pause_request(reason: &str, key: &str) -> CommandRequest {
    CommandRequest::Pause(ReasonedRequest {
        reason: reason.to_string(),
        actor: ACTOR.to_string(),
        auth_token: TOKEN.to_string(),
        idempotency_key: key.to_string(),
    })
}

pub fn resume_request(reason: &str, key: &str) -> CommandRequest {
    CommandRequest::Resume(ReasonedRequest {
        reason: reason.to_string(),
        actor: ACTOR.to_string(),
        auth_token: TOKEN.to_string(),
        idempotency_key: key.to_string(),
    })
}

pub fn stop_request(reason: &str, key: &str) -> CommandRequest {
    CommandRequest::Stop(ReasonedRequest {
        reason: reason.to_string(),
        actor: ACTOR.to_string(),
        auth_token: TOKEN.to_string(),
        idempotency_key: key.to_string(),
    })
}

pub fn qa_request(result: &str, summary: &str, signature: Option<&str>, key: &str) -> CommandRequest {
    CommandRequest::Qa(QaRequest {
        result: result.to_string(),
        summary: summary.to_string(),
        failure_signature: signature.map(|s| s.to_string()),
        actor: ACTOR.to_string(),
        auth_token: TOKEN.to_string(),
        idempotency_key: key.to_string(),
    })
}

pub fn review_request(reviewer: &str, decision: &str, key: &str) -> CommandRequest {
    CommandRequest::Review(ReviewRequest {
        reviewer: reviewer.to_string(),
        decision: decision.to_string(),
        summary: "reviewed the latest artifact drop".to_string(),
        actor: ACTOR.to_string(),
        auth_token: TOKEN.to_string(),
        idempotency_key: key.to_string(),
    })
}

/// Write an artifact file and return a message request completing
/// `task_id` with its proof.
pub fn complete_task_request(
    workspace: &Workspace,
    task_id: &str,
    contents: &[u8],
    key: &str,
) -> CommandRequest {
    let artifacts_dir = workspace.root().join("artifacts");
    std::fs::create_dir_all(&artifacts_dir).unwrap();
    let artifact = artifacts_dir.join(format!("{}.bin", task_id));
    std::fs::write(&artifact, contents).unwrap();

    CommandRequest::Message(MessageRequest {
        to: "ceo".to_string(),
        text: format!("{} finished, artifact attached", task_id),
        task_id: Some(task_id.to_string()),
        proof_uri: Some(format!("file://{}", artifact.display())),
        proof_sha256: Some(sha256_hex(contents)),
        complete_task: true,
        actor: ACTOR.to_string(),
        auth_token: TOKEN.to_string(),
        idempotency_key: key.to_string(),
    })
}

pub fn run_id_of(response: &Value) -> String {
    response["data"]["run_id"].as_str().unwrap().to_string()
}

/// Start a run and complete every verification-gating task so the run
/// lands in `verifying` with the autopilot awaiting QA.
pub async fn drive_to_verifying(processor: &CommandProcessor, workspace: &Workspace) -> String {
    let started = processor
        .process(start_request(&fresh_key("start")))
        .await
        .unwrap();
    let run_id = run_id_of(&started);

    let tasks = processor.store().read_tasks(&run_id).await.unwrap();
    let gating: Vec<String> = tasks
        .iter()
        .filter(|t| t.priority.gates_verification())
        .map(|t| t.task_id.clone())
        .collect();
    assert!(!gating.is_empty(), "plan must contain gating tasks");

    for task_id in &gating {
        processor
            .process(complete_task_request(
                workspace,
                task_id,
                format!("artifact for {}", task_id).as_bytes(),
                &fresh_key("complete"),
            ))
            .await
            .unwrap();
    }

    let run = processor.store().read_run(&run_id).await.unwrap().unwrap();
    assert_eq!(run.status, office_pilot::RunStatus::Verifying);
    run_id
}
