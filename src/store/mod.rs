//! Durable state, keyed by run id. The store is the sole writer of
//! persisted state; the engine decides what to write.

pub mod fs;
pub mod lock;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::ProjectPaths;
use crate::domain::{ArtifactProof, Run, RunEvent, Task};
use crate::error::Result;

use fs::{
    append_ndjson, ensure_dir, path_exists, read_json, read_json_or_default, read_ndjson,
    write_json_atomic,
};

/// Per-(run, key) idempotency record: the canonical-JSON hash of the
/// original request and the response it produced. Immutable once
/// committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub payload_hash: String,
    pub response: Value,
}

pub type IdempotencyMap = BTreeMap<String, IdempotencyRecord>;

/// Per-actor, per-command timestamps inside the rolling observation
/// window.
pub type RateLimitMap = BTreeMap<String, BTreeMap<String, Vec<DateTime<Utc>>>>;

#[derive(Debug, Clone)]
pub struct Store {
    paths: ProjectPaths,
}

impl Store {
    pub fn new(paths: ProjectPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ProjectPaths {
        &self.paths
    }

    /// Create the durable layout and seed the process-wide documents.
    pub async fn init(&self) -> Result<()> {
        for dir in [
            &self.paths.data_dir,
            &self.paths.runs_dir,
            &self.paths.locks_dir,
            &self.paths.snapshot_dir,
            &self.paths.state_dir,
            &self.paths.plans_dir,
            &self.paths.artifacts_dir,
        ] {
            ensure_dir(dir).await?;
        }
        if !path_exists(&self.paths.run_index_file).await {
            write_json_atomic(&self.paths.run_index_file, &Vec::<String>::new()).await?;
        }
        if !path_exists(&self.paths.rate_limit_file).await {
            write_json_atomic(&self.paths.rate_limit_file, &RateLimitMap::new()).await?;
        }
        Ok(())
    }

    pub async fn read_run(&self, run_id: &str) -> Result<Option<Run>> {
        let path = self.paths.run_file(run_id);
        if !path_exists(&path).await {
            return Ok(None);
        }
        Ok(Some(read_json(&path).await?))
    }

    pub async fn write_run(&self, run: &Run) -> Result<()> {
        write_json_atomic(&self.paths.run_file(&run.run_id), run).await
    }

    pub async fn read_run_index(&self) -> Result<Vec<String>> {
        read_json_or_default(&self.paths.run_index_file).await
    }

    pub async fn append_run_index(&self, run_id: &str) -> Result<()> {
        let mut index = self.read_run_index().await?;
        if !index.iter().any(|id| id == run_id) {
            index.push(run_id.to_string());
        }
        write_json_atomic(&self.paths.run_index_file, &index).await
    }

    pub async fn read_tasks(&self, run_id: &str) -> Result<Vec<Task>> {
        read_json_or_default(&self.paths.tasks_file(run_id)).await
    }

    pub async fn write_tasks(&self, run_id: &str, tasks: &[Task]) -> Result<()> {
        write_json_atomic(&self.paths.tasks_file(run_id), &tasks).await
    }

    pub async fn append_event(&self, run_id: &str, event: &RunEvent) -> Result<()> {
        append_ndjson(&self.paths.events_file(run_id), event).await
    }

    pub async fn read_events(&self, run_id: &str) -> Result<Vec<RunEvent>> {
        read_ndjson(&self.paths.events_file(run_id)).await
    }

    pub async fn write_proof(&self, run_id: &str, proof: &ArtifactProof) -> Result<()> {
        write_json_atomic(&self.paths.proof_file(run_id, &proof.proof_id), proof).await
    }

    /// Proofs in proof-id order; ids are zero-padded so the lexical sort
    /// is the creation order.
    pub async fn list_proofs(&self, run_id: &str) -> Result<Vec<ArtifactProof>> {
        let dir = self.paths.proofs_dir(run_id);
        if !path_exists(&dir).await {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".json") {
                names.push(name);
            }
        }
        names.sort();

        let mut proofs = Vec::with_capacity(names.len());
        for name in names {
            proofs.push(read_json(&dir.join(name)).await?);
        }
        Ok(proofs)
    }

    pub async fn read_idempotency(&self, run_id: &str) -> Result<IdempotencyMap> {
        read_json_or_default(&self.paths.idempotency_file(run_id)).await
    }

    pub async fn write_idempotency(&self, run_id: &str, map: &IdempotencyMap) -> Result<()> {
        write_json_atomic(&self.paths.idempotency_file(run_id), map).await
    }

    pub async fn read_rate_limits(&self) -> Result<RateLimitMap> {
        read_json_or_default(&self.paths.rate_limit_file).await
    }

    pub async fn write_rate_limits(&self, map: &RateLimitMap) -> Result<()> {
        write_json_atomic(&self.paths.rate_limit_file, map).await
    }

    /// External mirror of the autopilot gauge, refreshed after every
    /// mutation that touches the run.
    pub async fn write_autopilot_mirror(&self, run: &Run) -> Result<()> {
        let document = match &run.autopilot {
            Some(autopilot) => json!({
                "run_id": run.run_id,
                "run_status": run.status,
                "autopilot": autopilot,
                "updated_at": run.updated_at,
            }),
            None => json!({
                "run_id": run.run_id,
                "run_status": run.status,
                "autopilot": Value::Null,
                "updated_at": run.updated_at,
            }),
        };
        write_json_atomic(&self.paths.autopilot_state_file, &document).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        EventKind, Persona, PersonaRole, ProofVerification, RunMetrics, RunStatus, TaskPriority,
        TaskStatus,
    };
    use tempfile::TempDir;

    fn sample_run(run_id: &str) -> Run {
        let now = Utc::now();
        Run {
            run_id: run_id.to_string(),
            goal: "Ship a validated demo artifact".to_string(),
            status: RunStatus::Executing,
            personas: vec![Persona {
                id: "ceo-001".to_string(),
                role: PersonaRole::Ceo,
                specialty: "Strategy".to_string(),
                objective: "Prove outcomes".to_string(),
            }],
            created_at: now,
            updated_at: now,
            metrics: RunMetrics::default(),
            pause_reason: None,
            blocked_reason: None,
            stop_reason: None,
            failure_reason: None,
            autopilot: None,
        }
    }

    #[tokio::test]
    async fn test_run_round_trip_and_index() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(ProjectPaths::new(dir.path()));
        store.init().await.unwrap();

        assert!(store.read_run("run_missing").await.unwrap().is_none());

        let run = sample_run("run_20260301T000000Z_abc123");
        store.write_run(&run).await.unwrap();
        let loaded = store.read_run(&run.run_id).await.unwrap().unwrap();
        assert_eq!(loaded.goal, run.goal);
        assert_eq!(loaded.status, RunStatus::Executing);

        store.append_run_index(&run.run_id).await.unwrap();
        store.append_run_index(&run.run_id).await.unwrap();
        assert_eq!(store.read_run_index().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_event_log_appends_in_order() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(ProjectPaths::new(dir.path()));
        store.init().await.unwrap();

        for seq in 1..=3usize {
            let event = RunEvent {
                event_id: format!("EVT-20260301000000-{:04}", seq),
                run_id: "run_x".to_string(),
                kind: EventKind::Command,
                command: "message".to_string(),
                actor: "investor-1".to_string(),
                timestamp: Utc::now(),
                payload: json!({ "seq": seq }),
            };
            store.append_event("run_x", &event).await.unwrap();
        }
        let events = store.read_events("run_x").await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event_id, "EVT-20260301000000-0001");
    }

    #[tokio::test]
    async fn test_proofs_listed_in_id_order() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(ProjectPaths::new(dir.path()));
        store.init().await.unwrap();
        let now = Utc::now();

        for id in ["PRF-002", "PRF-001", "PRF-010"] {
            let proof = ArtifactProof {
                proof_id: id.to_string(),
                task_id: "TASK-001".to_string(),
                uri: "file:///tmp/a".to_string(),
                sha256: "a".repeat(64),
                verification: ProofVerification::verified(now),
                created_at: now,
                updated_at: now,
            };
            store.write_proof("run_x", &proof).await.unwrap();
        }
        let proofs = store.list_proofs("run_x").await.unwrap();
        let ids: Vec<_> = proofs.iter().map(|p| p.proof_id.as_str()).collect();
        assert_eq!(ids, vec!["PRF-001", "PRF-002", "PRF-010"]);
    }

    #[tokio::test]
    async fn test_tasks_default_empty() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(ProjectPaths::new(dir.path()));
        store.init().await.unwrap();
        assert!(store.read_tasks("run_x").await.unwrap().is_empty());

        let now = Utc::now();
        let task = Task {
            task_id: "TASK-001".to_string(),
            title: "Draft plan".to_string(),
            description: "Write the execution plan".to_string(),
            status: TaskStatus::Ready,
            priority: TaskPriority::P0,
            owner_persona_id: "eng-001".to_string(),
            proof_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        store.write_tasks("run_x", &[task]).await.unwrap();
        assert_eq!(store.read_tasks("run_x").await.unwrap().len(), 1);
    }
}
