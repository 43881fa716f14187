//! Command processor: one entry point per externally-triggered command.
//! Every mutating command runs the same pipeline — contract validation,
//! authorization, rate limiting, idempotency, domain mutation, atomic
//! persistence, idempotency commit, snapshot refresh — so a mutation is
//! applied exactly once no matter how often the client retries.

use chrono::{Duration, Utc};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::artifacts::{ProofClaim, can_mark_task_done, create_and_verify_proof};
use crate::config::{AuthGate, OfficeConfig, ProjectPaths, TokenResolver};
use crate::domain::{CommandKind, QaResult, ReviewDecision, ReviewerRole, Run, RunStatus, TaskPriority};
use crate::error::{OfficeError, Result};
use crate::snapshot::build_snapshot;
use crate::store::Store;
use crate::store::lock::{
    ACTIVE_LOCK_STALE, AcquireOutcome, MutationLease, active_run_marker_age, read_active_run,
    release_active_run, try_acquire_active_run,
};
use crate::utils::{event_id, new_run_id};

use super::autopilot::{record_qa, record_review, sync_autopilot};
use super::idempotency::{IdempotencyCheck, commit_idempotent, ensure_idempotent};
use super::lifecycle::{evaluate_progress, initialize_run, resume_target, transition_run};
use super::rate_limit::{AUTH_FAILURE_LIMIT_PER_HOUR, check_and_consume};
use super::requests::{
    CommandRequest, MessageRequest, QaRequest, ReasonedRequest, ReprioritizeRequest,
    ReviewRequest, StartRequest, StatusRequest, enforce_goal_policy,
};

pub const MAX_RUN_DURATION_MINUTES: i64 = 240;

/// Outcome of a mutation body: replays skip persistence and the snapshot
/// refresh, fresh applications trigger both.
enum Applied {
    Fresh(Value),
    Replayed(Value),
}

pub struct CommandProcessor {
    store: Store,
    gate: AuthGate,
}

impl CommandProcessor {
    /// Resolve paths, create the durable layout and load the auth config
    /// for one invocation.
    pub async fn bootstrap(root: impl Into<std::path::PathBuf>) -> Result<Self> {
        Self::bootstrap_inner(root.into(), None).await
    }

    pub async fn bootstrap_with_resolver(
        root: impl Into<std::path::PathBuf>,
        resolver: Box<dyn TokenResolver>,
    ) -> Result<Self> {
        Self::bootstrap_inner(root.into(), Some(resolver)).await
    }

    async fn bootstrap_inner(
        root: std::path::PathBuf,
        resolver: Option<Box<dyn TokenResolver>>,
    ) -> Result<Self> {
        let paths = ProjectPaths::new(root);
        let store = Store::new(paths);
        store.init().await?;
        let config = OfficeConfig::load(&store.paths().config_file).await?;
        let gate = match resolver {
            Some(resolver) => AuthGate::new(config, resolver),
            None => AuthGate::with_env(config),
        };
        Ok(Self { store, gate })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub async fn process(&self, request: CommandRequest) -> Result<Value> {
        request.validate()?;
        match request {
            CommandRequest::Start(start) => self.start(start).await,
            CommandRequest::Status(status) => self.status(status).await,
            CommandRequest::Pause(pause) => self.pause_or_resume(pause, CommandKind::Pause).await,
            CommandRequest::Resume(resume) => {
                self.pause_or_resume(resume, CommandKind::Resume).await
            }
            CommandRequest::Reprioritize(reprioritize) => self.reprioritize(reprioritize).await,
            CommandRequest::Message(message) => self.message(message).await,
            CommandRequest::Qa(qa) => self.qa(qa).await,
            CommandRequest::Review(review) => self.review(review).await,
            CommandRequest::Stop(stop) => self.stop(stop).await,
        }
    }

    // ---- shared pipeline stages ----

    /// Authorization failures consume a dedicated auth-failure bucket so
    /// credential probing is throttled without touching the legitimate
    /// quota.
    async fn authorize_mutating(
        &self,
        actor: &str,
        auth_token: &str,
        command: CommandKind,
    ) -> Result<()> {
        if !self.gate.is_actor_authorized(actor, command) {
            check_and_consume(
                &self.store,
                actor,
                &format!("authz-denied:{}", command),
                AUTH_FAILURE_LIMIT_PER_HOUR,
                Utc::now(),
            )
            .await?;
            return Err(OfficeError::unauthorized(
                format!("Actor {} is not authorized for {}", actor, command),
                Some(json!({ "actor": actor, "command": command.as_str() })),
            ));
        }
        if !self.gate.verify_token(actor, auth_token) {
            check_and_consume(
                &self.store,
                actor,
                &format!("auth-failed:{}", command),
                AUTH_FAILURE_LIMIT_PER_HOUR,
                Utc::now(),
            )
            .await?;
            return Err(OfficeError::unauthorized(
                format!("Invalid auth token for actor {}", actor),
                Some(json!({ "actor": actor, "command": command.as_str() })),
            ));
        }
        Ok(())
    }

    async fn consume_rate(&self, actor: &str, command: CommandKind) -> Result<()> {
        check_and_consume(
            &self.store,
            actor,
            command.as_str(),
            self.gate.per_hour_limit(command),
            Utc::now(),
        )
        .await
    }

    async fn require_active_run(
        &self,
        budget_command: Option<CommandKind>,
    ) -> Result<(String, Run)> {
        let run_id = read_active_run(self.store.paths())
            .await?
            .ok_or_else(|| {
                OfficeError::invalid_transition(
                    "No active run available for mutating command",
                    None,
                )
            })?;
        let run = self.store.read_run(&run_id).await?.ok_or_else(|| {
            OfficeError::storage(
                format!("Active run {} could not be loaded", run_id),
                Some(json!({ "run_id": run_id })),
            )
        })?;
        if let Some(command) = budget_command {
            enforce_duration_budget(&run, command)?;
        }
        Ok((run_id, run))
    }

    async fn append_command_event(
        &self,
        run_id: &str,
        command: CommandKind,
        actor: &str,
        payload: Value,
    ) -> Result<String> {
        let count = self.store.read_events(run_id).await?.len();
        let event = crate::domain::RunEvent::command_entry(
            event_id(Utc::now(), count + 1),
            run_id,
            command.as_str(),
            actor,
            Utc::now(),
            payload,
        );
        self.store.append_event(run_id, &event).await?;
        Ok(event.event_id)
    }

    async fn verified_proof_count(&self, run_id: &str) -> Result<usize> {
        Ok(self
            .store
            .list_proofs(run_id)
            .await?
            .iter()
            .filter(|p| p.verification.is_verified())
            .count())
    }

    async fn persist_run(&self, run: &Run) -> Result<()> {
        self.store.write_run(run).await?;
        if run.status.is_terminal() {
            release_active_run(self.store.paths()).await?;
        }
        self.store.write_autopilot_mirror(run).await
    }

    // ---- start ----

    async fn start(&self, request: StartRequest) -> Result<Value> {
        self.authorize_mutating(&request.actor, &request.auth_token, CommandKind::Start)
            .await?;
        self.consume_rate(&request.actor, CommandKind::Start).await?;
        enforce_goal_policy(&request.goal)?;

        let payload = CommandRequest::Start(request.clone()).payload_value();
        let paths = self.store.paths();

        if let Some(active_id) = read_active_run(paths).await? {
            match self.store.read_run(&active_id).await? {
                Some(active) if !active.status.is_terminal() => {
                    // A retried start with the same key and payload must
                    // replay the original result, not fail on the lock.
                    match ensure_idempotent(
                        &self.store,
                        &active_id,
                        &request.idempotency_key,
                        &payload,
                    )
                    .await?
                    {
                        IdempotencyCheck::Replay { response } => return Ok(response),
                        IdempotencyCheck::Proceed { .. } => {
                            return Err(OfficeError::active_run_lock(
                                format!("Run {} is already active", active_id),
                                Some(json!({ "run_id": active_id })),
                            ));
                        }
                    }
                }
                Some(_) => {
                    // Marker pointing at a terminal run is leftover state.
                    release_active_run(paths).await?;
                }
                None => {
                    if let Some(age) = active_run_marker_age(paths).await?
                        && age <= ACTIVE_LOCK_STALE
                    {
                        return Err(OfficeError::active_run_lock(
                            format!("Run {} startup is still in progress", active_id),
                            Some(json!({ "run_id": active_id })),
                        ));
                    }
                    warn!(run_id = %active_id, "evicting stale active-run marker");
                    release_active_run(paths).await?;
                }
            }
        }

        let run_id = new_run_id(Utc::now());
        match try_acquire_active_run(paths, &run_id).await? {
            AcquireOutcome::Acquired => {}
            AcquireOutcome::Held(holder) => {
                return Err(OfficeError::active_run_lock(
                    format!(
                        "Run {} is already active",
                        holder.as_deref().unwrap_or("unknown")
                    ),
                    holder.map(|id| json!({ "run_id": id })),
                ));
            }
        }

        // From here the marker must be released on any failure so a
        // half-created run never wedges the workspace.
        let initialized = match initialize_run(&request.goal, paths, Some(run_id.clone())).await {
            Ok(initialized) => initialized,
            Err(err) => {
                let _ = release_active_run(paths).await;
                return Err(err);
            }
        };

        let (map, payload_hash) = match ensure_idempotent(
            &self.store,
            &run_id,
            &request.idempotency_key,
            &payload,
        )
        .await
        {
            Ok(IdempotencyCheck::Proceed { map, payload_hash }) => (map, payload_hash),
            Ok(IdempotencyCheck::Replay { response }) => return Ok(response),
            Err(err) => {
                let _ = release_active_run(paths).await;
                return Err(err);
            }
        };

        let persisted = async {
            self.append_command_event(
                &run_id,
                CommandKind::Start,
                &request.actor,
                json!({ "goal": request.goal }),
            )
            .await?;
            self.store.write_run(&initialized.run).await?;
            self.store.write_tasks(&run_id, &initialized.tasks).await?;
            self.store.append_run_index(&run_id).await?;
            self.store.write_autopilot_mirror(&initialized.run).await
        }
        .await;
        if let Err(err) = persisted {
            let _ = release_active_run(paths).await;
            return Err(err);
        }

        let response = json!({
            "ok": true,
            "data": { "run_id": run_id, "status": initialized.run.status }
        });
        commit_idempotent(
            &self.store,
            &run_id,
            &request.idempotency_key,
            payload_hash,
            &response,
            map,
        )
        .await?;
        build_snapshot(&self.store, Some(&run_id)).await?;

        info!(run_id, tasks = initialized.tasks.len(), "run started");
        Ok(response)
    }

    // ---- status ----

    async fn status(&self, request: StatusRequest) -> Result<Value> {
        if !self.gate.status_open() {
            let (Some(actor), Some(token)) = (&request.actor, &request.auth_token) else {
                return Err(OfficeError::unauthorized(
                    "status requires actor and auth token when read_only_open is false",
                    Some(json!({ "command": "status" })),
                ));
            };
            if !self.gate.can_read_status(actor) || !self.gate.verify_token(actor, token) {
                return Err(OfficeError::unauthorized(
                    format!("Actor {} is not authorized for status", actor),
                    Some(json!({ "actor": actor, "command": "status" })),
                ));
            }
        }

        let run = match &request.run_id {
            Some(run_id) => self.store.read_run(run_id).await?,
            None => match read_active_run(self.store.paths()).await? {
                Some(active_id) => self.store.read_run(&active_id).await?,
                None => match self.store.read_run_index().await?.last() {
                    Some(latest) => self.store.read_run(latest).await?,
                    None => None,
                },
            },
        };

        let target = request
            .run_id
            .as_deref()
            .or_else(|| run.as_ref().map(|r| r.run_id.as_str()));
        let snapshot = build_snapshot(&self.store, target).await?;
        Ok(json!({ "ok": true, "data": { "run": run, "snapshot": snapshot } }))
    }

    // ---- pause / resume ----

    async fn pause_or_resume(&self, request: ReasonedRequest, command: CommandKind) -> Result<Value> {
        self.authorize_mutating(&request.actor, &request.auth_token, command)
            .await?;
        self.consume_rate(&request.actor, command).await?;

        let (run_id, run) = self.require_active_run(Some(command)).await?;
        if command == CommandKind::Pause {
            require_non_terminal(&run, command)?;
        }
        if command == CommandKind::Resume
            && !matches!(run.status, RunStatus::Paused | RunStatus::Blocked)
        {
            return Err(cannot_in_status(command, &run_id, run.status));
        }

        let payload = match command {
            CommandKind::Pause => CommandRequest::Pause(request.clone()).payload_value(),
            _ => CommandRequest::Resume(request.clone()).payload_value(),
        };
        let (map, payload_hash) =
            match ensure_idempotent(&self.store, &run_id, &request.idempotency_key, &payload)
                .await?
            {
                IdempotencyCheck::Proceed { map, payload_hash } => (map, payload_hash),
                IdempotencyCheck::Replay { response } => return Ok(response),
            };

        self.append_command_event(
            &run_id,
            command,
            &request.actor,
            json!({ "reason": request.reason }),
        )
        .await?;

        let next_status = match command {
            CommandKind::Pause => RunStatus::Paused,
            _ => resume_target(&run),
        };
        let updated = transition_for_command(&run, &run_id, command, next_status, &request.reason)?;
        self.persist_run(&updated).await?;

        let response = json!({
            "ok": true,
            "data": { "run_id": run_id, "status": updated.status }
        });
        commit_idempotent(
            &self.store,
            &run_id,
            &request.idempotency_key,
            payload_hash,
            &response,
            map,
        )
        .await?;
        build_snapshot(&self.store, Some(&run_id)).await?;
        Ok(response)
    }

    // ---- reprioritize ----

    async fn reprioritize(&self, request: ReprioritizeRequest) -> Result<Value> {
        self.authorize_mutating(&request.actor, &request.auth_token, CommandKind::Reprioritize)
            .await?;
        self.consume_rate(&request.actor, CommandKind::Reprioritize)
            .await?;

        let (run_id, run) = self
            .require_active_run(Some(CommandKind::Reprioritize))
            .await?;
        require_non_terminal(&run, CommandKind::Reprioritize)?;

        let payload = CommandRequest::Reprioritize(request.clone()).payload_value();
        let (map, payload_hash) =
            match ensure_idempotent(&self.store, &run_id, &request.idempotency_key, &payload)
                .await?
            {
                IdempotencyCheck::Proceed { map, payload_hash } => (map, payload_hash),
                IdempotencyCheck::Replay { response } => return Ok(response),
            };

        let priority = TaskPriority::parse(&request.priority).ok_or_else(|| {
            OfficeError::contract("priority must be one of P0, P1, P2, P3", None)
        })?;

        let mut tasks = self.store.read_tasks(&run_id).await?;
        let Some(target) = tasks.iter_mut().find(|t| t.task_id == request.task_id) else {
            return Err(OfficeError::contract(
                format!("Task {} does not exist", request.task_id),
                Some(json!({ "task_id": request.task_id })),
            ));
        };

        self.append_command_event(
            &run_id,
            CommandKind::Reprioritize,
            &request.actor,
            json!({
                "task_id": request.task_id,
                "priority": priority,
                "reason": request.reason,
            }),
        )
        .await?;

        target.priority = priority;
        target.updated_at = Utc::now();
        let task_id = target.task_id.clone();
        self.store.write_tasks(&run_id, &tasks).await?;

        let response = json!({
            "ok": true,
            "data": { "task_id": task_id, "priority": priority }
        });
        commit_idempotent(
            &self.store,
            &run_id,
            &request.idempotency_key,
            payload_hash,
            &response,
            map,
        )
        .await?;
        build_snapshot(&self.store, Some(&run_id)).await?;
        Ok(response)
    }

    // ---- message (and task completion) ----

    async fn message(&self, request: MessageRequest) -> Result<Value> {
        self.authorize_mutating(&request.actor, &request.auth_token, CommandKind::Message)
            .await?;
        self.consume_rate(&request.actor, CommandKind::Message)
            .await?;

        let (run_id, run) = self.require_active_run(Some(CommandKind::Message)).await?;
        require_non_terminal(&run, CommandKind::Message)?;

        let known_recipient = request.to == "ceo"
            || request.to == "all"
            || run.personas.iter().any(|p| p.id == request.to);
        if !known_recipient {
            return Err(OfficeError::contract(
                format!("Unknown message recipient: {}", request.to),
                Some(json!({ "to": request.to })),
            ));
        }

        let payload = CommandRequest::Message(request.clone()).payload_value();
        let (map, payload_hash) =
            match ensure_idempotent(&self.store, &run_id, &request.idempotency_key, &payload)
                .await?
            {
                IdempotencyCheck::Proceed { map, payload_hash } => (map, payload_hash),
                IdempotencyCheck::Replay { response } => return Ok(response),
            };

        let mut tasks = self.store.read_tasks(&run_id).await?;
        let event_id = self
            .append_command_event(
                &run_id,
                CommandKind::Message,
                &request.actor,
                json!({
                    "to": request.to,
                    "text": request.text,
                    "task_id": request.task_id,
                    "complete_task": request.complete_task,
                }),
            )
            .await?;

        let mut task_update: Option<Value> = None;
        if request.complete_task {
            if !self
                .gate
                .is_actor_authorized(&request.actor, CommandKind::CompleteTask)
            {
                return Err(OfficeError::unauthorized(
                    format!(
                        "Actor {} is not authorized for complete-task",
                        request.actor
                    ),
                    Some(json!({ "actor": request.actor, "command": "complete-task" })),
                ));
            }

            // Validated as present by the request contract.
            let (Some(task_id), Some(proof_uri), Some(proof_sha256)) = (
                request.task_id.as_deref(),
                request.proof_uri.as_deref(),
                request.proof_sha256.as_deref(),
            ) else {
                return Err(OfficeError::contract(
                    "complete_task requires task_id, proof_uri and proof_sha256",
                    None,
                ));
            };

            let Some(task) = tasks.iter_mut().find(|t| t.task_id == task_id) else {
                return Err(OfficeError::contract(
                    format!("Task {} does not exist", task_id),
                    Some(json!({ "task_id": task_id })),
                ));
            };

            let policy = self.gate.proof_policy(&self.store.paths().root);
            let proof = create_and_verify_proof(
                &self.store,
                ProofClaim {
                    run_id: &run_id,
                    task_id,
                    uri: proof_uri,
                    sha256: proof_sha256,
                },
                &policy,
            )
            .await?;

            if !proof.verification.is_verified() {
                // The rejected proof stays in the history; the command
                // fails and the idempotency key is not consumed.
                build_snapshot(&self.store, Some(&run_id)).await?;
                return Err(OfficeError::artifact(
                    "Artifact proof verification failed",
                    Some(json!({
                        "task_id": task_id,
                        "proof_id": proof.proof_id,
                        "reason_code": proof.verification.reason_code,
                    })),
                ));
            }

            if !task.proof_ids.contains(&proof.proof_id) {
                task.proof_ids.push(proof.proof_id.clone());
            }

            let proofs = self.store.list_proofs(&run_id).await?;
            if !can_mark_task_done(task, &proofs) {
                return Err(OfficeError::artifact(
                    "Task cannot be marked done without a verified proof",
                    Some(json!({ "task_id": task_id })),
                ));
            }

            task.status = crate::domain::TaskStatus::Done;
            task.updated_at = Utc::now();
            task_update = Some(json!({
                "task_id": task.task_id,
                "status": task.status,
                "proof_id": proof.proof_id,
            }));

            let verified = proofs
                .iter()
                .filter(|p| p.verification.is_verified())
                .count();
            let updated = evaluate_progress(&run, &tasks, verified)?;

            self.store.write_tasks(&run_id, &tasks).await?;
            self.persist_run(&updated).await?;
        }

        let mut data = json!({ "event_id": event_id });
        if let Some(update) = task_update {
            data["task_update"] = update;
        }
        let response = json!({ "ok": true, "data": data });
        commit_idempotent(
            &self.store,
            &run_id,
            &request.idempotency_key,
            payload_hash,
            &response,
            map,
        )
        .await?;
        build_snapshot(&self.store, Some(&run_id)).await?;
        Ok(response)
    }

    // ---- qa ----

    async fn qa(&self, request: QaRequest) -> Result<Value> {
        self.authorize_mutating(&request.actor, &request.auth_token, CommandKind::Qa)
            .await?;
        self.consume_rate(&request.actor, CommandKind::Qa).await?;

        let (run_id, run) = self.require_active_run(Some(CommandKind::Qa)).await?;
        require_non_terminal(&run, CommandKind::Qa)?;
        require_verifying(&run, &run_id, CommandKind::Qa)?;
        require_autopilot(&run, &run_id, CommandKind::Qa)?;

        // Both QA and review re-read the latest run under the lease to
        // avoid racing a concurrent reviewer.
        let lease = MutationLease::acquire(self.store.paths(), &run_id).await?;
        let outcome = self.qa_locked(&request, &run_id).await;
        let release = lease.release().await;
        let applied = outcome?;
        release?;

        match applied {
            Applied::Replayed(response) => Ok(response),
            Applied::Fresh(response) => {
                build_snapshot(&self.store, Some(&run_id)).await?;
                Ok(response)
            }
        }
    }

    async fn qa_locked(&self, request: &QaRequest, run_id: &str) -> Result<Applied> {
        let payload = CommandRequest::Qa(request.clone()).payload_value();
        let (map, payload_hash) =
            match ensure_idempotent(&self.store, run_id, &request.idempotency_key, &payload)
                .await?
            {
                IdempotencyCheck::Proceed { map, payload_hash } => (map, payload_hash),
                IdempotencyCheck::Replay { response } => return Ok(Applied::Replayed(response)),
            };

        let latest = self.store.read_run(run_id).await?.ok_or_else(|| {
            OfficeError::storage(
                format!("Active run {} could not be loaded", run_id),
                Some(json!({ "run_id": run_id })),
            )
        })?;
        require_verifying(&latest, run_id, CommandKind::Qa)?;
        let autopilot = require_autopilot(&latest, run_id, CommandKind::Qa)?;

        self.append_command_event(
            run_id,
            CommandKind::Qa,
            &request.actor,
            json!({
                "result": request.result,
                "summary": request.summary,
                "failure_signature": request.failure_signature,
            }),
        )
        .await?;

        let result = match request.result.as_str() {
            "pass" => QaResult::Pass,
            _ => QaResult::Fail,
        };
        let now = Utc::now();
        let mut updated = latest.clone();
        updated.updated_at = now;
        updated.autopilot = Some(record_qa(
            autopilot.clone(),
            result,
            &request.summary,
            request.failure_signature.as_deref(),
            &request.actor,
            now,
        ));
        let mut updated = sync_autopilot(updated);

        let escalation_reason = updated.autopilot.as_ref().and_then(|ap| {
            if !ap.qa_escalated() {
                None
            } else if ap.qa.repeated_failure_count
                >= crate::domain::autopilot::REPEATED_FAILURE_ESCALATION
            {
                Some(format!(
                    "QA failed: same failure repeated {} times",
                    ap.qa.repeated_failure_count
                ))
            } else {
                Some(format!("QA failed: exceeded max cycles {}", ap.qa.max_cycles))
            }
        });
        if let Some(reason) = escalation_reason {
            updated = transition_run(&updated, RunStatus::Failed, Some(&reason))?;
        } else {
            let tasks = self.store.read_tasks(run_id).await?;
            let verified = self.verified_proof_count(run_id).await?;
            updated = evaluate_progress(&updated, &tasks, verified)?;
        }

        self.persist_run(&updated).await?;

        let response = json!({
            "ok": true,
            "data": {
                "run_id": run_id,
                "status": updated.status,
                "qa": updated.autopilot.as_ref().map(|ap| &ap.qa),
                "autopilot": updated.autopilot.as_ref().map(|ap| json!({
                    "phase": ap.phase,
                    "state": ap.state,
                })),
            }
        });
        commit_idempotent(
            &self.store,
            run_id,
            &request.idempotency_key,
            payload_hash,
            &response,
            map,
        )
        .await?;
        Ok(Applied::Fresh(response))
    }

    // ---- review ----

    async fn review(&self, request: ReviewRequest) -> Result<Value> {
        self.authorize_mutating(&request.actor, &request.auth_token, CommandKind::Review)
            .await?;
        self.consume_rate(&request.actor, CommandKind::Review)
            .await?;

        let role = ReviewerRole::parse(&request.reviewer).ok_or_else(|| {
            OfficeError::contract("reviewer must be architect, security or code", None)
        })?;
        if !self.gate.can_approve_reviewer(&request.actor, role) {
            return Err(OfficeError::unauthorized(
                format!(
                    "Actor {} is not authorized to approve reviewer role {}",
                    request.actor, role
                ),
                Some(json!({
                    "actor": request.actor,
                    "reviewer": role,
                    "command": "review",
                })),
            ));
        }

        let (run_id, run) = self.require_active_run(Some(CommandKind::Review)).await?;
        require_non_terminal(&run, CommandKind::Review)?;
        require_verifying(&run, &run_id, CommandKind::Review)?;
        require_autopilot(&run, &run_id, CommandKind::Review)?;

        let lease = MutationLease::acquire(self.store.paths(), &run_id).await?;
        let outcome = self.review_locked(&request, role, &run_id).await;
        let release = lease.release().await;
        let applied = outcome?;
        release?;

        match applied {
            Applied::Replayed(response) => Ok(response),
            Applied::Fresh(response) => {
                build_snapshot(&self.store, Some(&run_id)).await?;
                Ok(response)
            }
        }
    }

    async fn review_locked(
        &self,
        request: &ReviewRequest,
        role: ReviewerRole,
        run_id: &str,
    ) -> Result<Applied> {
        let payload = CommandRequest::Review(request.clone()).payload_value();
        let (map, payload_hash) =
            match ensure_idempotent(&self.store, run_id, &request.idempotency_key, &payload)
                .await?
            {
                IdempotencyCheck::Proceed { map, payload_hash } => (map, payload_hash),
                IdempotencyCheck::Replay { response } => return Ok(Applied::Replayed(response)),
            };

        let latest = self.store.read_run(run_id).await?.ok_or_else(|| {
            OfficeError::storage(
                format!("Active run {} could not be loaded", run_id),
                Some(json!({ "run_id": run_id })),
            )
        })?;
        require_verifying(&latest, run_id, CommandKind::Review)?;
        let autopilot = require_autopilot(&latest, run_id, CommandKind::Review)?;

        if autopilot.qa.result != QaResult::Pass {
            return Err(OfficeError::invalid_transition(
                "Cannot review before QA has passed",
                Some(json!({ "command": "review", "run_id": run_id })),
            ));
        }

        self.append_command_event(
            run_id,
            CommandKind::Review,
            &request.actor,
            json!({
                "reviewer": role,
                "decision": request.decision,
                "summary": request.summary,
            }),
        )
        .await?;

        let decision = match request.decision.as_str() {
            "approve" => ReviewDecision::Approve,
            _ => ReviewDecision::Reject,
        };
        let now = Utc::now();
        let mut updated = latest.clone();
        updated.updated_at = now;
        updated.autopilot = Some(record_review(
            autopilot.clone(),
            role,
            decision,
            &request.summary,
            &request.actor,
            now,
        ));
        let mut updated = sync_autopilot(updated);

        let escalation_reason = updated.autopilot.as_ref().and_then(|ap| {
            if decision == ReviewDecision::Reject && ap.validation_escalated() {
                Some(format!(
                    "Validation rejected too many times ({}/{})",
                    ap.validation.rounds_completed, ap.validation.max_rounds
                ))
            } else {
                None
            }
        });
        if let Some(reason) = escalation_reason {
            updated = transition_run(&updated, RunStatus::Failed, Some(&reason))?;
        } else {
            let tasks = self.store.read_tasks(run_id).await?;
            let verified = self.verified_proof_count(run_id).await?;
            updated = evaluate_progress(&updated, &tasks, verified)?;
        }

        self.persist_run(&updated).await?;

        let completion_approved = updated
            .autopilot
            .as_ref()
            .is_some_and(|ap| ap.completion_approved());
        let response = json!({
            "ok": true,
            "data": {
                "run_id": run_id,
                "status": updated.status,
                "reviewer": role,
                "decision": decision,
                "completion_approved": completion_approved,
            }
        });
        commit_idempotent(
            &self.store,
            run_id,
            &request.idempotency_key,
            payload_hash,
            &response,
            map,
        )
        .await?;
        Ok(Applied::Fresh(response))
    }

    // ---- stop ----

    async fn stop(&self, request: ReasonedRequest) -> Result<Value> {
        self.authorize_mutating(&request.actor, &request.auth_token, CommandKind::Stop)
            .await?;
        self.consume_rate(&request.actor, CommandKind::Stop).await?;

        let (run_id, run) = self.require_active_run(None).await?;
        require_non_terminal(&run, CommandKind::Stop)?;

        let payload = CommandRequest::Stop(request.clone()).payload_value();
        let (map, payload_hash) =
            match ensure_idempotent(&self.store, &run_id, &request.idempotency_key, &payload)
                .await?
            {
                IdempotencyCheck::Proceed { map, payload_hash } => (map, payload_hash),
                IdempotencyCheck::Replay { response } => return Ok(response),
            };

        self.append_command_event(
            &run_id,
            CommandKind::Stop,
            &request.actor,
            json!({ "reason": request.reason }),
        )
        .await?;

        let updated = transition_for_command(
            &run,
            &run_id,
            CommandKind::Stop,
            RunStatus::Stopped,
            &request.reason,
        )?;
        self.persist_run(&updated).await?;

        let response = json!({
            "ok": true,
            "data": { "run_id": run_id, "status": updated.status }
        });
        commit_idempotent(
            &self.store,
            &run_id,
            &request.idempotency_key,
            payload_hash,
            &response,
            map,
        )
        .await?;
        build_snapshot(&self.store, Some(&run_id)).await?;
        Ok(response)
    }
}

// ---- free-standing guards ----

fn cannot_in_status(command: CommandKind, run_id: &str, status: RunStatus) -> OfficeError {
    OfficeError::invalid_transition(
        format!("Cannot {} when run status is {}", command, status),
        Some(json!({ "command": command.as_str(), "run_id": run_id })),
    )
}

fn require_non_terminal(run: &Run, command: CommandKind) -> Result<()> {
    if run.status.is_terminal() {
        return Err(cannot_in_status(command, &run.run_id, run.status));
    }
    Ok(())
}

fn require_verifying(run: &Run, run_id: &str, command: CommandKind) -> Result<()> {
    if run.status != RunStatus::Verifying {
        return Err(cannot_in_status(command, run_id, run.status));
    }
    Ok(())
}

fn require_autopilot<'r>(
    run: &'r Run,
    run_id: &str,
    command: CommandKind,
) -> Result<&'r crate::domain::RunAutopilot> {
    run.autopilot.as_ref().ok_or_else(|| {
        OfficeError::invalid_transition(
            format!("Cannot {}: run {} has no autopilot metadata", command, run_id),
            Some(json!({ "command": command.as_str(), "run_id": run_id })),
        )
    })
}

/// Mutating commands against a long-lived run are refused once the run
/// exceeds its wall-clock budget.
fn enforce_duration_budget(run: &Run, command: CommandKind) -> Result<()> {
    let age = Utc::now() - run.created_at;
    if age > Duration::minutes(MAX_RUN_DURATION_MINUTES) {
        return Err(OfficeError::invalid_transition(
            format!(
                "Cannot {}: run exceeded max duration of {} minutes",
                command, MAX_RUN_DURATION_MINUTES
            ),
            Some(json!({
                "command": command.as_str(),
                "run_id": run.run_id,
                "max_duration_minutes": MAX_RUN_DURATION_MINUTES,
            })),
        ));
    }
    Ok(())
}

/// Adapt a table rejection into the caller-facing "cannot <command> in
/// <status>" shape; other errors pass through untouched.
fn transition_for_command(
    run: &Run,
    run_id: &str,
    command: CommandKind,
    next: RunStatus,
    reason: &str,
) -> Result<Run> {
    transition_run(run, next, Some(reason)).map_err(|err| match err {
        OfficeError::InvalidTransition { .. } => cannot_in_status(command, run_id, run.status),
        other => other,
    })
}
