//! Thin translation layer: clap flags in, typed command requests out.
//! Semantic validation (lengths, enums, id formats) happens on the
//! request types, not here.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::orchestrator::{
    CommandRequest, MessageRequest, QaRequest, ReasonedRequest, ReprioritizeRequest,
    ReviewRequest, StartRequest, StatusRequest,
};

#[derive(Parser)]
#[command(name = "office-pilot")]
#[command(author, version, about = "Virtual-company run orchestrator", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root holding config/, data/ and artifacts/
    #[arg(long, global = true, default_value = ".", env = "OFFICE_PILOT_ROOT")]
    pub root: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a new run for a goal
    Start {
        #[arg(long)]
        goal: String,
        #[arg(long)]
        actor: String,
        #[arg(long)]
        auth_token: String,
        #[arg(long)]
        idempotency_key: String,
    },

    /// Show a run and the office snapshot
    Status {
        #[arg(long)]
        run_id: Option<String>,
        #[arg(long)]
        actor: Option<String>,
        #[arg(long)]
        auth_token: Option<String>,
    },

    /// Pause the active run
    Pause {
        #[arg(long)]
        reason: String,
        #[arg(long)]
        actor: String,
        #[arg(long)]
        auth_token: String,
        #[arg(long)]
        idempotency_key: String,
    },

    /// Resume a paused or blocked run
    Resume {
        #[arg(long)]
        reason: String,
        #[arg(long)]
        actor: String,
        #[arg(long)]
        auth_token: String,
        #[arg(long)]
        idempotency_key: String,
    },

    /// Change a task's priority
    Reprioritize {
        #[arg(long)]
        task_id: String,
        /// P0, P1, P2 or P3
        #[arg(long)]
        priority: String,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        actor: String,
        #[arg(long)]
        auth_token: String,
        #[arg(long)]
        idempotency_key: String,
    },

    /// Send a message to a persona, optionally completing a task with a
    /// proof
    Message {
        #[arg(long)]
        to: String,
        #[arg(long)]
        text: String,
        #[arg(long)]
        task_id: Option<String>,
        #[arg(long)]
        proof_uri: Option<String>,
        #[arg(long)]
        proof_sha256: Option<String>,
        #[arg(long)]
        complete_task: bool,
        #[arg(long)]
        actor: String,
        #[arg(long)]
        auth_token: String,
        #[arg(long)]
        idempotency_key: String,
    },

    /// Record a QA cycle result
    Qa {
        /// pass or fail
        #[arg(long)]
        result: String,
        #[arg(long)]
        summary: String,
        #[arg(long)]
        failure_signature: Option<String>,
        #[arg(long)]
        actor: String,
        #[arg(long)]
        auth_token: String,
        #[arg(long)]
        idempotency_key: String,
    },

    /// Record a reviewer decision
    Review {
        /// architect, security or code
        #[arg(long)]
        reviewer: String,
        /// approve or reject
        #[arg(long)]
        decision: String,
        #[arg(long)]
        summary: String,
        #[arg(long)]
        actor: String,
        #[arg(long)]
        auth_token: String,
        #[arg(long)]
        idempotency_key: String,
    },

    /// Stop the active run
    Stop {
        #[arg(long)]
        reason: String,
        #[arg(long)]
        actor: String,
        #[arg(long)]
        auth_token: String,
        #[arg(long)]
        idempotency_key: String,
    },
}

impl Commands {
    pub fn into_request(self) -> CommandRequest {
        match self {
            Commands::Start {
                goal,
                actor,
                auth_token,
                idempotency_key,
            } => CommandRequest::Start(StartRequest {
                goal,
                actor,
                auth_token,
                idempotency_key,
            }),
            Commands::Status {
                run_id,
                actor,
                auth_token,
            } => CommandRequest::Status(StatusRequest {
                run_id,
                actor,
                auth_token,
            }),
            Commands::Pause {
                reason,
                actor,
                auth_token,
                idempotency_key,
            } => CommandRequest::Pause(ReasonedRequest {
                reason,
                actor,
                auth_token,
                idempotency_key,
            }),
            Commands::Resume {
                reason,
                actor,
                auth_token,
                idempotency_key,
            } => CommandRequest::Resume(ReasonedRequest {
                reason,
                actor,
                auth_token,
                idempotency_key,
            }),
            Commands::Reprioritize {
                task_id,
                priority,
                reason,
                actor,
                auth_token,
                idempotency_key,
            } => CommandRequest::Reprioritize(ReprioritizeRequest {
                task_id,
                priority,
                reason,
                actor,
                auth_token,
                idempotency_key,
            }),
            Commands::Message {
                to,
                text,
                task_id,
                proof_uri,
                proof_sha256,
                complete_task,
                actor,
                auth_token,
                idempotency_key,
            } => CommandRequest::Message(MessageRequest {
                to,
                text,
                task_id,
                proof_uri,
                proof_sha256,
                complete_task,
                actor,
                auth_token,
                idempotency_key,
            }),
            Commands::Qa {
                result,
                summary,
                failure_signature,
                actor,
                auth_token,
                idempotency_key,
            } => CommandRequest::Qa(QaRequest {
                result,
                summary,
                failure_signature,
                actor,
                auth_token,
                idempotency_key,
            }),
            Commands::Review {
                reviewer,
                decision,
                summary,
                actor,
                auth_token,
                idempotency_key,
            } => CommandRequest::Review(ReviewRequest {
                reviewer,
                decision,
                summary,
                actor,
                auth_token,
                idempotency_key,
            }),
            Commands::Stop {
                reason,
                actor,
                auth_token,
                idempotency_key,
            } => CommandRequest::Stop(ReasonedRequest {
                reason,
                actor,
                auth_token,
                idempotency_key,
            }),
        }
    }
}
