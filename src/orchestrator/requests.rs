//! Typed command requests — the tagged sum type every dispatch point
//! matches exhaustively. Each request validates its own field contracts
//! through the violation-aggregating collector before any pipeline work
//! happens.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Value, json};

use crate::domain::CommandKind;
use crate::domain::contract::{
    GOAL_MAX, GOAL_MIN, MESSAGE_TEXT_MAX, REASON_MAX, REASON_MIN, SHA256_RE, SIGNATURE_MAX,
    SIGNATURE_MIN, SUMMARY_MAX, SUMMARY_MIN, TASK_ID_RE, RUN_ID_RE, Violations,
};
use crate::error::{OfficeError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct StartRequest {
    pub goal: String,
    pub actor: String,
    pub auth_token: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReasonedRequest {
    pub reason: String,
    pub actor: String,
    pub auth_token: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReprioritizeRequest {
    pub task_id: String,
    pub priority: String,
    pub reason: String,
    pub actor: String,
    pub auth_token: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageRequest {
    pub to: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_sha256: Option<String>,
    pub complete_task: bool,
    pub actor: String,
    pub auth_token: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QaRequest {
    pub result: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_signature: Option<String>,
    pub actor: String,
    pub auth_token: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewRequest {
    pub reviewer: String,
    pub decision: String,
    pub summary: String,
    pub actor: String,
    pub auth_token: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandRequest {
    Start(StartRequest),
    Status(StatusRequest),
    Pause(ReasonedRequest),
    Resume(ReasonedRequest),
    Reprioritize(ReprioritizeRequest),
    Message(MessageRequest),
    Qa(QaRequest),
    Review(ReviewRequest),
    Stop(ReasonedRequest),
}

impl CommandRequest {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Start(_) => CommandKind::Start,
            Self::Status(_) => CommandKind::Status,
            Self::Pause(_) => CommandKind::Pause,
            Self::Resume(_) => CommandKind::Resume,
            Self::Reprioritize(_) => CommandKind::Reprioritize,
            Self::Message(_) => CommandKind::Message,
            Self::Qa(_) => CommandKind::Qa,
            Self::Review(_) => CommandKind::Review,
            Self::Stop(_) => CommandKind::Stop,
        }
    }

    /// The canonical payload used for idempotency hashing. Includes the
    /// command tag so the same key cannot silently cross commands.
    pub fn payload_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Start(request) => request.validate(),
            Self::Status(request) => request.validate(),
            Self::Pause(request) | Self::Resume(request) | Self::Stop(request) => {
                request.validate()
            }
            Self::Reprioritize(request) => request.validate(),
            Self::Message(request) => request.validate(),
            Self::Qa(request) => request.validate(),
            Self::Review(request) => request.validate(),
        }
    }
}

fn require_credentials(v: &mut Violations, actor: &str, auth_token: &str, idempotency_key: &str) {
    v.require_nonempty("actor", actor);
    v.require_nonempty("auth_token", auth_token);
    v.require_nonempty("idempotency_key", idempotency_key);
}

impl StartRequest {
    pub fn validate(&self) -> Result<()> {
        let mut v = Violations::new();
        v.require_chars("goal", &self.goal, GOAL_MIN, GOAL_MAX);
        require_credentials(&mut v, &self.actor, &self.auth_token, &self.idempotency_key);
        v.into_result()
    }
}

impl StatusRequest {
    pub fn validate(&self) -> Result<()> {
        let mut v = Violations::new();
        if let Some(run_id) = &self.run_id {
            v.require_match("run_id", run_id, &RUN_ID_RE, "run_<stamp>_<suffix>");
        }
        if let Some(actor) = &self.actor {
            v.require_nonempty("actor", actor);
        }
        if let Some(token) = &self.auth_token {
            v.require_nonempty("auth_token", token);
        }
        v.into_result()
    }
}

impl ReasonedRequest {
    pub fn validate(&self) -> Result<()> {
        let mut v = Violations::new();
        v.require_chars("reason", &self.reason, REASON_MIN, REASON_MAX);
        require_credentials(&mut v, &self.actor, &self.auth_token, &self.idempotency_key);
        v.into_result()
    }
}

impl ReprioritizeRequest {
    pub fn validate(&self) -> Result<()> {
        let mut v = Violations::new();
        v.require_match("task_id", &self.task_id, &TASK_ID_RE, "TASK-###");
        if crate::domain::TaskPriority::parse(&self.priority).is_none() {
            v.push("priority must be one of P0, P1, P2, P3");
        }
        v.require_chars("reason", &self.reason, REASON_MIN, REASON_MAX);
        require_credentials(&mut v, &self.actor, &self.auth_token, &self.idempotency_key);
        v.into_result()
    }
}

impl MessageRequest {
    pub fn validate(&self) -> Result<()> {
        let mut v = Violations::new();
        v.require_nonempty("to", &self.to);
        v.require_chars("text", &self.text, 1, MESSAGE_TEXT_MAX);
        if let Some(task_id) = &self.task_id {
            v.require_match("task_id", task_id, &TASK_ID_RE, "TASK-###");
        }
        if self.complete_task {
            if self.task_id.is_none() {
                v.push("task_id is required when complete_task is set");
            }
            if self.proof_uri.is_none() {
                v.push("proof_uri is required when complete_task is set");
            }
            if self.proof_sha256.is_none() {
                v.push("proof_sha256 is required when complete_task is set");
            }
            if let Some(uri) = &self.proof_uri
                && !(uri.starts_with("file://") || uri.starts_with("https://"))
            {
                v.push("proof_uri must use file:// or https://");
            }
            if let Some(digest) = &self.proof_sha256
                && !SHA256_RE.is_match(digest)
            {
                v.push("proof_sha256 must be lowercase 64-hex");
            }
        }
        require_credentials(&mut v, &self.actor, &self.auth_token, &self.idempotency_key);
        v.into_result()
    }
}

impl QaRequest {
    pub fn validate(&self) -> Result<()> {
        let mut v = Violations::new();
        if !matches!(self.result.as_str(), "pass" | "fail") {
            v.push("result must be pass or fail");
        }
        v.require_chars("summary", &self.summary, SUMMARY_MIN, SUMMARY_MAX);
        if let Some(signature) = &self.failure_signature {
            v.require_chars("failure_signature", signature, SIGNATURE_MIN, SIGNATURE_MAX);
        }
        require_credentials(&mut v, &self.actor, &self.auth_token, &self.idempotency_key);
        v.into_result()
    }
}

impl ReviewRequest {
    pub fn validate(&self) -> Result<()> {
        let mut v = Violations::new();
        if crate::domain::ReviewerRole::parse(&self.reviewer).is_none() {
            v.push("reviewer must be architect, security or code");
        }
        if !matches!(self.decision.as_str(), "approve" | "reject") {
            v.push("decision must be approve or reject");
        }
        v.require_chars("summary", &self.summary, SUMMARY_MIN, SUMMARY_MAX);
        require_credentials(&mut v, &self.actor, &self.auth_token, &self.idempotency_key);
        v.into_result()
    }
}

struct GoalRule {
    pattern: &'static str,
    reason: &'static str,
}

const DISALLOWED_GOAL_RULES: &[GoalRule] = &[
    GoalRule {
        pattern: r"(?i)\b(?:malware|ransomware|spyware|botnet)\b",
        reason: "malware operations are not allowed",
    },
    GoalRule {
        pattern: r"(?i)\b(?:phishing|credential\s*steal(?:er|ing)?|account\s*takeover)\b",
        reason: "credential abuse is not allowed",
    },
    GoalRule {
        pattern: r"(?i)\b(?:ddos|denial[-\s]?of[-\s]?service)\b",
        reason: "service disruption attacks are not allowed",
    },
    GoalRule {
        pattern: r"(?i)\b(?:exploit|zero[-\s]?day)\b",
        reason: "offensive exploitation goals are not allowed",
    },
    GoalRule {
        pattern: r"(?i)\b(?:fraud|money\s*launder|stolen\s*card)\b",
        reason: "financial abuse is not allowed",
    },
];

static GOAL_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    DISALLOWED_GOAL_RULES
        .iter()
        .map(|rule| (Regex::new(rule.pattern).unwrap(), rule.reason))
        .collect()
});

/// Deny-list screen for abusive startup goals. Rejection is a contract
/// error carrying the matched policy reason.
pub fn enforce_goal_policy(goal: &str) -> Result<()> {
    for (pattern, reason) in GOAL_RULES.iter() {
        if pattern.is_match(goal) {
            return Err(OfficeError::contract(
                format!("Startup goal rejected by policy: {}", reason),
                Some(json!({ "policy": "goal-safety", "reason": reason })),
            ));
        }
    }
    Ok(())
}
