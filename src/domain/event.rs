use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Command,
    Internal,
}

/// Append-only log entry, one per accepted command. Observational only:
/// never read back for control decisions except to number the next entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub event_id: String,
    pub run_id: String,
    pub kind: EventKind,
    pub command: String,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
}

impl RunEvent {
    pub fn command_entry(
        event_id: String,
        run_id: &str,
        command: &str,
        actor: &str,
        timestamp: DateTime<Utc>,
        payload: Value,
    ) -> Self {
        Self {
            event_id,
            run_id: run_id.to_string(),
            kind: EventKind::Command,
            command: command.to_string(),
            actor: actor.to_string(),
            timestamp,
            payload,
        }
    }
}
