use std::fmt;

use serde::{Deserialize, Serialize};

/// Every externally-triggered command kind, including the `complete-task`
/// grant which is authorized separately from the `message` envelope that
/// carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandKind {
    Start,
    Status,
    Pause,
    Resume,
    Reprioritize,
    Message,
    CompleteTask,
    Qa,
    Review,
    Stop,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Status => "status",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Reprioritize => "reprioritize",
            Self::Message => "message",
            Self::CompleteTask => "complete-task",
            Self::Qa => "qa",
            Self::Review => "review",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
