use serde_json::{Value, json};
use thiserror::Error;

/// Stable error codes shared with callers. Each maps to one process exit
/// code so scripted clients can branch without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "E_USAGE")]
    Usage,
    #[serde(rename = "E_CONTRACT_VALIDATION")]
    ContractValidation,
    #[serde(rename = "E_UNAUTHORIZED_ACTOR")]
    UnauthorizedActor,
    #[serde(rename = "E_RATE_LIMIT_EXCEEDED")]
    RateLimitExceeded,
    #[serde(rename = "E_IDEMPOTENCY_CONFLICT")]
    IdempotencyConflict,
    #[serde(rename = "E_INVALID_TRANSITION")]
    InvalidTransition,
    #[serde(rename = "E_ACTIVE_RUN_LOCK")]
    ActiveRunLock,
    #[serde(rename = "E_STORAGE_IO")]
    StorageIo,
    #[serde(rename = "E_ARTIFACT_VERIFICATION_FAILED")]
    ArtifactVerificationFailed,
    #[serde(rename = "E_INTERNAL")]
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usage => "E_USAGE",
            Self::ContractValidation => "E_CONTRACT_VALIDATION",
            Self::UnauthorizedActor => "E_UNAUTHORIZED_ACTOR",
            Self::RateLimitExceeded => "E_RATE_LIMIT_EXCEEDED",
            Self::IdempotencyConflict => "E_IDEMPOTENCY_CONFLICT",
            Self::InvalidTransition => "E_INVALID_TRANSITION",
            Self::ActiveRunLock => "E_ACTIVE_RUN_LOCK",
            Self::StorageIo => "E_STORAGE_IO",
            Self::ArtifactVerificationFailed => "E_ARTIFACT_VERIFICATION_FAILED",
            Self::Internal => "E_INTERNAL",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Usage => 2,
            Self::ContractValidation => 3,
            Self::UnauthorizedActor => 4,
            Self::RateLimitExceeded => 5,
            Self::IdempotencyConflict => 6,
            Self::InvalidTransition => 7,
            Self::ActiveRunLock => 8,
            Self::StorageIo => 9,
            Self::ArtifactVerificationFailed => 10,
            Self::Internal => 11,
        }
    }
}

const INTERNAL_MESSAGE: &str = "Internal error";

#[derive(Error, Debug)]
pub enum OfficeError {
    #[error("{message}")]
    Usage { message: String },

    #[error("{message}")]
    ContractValidation {
        message: String,
        details: Option<Value>,
    },

    #[error("{message}")]
    UnauthorizedActor {
        message: String,
        details: Option<Value>,
    },

    #[error("{message}")]
    RateLimitExceeded {
        message: String,
        details: Option<Value>,
    },

    #[error("{message}")]
    IdempotencyConflict {
        message: String,
        details: Option<Value>,
    },

    #[error("{message}")]
    InvalidTransition {
        message: String,
        details: Option<Value>,
    },

    #[error("{message}")]
    ActiveRunLock {
        message: String,
        details: Option<Value>,
    },

    #[error("{message}")]
    StorageIo {
        message: String,
        details: Option<Value>,
    },

    #[error("{message}")]
    ArtifactVerificationFailed {
        message: String,
        details: Option<Value>,
    },

    /// Catch-all. The inner text stays in logs; the caller-facing payload
    /// is scrubbed to a fixed message with no details.
    #[error("Internal error")]
    Internal(String),
}

impl OfficeError {
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    pub fn contract(message: impl Into<String>, details: Option<Value>) -> Self {
        Self::ContractValidation {
            message: message.into(),
            details,
        }
    }

    pub fn unauthorized(message: impl Into<String>, details: Option<Value>) -> Self {
        Self::UnauthorizedActor {
            message: message.into(),
            details,
        }
    }

    pub fn rate_limited(message: impl Into<String>, details: Option<Value>) -> Self {
        Self::RateLimitExceeded {
            message: message.into(),
            details,
        }
    }

    pub fn idempotency_conflict(message: impl Into<String>, details: Option<Value>) -> Self {
        Self::IdempotencyConflict {
            message: message.into(),
            details,
        }
    }

    pub fn invalid_transition(message: impl Into<String>, details: Option<Value>) -> Self {
        Self::InvalidTransition {
            message: message.into(),
            details,
        }
    }

    pub fn active_run_lock(message: impl Into<String>, details: Option<Value>) -> Self {
        Self::ActiveRunLock {
            message: message.into(),
            details,
        }
    }

    pub fn storage(message: impl Into<String>, details: Option<Value>) -> Self {
        Self::StorageIo {
            message: message.into(),
            details,
        }
    }

    pub fn artifact(message: impl Into<String>, details: Option<Value>) -> Self {
        Self::ArtifactVerificationFailed {
            message: message.into(),
            details,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Usage { .. } => ErrorCode::Usage,
            Self::ContractValidation { .. } => ErrorCode::ContractValidation,
            Self::UnauthorizedActor { .. } => ErrorCode::UnauthorizedActor,
            Self::RateLimitExceeded { .. } => ErrorCode::RateLimitExceeded,
            Self::IdempotencyConflict { .. } => ErrorCode::IdempotencyConflict,
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::ActiveRunLock { .. } => ErrorCode::ActiveRunLock,
            Self::StorageIo { .. } => ErrorCode::StorageIo,
            Self::ArtifactVerificationFailed { .. } => ErrorCode::ArtifactVerificationFailed,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.code().exit_code()
    }

    fn details(&self) -> Option<&Value> {
        match self {
            Self::Usage { .. } | Self::Internal(_) => None,
            Self::ContractValidation { details, .. }
            | Self::UnauthorizedActor { details, .. }
            | Self::RateLimitExceeded { details, .. }
            | Self::IdempotencyConflict { details, .. }
            | Self::InvalidTransition { details, .. }
            | Self::ActiveRunLock { details, .. }
            | Self::StorageIo { details, .. }
            | Self::ArtifactVerificationFailed { details, .. } => details.as_ref(),
        }
    }

    /// Caller-facing `{ok:false, error:{...}}` document. Internal errors
    /// carry only the fixed message.
    pub fn payload(&self) -> Value {
        let message = match self {
            Self::Internal(_) => INTERNAL_MESSAGE.to_string(),
            other => other.to_string(),
        };
        let mut error = json!({
            "code": self.code().as_str(),
            "message": message,
        });
        if let Some(details) = self.details() {
            error["details"] = details.clone();
        }
        json!({ "ok": false, "error": error })
    }
}

impl From<std::io::Error> for OfficeError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageIo {
            message: "Storage I/O error".to_string(),
            details: Some(json!({ "reason": err.kind().to_string() })),
        }
    }
}

pub type Result<T> = std::result::Result<T, OfficeError>;
