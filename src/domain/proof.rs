use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofStatus {
    Pending,
    Verified,
    Rejected,
}

/// Why a proof verified or was rejected. `E_NONE` is reserved for the
/// verified outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofReason {
    #[serde(rename = "E_NONE")]
    None,
    #[serde(rename = "E_HASH_MISMATCH")]
    HashMismatch,
    #[serde(rename = "E_FILE_NOT_FOUND")]
    FileNotFound,
    #[serde(rename = "E_FILE_TOO_LARGE")]
    FileTooLarge,
    #[serde(rename = "E_FILE_OUTSIDE_ARTIFACTS")]
    FileOutsideArtifacts,
    #[serde(rename = "E_HTTP_STATUS")]
    HttpStatus,
    #[serde(rename = "E_HTTP_TOO_LARGE")]
    HttpTooLarge,
    #[serde(rename = "E_HOST_NOT_ALLOWED")]
    HostNotAllowed,
    #[serde(rename = "E_HTTP_TIMEOUT")]
    HttpTimeout,
    #[serde(rename = "E_HTTP_REDIRECT")]
    HttpRedirect,
    #[serde(rename = "E_INVALID_URI")]
    InvalidUri,
    #[serde(rename = "E_NETWORK_ERROR")]
    NetworkError,
}

impl ProofReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "E_NONE",
            Self::HashMismatch => "E_HASH_MISMATCH",
            Self::FileNotFound => "E_FILE_NOT_FOUND",
            Self::FileTooLarge => "E_FILE_TOO_LARGE",
            Self::FileOutsideArtifacts => "E_FILE_OUTSIDE_ARTIFACTS",
            Self::HttpStatus => "E_HTTP_STATUS",
            Self::HttpTooLarge => "E_HTTP_TOO_LARGE",
            Self::HostNotAllowed => "E_HOST_NOT_ALLOWED",
            Self::HttpTimeout => "E_HTTP_TIMEOUT",
            Self::HttpRedirect => "E_HTTP_REDIRECT",
            Self::InvalidUri => "E_INVALID_URI",
            Self::NetworkError => "E_NETWORK_ERROR",
        }
    }
}

impl fmt::Display for ProofReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofVerification {
    pub status: ProofStatus,
    pub reason_code: ProofReason,
    pub verified_at: DateTime<Utc>,
}

impl ProofVerification {
    /// `verified => E_NONE`, `rejected => != E_NONE`. Construction is the
    /// only place this pairing is decided, so stored proofs cannot drift.
    pub fn verified(at: DateTime<Utc>) -> Self {
        Self {
            status: ProofStatus::Verified,
            reason_code: ProofReason::None,
            verified_at: at,
        }
    }

    pub fn rejected(reason: ProofReason, at: DateTime<Utc>) -> Self {
        debug_assert!(reason != ProofReason::None);
        Self {
            status: ProofStatus::Rejected,
            reason_code: reason,
            verified_at: at,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.status == ProofStatus::Verified
    }
}

/// Append-only claim that a task artifact exists and matches a content
/// hash. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactProof {
    pub proof_id: String,
    pub task_id: String,
    pub uri: String,
    pub sha256: String,
    pub verification: ProofVerification,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
