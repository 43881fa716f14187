//! Field contracts for request payloads. Values are checked through a
//! violation-aggregating collector so a caller sees every problem at
//! once, and no invalid value flows past the request boundary.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;

use crate::error::{OfficeError, Result};

pub static RUN_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^run_[0-9]{8}T[0-9]{6}Z_[a-z0-9]{6}$").unwrap());
pub static TASK_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^TASK-[0-9]{3}$").unwrap());
pub static PROOF_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^PRF-[0-9]{3,}$").unwrap());
pub static SHA256_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-f0-9]{64}$").unwrap());
pub static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z_][A-Z0-9_]*$").unwrap());

pub const GOAL_MIN: usize = 10;
pub const GOAL_MAX: usize = 280;
pub const REASON_MIN: usize = 3;
pub const REASON_MAX: usize = 280;
pub const SUMMARY_MIN: usize = 3;
pub const SUMMARY_MAX: usize = 280;
pub const SIGNATURE_MIN: usize = 3;
pub const SIGNATURE_MAX: usize = 160;
pub const MESSAGE_TEXT_MAX: usize = 500;

#[derive(Debug, Default)]
pub struct Violations {
    issues: Vec<String>,
}

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: impl Into<String>) {
        self.issues.push(issue.into());
    }

    pub fn require_nonempty(&mut self, field: &str, value: &str) {
        if value.is_empty() {
            self.push(format!("{} must not be empty", field));
        }
    }

    pub fn require_chars(&mut self, field: &str, value: &str, min: usize, max: usize) {
        let len = value.chars().count();
        if len < min || len > max {
            self.push(format!(
                "{} must be {}..={} characters, got {}",
                field, min, max, len
            ));
        }
    }

    pub fn require_match(&mut self, field: &str, value: &str, pattern: &Regex, expected: &str) {
        if !pattern.is_match(value) {
            self.push(format!("{} must match {}", field, expected));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    /// Collapse into one contract-validation error listing every issue.
    pub fn into_result(self) -> Result<()> {
        if self.issues.is_empty() {
            return Ok(());
        }
        let message = self.issues.join("; ");
        Err(OfficeError::contract(
            message,
            Some(json!({ "violations": self.issues })),
        ))
    }
}
