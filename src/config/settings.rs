use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tokio::fs;

use crate::domain::{CommandKind, ReviewerRole, contract::ENV_VAR_RE};
use crate::error::{OfficeError, Result};

pub const MAX_PROOF_BYTES: u64 = 20 * 1024 * 1024;
pub const DEFAULT_PROOF_TIMEOUT_MS: u64 = 5_000;
const MAX_PROOF_TIMEOUT_MS: u64 = 60_000;

fn default_proof_timeout() -> u64 {
    DEFAULT_PROOF_TIMEOUT_MS
}

fn default_max_bytes() -> u64 {
    MAX_PROOF_BYTES
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitSettings {
    pub default_mutating: u32,
    pub stop: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            default_mutating: 6,
            stop: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProofPolicySettings {
    #[serde(default)]
    pub https_allowlist: Vec<String>,
    #[serde(default = "default_proof_timeout")]
    pub fetch_timeout_ms: u64,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
}

impl Default for ProofPolicySettings {
    fn default() -> Self {
        Self {
            https_allowlist: Vec::new(),
            fetch_timeout_ms: DEFAULT_PROOF_TIMEOUT_MS,
            max_bytes: MAX_PROOF_BYTES,
        }
    }
}

/// Static per-process authorization and policy config, loaded from
/// `config/office.toml`. Actor tokens may come from an environment
/// variable named in `actor_token_env`, which takes priority over the
/// inline `actor_tokens` value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OfficeConfig {
    pub mutating_actors: BTreeMap<String, Vec<CommandKind>>,
    #[serde(default)]
    pub actor_tokens: BTreeMap<String, String>,
    #[serde(default)]
    pub actor_token_env: BTreeMap<String, String>,
    #[serde(default)]
    pub reviewer_grants: BTreeMap<String, Vec<ReviewerRole>>,
    pub read_only_open: bool,
    #[serde(default)]
    pub rate_limits_per_hour: RateLimitSettings,
    #[serde(default)]
    pub proof_policy: ProofPolicySettings,
}

impl OfficeConfig {
    pub async fn load(config_file: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_file).await.map_err(|e| {
            OfficeError::storage(
                format!("Auth config could not be read: {}", config_file.display()),
                Some(serde_json::json!({ "reason": e.kind().to_string() })),
            )
        })?;
        let config: OfficeConfig = toml::from_str(&content)
            .map_err(|e| OfficeError::contract(format!("Invalid auth config: {}", e), None))?;
        config.validate()?;
        Ok(config)
    }

    /// Aggregate every config problem into one contract error rather than
    /// failing on the first.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        for actor in self.mutating_actors.keys() {
            let has_inline = self
                .actor_tokens
                .get(actor)
                .is_some_and(|t| !t.is_empty());
            let has_env = self.actor_token_env.contains_key(actor);
            if !has_inline && !has_env {
                errors.push(format!("token source is missing for actor {}", actor));
            }
        }
        for (actor, var) in &self.actor_token_env {
            if !ENV_VAR_RE.is_match(var) {
                errors.push(format!(
                    "token env var for actor {} must be uppercase snake_case",
                    actor
                ));
            }
        }
        if self.rate_limits_per_hour.default_mutating == 0 {
            errors.push("rate_limits_per_hour.default_mutating must be positive".to_string());
        }
        if self.rate_limits_per_hour.stop == 0 {
            errors.push("rate_limits_per_hour.stop must be positive".to_string());
        }
        if self.proof_policy.fetch_timeout_ms == 0
            || self.proof_policy.fetch_timeout_ms > MAX_PROOF_TIMEOUT_MS
        {
            errors.push(format!(
                "proof_policy.fetch_timeout_ms must be 1..={}",
                MAX_PROOF_TIMEOUT_MS
            ));
        }
        if self.proof_policy.max_bytes == 0 {
            errors.push("proof_policy.max_bytes must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(OfficeError::contract(
                format!("Invalid auth config: {}", errors.join("; ")),
                Some(serde_json::json!({ "violations": errors })),
            ))
        }
    }
}

/// Strategy for looking up a token named by `actor_token_env`. Production
/// uses the process environment; tests can inject a map.
pub trait TokenResolver: Send + Sync {
    fn resolve(&self, var_name: &str) -> Option<String>;
}

pub struct EnvTokenResolver;

impl TokenResolver for EnvTokenResolver {
    fn resolve(&self, var_name: &str) -> Option<String> {
        std::env::var(var_name).ok().filter(|v| !v.is_empty())
    }
}

/// Authorization decisions for (actor, command) pairs plus bearer-token
/// verification. Built once per invocation from the loaded config; the
/// resolver is the only path to ambient state.
pub struct AuthGate {
    config: OfficeConfig,
    resolver: Box<dyn TokenResolver>,
}

impl AuthGate {
    pub fn new(config: OfficeConfig, resolver: Box<dyn TokenResolver>) -> Self {
        Self { config, resolver }
    }

    pub fn with_env(config: OfficeConfig) -> Self {
        Self::new(config, Box::new(EnvTokenResolver))
    }

    pub fn config(&self) -> &OfficeConfig {
        &self.config
    }

    fn expected_token(&self, actor: &str) -> Option<String> {
        if let Some(var) = self.config.actor_token_env.get(actor)
            && let Some(token) = self.resolver.resolve(var)
        {
            return Some(token);
        }
        self.config
            .actor_tokens
            .get(actor)
            .filter(|t| !t.is_empty())
            .cloned()
    }

    pub fn is_actor_authorized(&self, actor: &str, command: CommandKind) -> bool {
        self.config
            .mutating_actors
            .get(actor)
            .is_some_and(|commands| commands.contains(&command))
    }

    /// Constant-time comparison on equal-length buffers; a length
    /// mismatch is an immediate rejection with the same code path shape.
    pub fn verify_token(&self, actor: &str, token: &str) -> bool {
        let Some(expected) = self.expected_token(actor) else {
            return false;
        };
        expected.as_bytes().ct_eq(token.as_bytes()).into()
    }

    pub fn status_open(&self) -> bool {
        self.config.read_only_open
    }

    /// The read-status policy is distinct from mutating authorization:
    /// any actor with a resolvable token may read.
    pub fn can_read_status(&self, actor: &str) -> bool {
        self.expected_token(actor).is_some()
    }

    pub fn can_approve_reviewer(&self, actor: &str, role: ReviewerRole) -> bool {
        self.config
            .reviewer_grants
            .get(actor)
            .is_some_and(|roles| roles.contains(&role))
    }

    pub fn per_hour_limit(&self, command: CommandKind) -> u32 {
        match command {
            CommandKind::Stop => self.config.rate_limits_per_hour.stop,
            _ => self.config.rate_limits_per_hour.default_mutating,
        }
    }

    pub fn proof_policy(&self, root: &Path) -> ProofPolicy {
        ProofPolicy {
            artifacts_dir: root.join("artifacts"),
            https_allowlist: self
                .config
                .proof_policy
                .https_allowlist
                .iter()
                .map(|h| h.to_lowercase())
                .collect(),
            fetch_timeout: Duration::from_millis(self.config.proof_policy.fetch_timeout_ms),
            max_bytes: self.config.proof_policy.max_bytes.min(MAX_PROOF_BYTES),
        }
    }
}

/// Resolved verification policy handed to the proof verifier.
#[derive(Debug, Clone)]
pub struct ProofPolicy {
    pub artifacts_dir: PathBuf,
    pub https_allowlist: Vec<String>,
    pub fetch_timeout: Duration,
    pub max_bytes: u64,
}
