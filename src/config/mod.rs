mod paths;
mod settings;

pub use paths::ProjectPaths;
pub use settings::{
    AuthGate, DEFAULT_PROOF_TIMEOUT_MS, EnvTokenResolver, MAX_PROOF_BYTES, OfficeConfig,
    ProofPolicy, ProofPolicySettings, RateLimitSettings, TokenResolver,
};
