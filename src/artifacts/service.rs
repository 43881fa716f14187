//! Creates and verifies a proof record in one step. Proofs are
//! append-only: the verification outcome is decided here once and never
//! mutated afterwards.

use chrono::Utc;

use crate::config::ProofPolicy;
use crate::domain::{ArtifactProof, ProofVerification};
use crate::error::Result;
use crate::store::Store;
use crate::utils::proof_id;

use super::verifier::verify_claim;

pub struct ProofClaim<'a> {
    pub run_id: &'a str,
    pub task_id: &'a str,
    pub uri: &'a str,
    pub sha256: &'a str,
}

pub async fn create_and_verify_proof(
    store: &Store,
    claim: ProofClaim<'_>,
    policy: &ProofPolicy,
) -> Result<ArtifactProof> {
    let existing = store.list_proofs(claim.run_id).await?;
    let proof_id = proof_id(existing.len());
    let now = Utc::now();

    let verdict = verify_claim(claim.uri, claim.sha256, policy).await;
    let verification = if verdict.is_verified() {
        ProofVerification::verified(now)
    } else {
        ProofVerification::rejected(verdict.reason, now)
    };

    let proof = ArtifactProof {
        proof_id,
        task_id: claim.task_id.to_string(),
        uri: claim.uri.to_string(),
        sha256: claim.sha256.to_string(),
        verification,
        created_at: now,
        updated_at: now,
    };

    store.write_proof(claim.run_id, &proof).await?;
    Ok(proof)
}
