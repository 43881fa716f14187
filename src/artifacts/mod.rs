pub mod gate;
pub mod service;
pub mod verifier;

pub use gate::{can_complete_run, can_mark_task_done};
pub use service::{ProofClaim, create_and_verify_proof};
pub use verifier::{Verdict, verify_claim};
