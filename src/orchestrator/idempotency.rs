//! Idempotency ledger: each client-supplied key binds one logical
//! mutation attempt to one stored response. Replays return the stored
//! response verbatim; reusing a key with a different payload is a
//! conflict.

use serde_json::{Value, json};

use crate::error::{OfficeError, Result};
use crate::store::{IdempotencyMap, IdempotencyRecord, Store};
use crate::utils::payload_hash;

pub enum IdempotencyCheck {
    /// Key unseen for this run: proceed with the mutation, then commit.
    Proceed {
        map: IdempotencyMap,
        payload_hash: String,
    },
    /// Key already bound to this exact payload: short-circuit with the
    /// stored response.
    Replay { response: Value },
}

pub async fn ensure_idempotent(
    store: &Store,
    run_id: &str,
    key: &str,
    payload: &Value,
) -> Result<IdempotencyCheck> {
    let map = store.read_idempotency(run_id).await?;
    let hash = payload_hash(payload);

    match map.get(key) {
        None => Ok(IdempotencyCheck::Proceed {
            map,
            payload_hash: hash,
        }),
        Some(record) if record.payload_hash == hash => Ok(IdempotencyCheck::Replay {
            response: record.response.clone(),
        }),
        Some(_) => Err(OfficeError::idempotency_conflict(
            "Idempotency key is already bound to a different payload",
            Some(json!({ "run_id": run_id, "idempotency_key": key })),
        )),
    }
}

/// Persist the (key -> payload hash, response) binding. Committed last in
/// the pipeline so a replayed key always returns a response that was
/// actually produced.
pub async fn commit_idempotent(
    store: &Store,
    run_id: &str,
    key: &str,
    payload_hash: String,
    response: &Value,
    mut map: IdempotencyMap,
) -> Result<()> {
    map.insert(
        key.to_string(),
        IdempotencyRecord {
            payload_hash,
            response: response.clone(),
        },
    );
    store.write_idempotency(run_id, &map).await
}
