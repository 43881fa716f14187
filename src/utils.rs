use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_lower(&hasher.finalize())
}

pub fn hex_lower(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for key in keys {
                out.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Key-sorted JSON serialization. Two requests that differ only in field
/// order hash identically, so idempotency replays never misfire on
/// serialization noise.
pub fn canonical_json(value: &Value) -> String {
    canonicalize(value).to_string()
}

pub fn payload_hash(value: &Value) -> String {
    sha256_hex(canonical_json(value).as_bytes())
}

/// Time-sortable run id: `run_<YYYYMMDDTHHMMSSZ>_<6 hex>`.
pub fn new_run_id(now: DateTime<Utc>) -> String {
    let stamp = now.format("%Y%m%dT%H%M%SZ");
    let entropy = Uuid::new_v4().simple().to_string();
    format!("run_{}_{}", stamp, &entropy[..6])
}

pub fn event_id(now: DateTime<Utc>, sequence: usize) -> String {
    format!("EVT-{}-{:04}", now.format("%Y%m%d%H%M%S"), sequence)
}

pub fn proof_id(existing_count: usize) -> String {
    format!("PRF-{:03}", existing_count + 1)
}
