//! Per-actor, per-command sliding-hour counters backed by the store.
//! Read-modify-write with no locking of its own: counters only need to
//! be eventually consistent under the outer run-level locks held by the
//! true mutation paths.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use crate::error::{OfficeError, Result};
use crate::store::Store;

pub const AUTH_FAILURE_LIMIT_PER_HOUR: u32 = 12;

/// Consume one unit from the (actor, bucket) counter, pruning entries
/// older than the rolling hour first. Exceeding the limit fails without
/// recording the attempt.
pub async fn check_and_consume(
    store: &Store,
    actor: &str,
    bucket: &str,
    limit_per_hour: u32,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut state = store.read_rate_limits().await?;

    let window_start = now - Duration::hours(1);
    let actor_state = state.entry(actor.to_string()).or_default();
    let events = actor_state.entry(bucket.to_string()).or_default();
    events.retain(|ts| *ts >= window_start);

    if events.len() >= limit_per_hour as usize {
        return Err(OfficeError::rate_limited(
            "Mutating command rate limit exceeded",
            Some(json!({ "actor": actor, "command": bucket })),
        ));
    }
    events.push(now);

    store.write_rate_limits(&state).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectPaths;
    use crate::error::ErrorCode;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_limit_is_enforced_within_window() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(ProjectPaths::new(dir.path()));
        store.init().await.unwrap();
        let now = Utc::now();

        for _ in 0..3 {
            check_and_consume(&store, "investor-1", "stop", 3, now)
                .await
                .unwrap();
        }
        let err = check_and_consume(&store, "investor-1", "stop", 3, now)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::RateLimitExceeded);
    }

    #[tokio::test]
    async fn test_entries_outside_window_are_pruned() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(ProjectPaths::new(dir.path()));
        store.init().await.unwrap();
        let earlier = Utc::now() - Duration::minutes(90);

        for _ in 0..3 {
            check_and_consume(&store, "investor-1", "stop", 3, earlier)
                .await
                .unwrap();
        }
        // The old entries fall out of the rolling hour, so a fresh call
        // succeeds.
        check_and_consume(&store, "investor-1", "stop", 3, Utc::now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_buckets_are_independent() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(ProjectPaths::new(dir.path()));
        store.init().await.unwrap();
        let now = Utc::now();

        for _ in 0..3 {
            check_and_consume(&store, "investor-1", "stop", 3, now)
                .await
                .unwrap();
        }
        check_and_consume(&store, "investor-1", "pause", 3, now)
            .await
            .unwrap();
        check_and_consume(&store, "ceo-001", "stop", 3, now)
            .await
            .unwrap();
    }
}
