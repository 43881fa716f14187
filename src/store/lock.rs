//! Filesystem mutual exclusion: the process-wide active-run marker and
//! the short-lived per-run mutation lease. Both are create-if-absent
//! files with staleness eviction; waits are bounded loops with a fixed
//! backoff and an explicit deadline, never an open-ended spin.

use std::path::PathBuf;
use std::time::Duration;

use serde_json::json;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::ProjectPaths;
use crate::error::{OfficeError, Result};

use super::fs::{ensure_dir, path_exists};

pub const ACTIVE_LOCK_STALE: Duration = Duration::from_secs(60);
pub const MUTATION_LEASE_STALE: Duration = Duration::from_secs(30);
pub const MUTATION_LEASE_RETRY: Duration = Duration::from_millis(50);
pub const MUTATION_LEASE_DEADLINE: Duration = Duration::from_secs(5);

#[derive(Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired,
    /// Another invocation holds the marker; the holder's run id when the
    /// marker was readable.
    Held(Option<String>),
}

pub async fn read_active_run(paths: &ProjectPaths) -> Result<Option<String>> {
    if !path_exists(&paths.active_run_lock_file).await {
        return Ok(None);
    }
    let value = fs::read_to_string(&paths.active_run_lock_file).await?;
    let trimmed = value.trim();
    Ok(if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    })
}

/// Create-if-absent: exactly one of two racing starts observes creation
/// success; the loser gets `Held`.
pub async fn try_acquire_active_run(paths: &ProjectPaths, run_id: &str) -> Result<AcquireOutcome> {
    ensure_dir(&paths.locks_dir).await?;
    match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&paths.active_run_lock_file)
        .await
    {
        Ok(mut file) => {
            file.write_all(format!("{}\n", run_id).as_bytes()).await?;
            file.sync_all().await?;
            debug!(run_id, "active-run marker acquired");
            Ok(AcquireOutcome::Acquired)
        }
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            Ok(AcquireOutcome::Held(read_active_run(paths).await?))
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn release_active_run(paths: &ProjectPaths) -> Result<()> {
    match fs::remove_file(&paths.active_run_lock_file).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Age of the active-run marker, used to decide whether a marker that
/// names a missing run is a crashed startup (stale) or one in progress.
pub async fn active_run_marker_age(paths: &ProjectPaths) -> Result<Option<Duration>> {
    if !path_exists(&paths.active_run_lock_file).await {
        return Ok(None);
    }
    let meta = fs::metadata(&paths.active_run_lock_file).await?;
    let modified = meta.modified()?;
    Ok(Some(
        modified.elapsed().unwrap_or(Duration::ZERO),
    ))
}

/// Per-run lease around QA/review read-modify-write sequences. Held for
/// the duration of one command; a crashed holder is evicted after the
/// staleness horizon so future commands cannot deadlock.
pub struct MutationLease {
    path: PathBuf,
}

impl MutationLease {
    pub async fn acquire(paths: &ProjectPaths, run_id: &str) -> Result<Self> {
        let path = paths.mutation_lock_file(run_id);
        ensure_dir(&paths.run_dir(run_id)).await?;

        let deadline = tokio::time::Instant::now() + MUTATION_LEASE_DEADLINE;
        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => {
                    drop(file);
                    return Ok(Self { path });
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if let Ok(meta) = fs::metadata(&path).await
                        && let Ok(modified) = meta.modified()
                        && modified.elapsed().unwrap_or(Duration::ZERO) > MUTATION_LEASE_STALE
                    {
                        warn!(run_id, "evicting stale mutation lease");
                        let _ = fs::remove_file(&path).await;
                        continue;
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return Err(OfficeError::storage(
                            "Run mutation lock timeout",
                            Some(json!({ "run_id": run_id })),
                        ));
                    }
                    tokio::time::sleep(MUTATION_LEASE_RETRY).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub async fn release(self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn paths(dir: &TempDir) -> ProjectPaths {
        ProjectPaths::new(dir.path())
    }

    #[tokio::test]
    async fn test_active_run_exclusive_acquire() {
        let dir = TempDir::new().unwrap();
        let paths = paths(&dir);

        let first = try_acquire_active_run(&paths, "run_a").await.unwrap();
        assert_eq!(first, AcquireOutcome::Acquired);

        let second = try_acquire_active_run(&paths, "run_b").await.unwrap();
        assert_eq!(second, AcquireOutcome::Held(Some("run_a".to_string())));

        release_active_run(&paths).await.unwrap();
        assert_eq!(read_active_run(&paths).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_racing_acquires_have_one_winner() {
        let dir = TempDir::new().unwrap();
        let paths_a = paths(&dir);
        let paths_b = ProjectPaths::new(dir.path());

        let (a, b) = tokio::join!(
            try_acquire_active_run(&paths_a, "run_a"),
            try_acquire_active_run(&paths_b, "run_b"),
        );
        let outcomes = [a.unwrap(), b.unwrap()];
        let winners = outcomes
            .iter()
            .filter(|o| matches!(o, AcquireOutcome::Acquired))
            .count();
        assert_eq!(winners, 1, "exactly one racing start may win");
    }

    #[tokio::test]
    async fn test_mutation_lease_blocks_then_times_out() {
        let dir = TempDir::new().unwrap();
        let paths = paths(&dir);

        let lease = MutationLease::acquire(&paths, "run_a").await.unwrap();
        let started = std::time::Instant::now();
        let err = MutationLease::acquire(&paths, "run_a").await.unwrap_err();
        assert!(started.elapsed() >= MUTATION_LEASE_DEADLINE);
        assert_eq!(err.code(), crate::error::ErrorCode::StorageIo);
        lease.release().await.unwrap();

        let reacquired = MutationLease::acquire(&paths, "run_a").await.unwrap();
        reacquired.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let paths = paths(&dir);
        release_active_run(&paths).await.unwrap();
        let lease = MutationLease::acquire(&paths, "run_a").await.unwrap();
        tokio::fs::remove_file(paths.mutation_lock_file("run_a"))
            .await
            .unwrap();
        lease.release().await.unwrap();
    }
}
