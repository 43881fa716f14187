use std::path::{Path, PathBuf};

/// Every durable location the process touches, resolved once from the
/// workspace root. All cross-invocation coordination happens under
/// `data/`; artifacts submitted as proofs live under `artifacts/`.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub data_dir: PathBuf,
    pub runs_dir: PathBuf,
    pub locks_dir: PathBuf,
    pub snapshot_dir: PathBuf,
    pub state_dir: PathBuf,
    pub plans_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub config_file: PathBuf,
    pub run_index_file: PathBuf,
    pub rate_limit_file: PathBuf,
    pub active_run_lock_file: PathBuf,
    pub snapshot_file: PathBuf,
    pub autopilot_state_file: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let data_dir = root.join("data");
        let runs_dir = data_dir.join("runs");
        let locks_dir = data_dir.join("locks");
        let snapshot_dir = data_dir.join("snapshot");
        let state_dir = data_dir.join("state");
        let plans_dir = data_dir.join("plans");

        Self {
            run_index_file: runs_dir.join("index.json"),
            rate_limit_file: data_dir.join("rate-limits.json"),
            active_run_lock_file: locks_dir.join("active-run.lock"),
            snapshot_file: snapshot_dir.join("latest.json"),
            autopilot_state_file: state_dir.join("autopilot.json"),
            config_file: root.join("config").join("office.toml"),
            artifacts_dir: root.join("artifacts"),
            data_dir,
            runs_dir,
            locks_dir,
            snapshot_dir,
            state_dir,
            plans_dir,
            root,
        }
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.runs_dir.join(run_id)
    }

    pub fn run_file(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("run.json")
    }

    pub fn tasks_file(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("tasks.json")
    }

    pub fn events_file(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("events.ndjson")
    }

    pub fn proofs_dir(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("proofs")
    }

    pub fn proof_file(&self, run_id: &str, proof_id: &str) -> PathBuf {
        self.proofs_dir(run_id).join(format!("{}.json", proof_id))
    }

    pub fn idempotency_file(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("idempotency.json")
    }

    pub fn mutation_lock_file(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join(".mutation.lock")
    }

    pub fn plan_file(&self, run_id: &str, kind: &str) -> PathBuf {
        self.plans_dir.join(format!("{}-{}.md", run_id, kind))
    }
}

impl AsRef<Path> for ProjectPaths {
    fn as_ref(&self) -> &Path {
        &self.root
    }
}
