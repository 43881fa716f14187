pub mod artifacts;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod orchestrator;
pub mod snapshot;
pub mod store;
pub mod utils;

pub use config::{AuthGate, OfficeConfig, ProjectPaths, TokenResolver};
pub use domain::{CommandKind, Run, RunStatus, Task, TaskPriority, TaskStatus};
pub use error::{ErrorCode, OfficeError, Result};
pub use orchestrator::{CommandProcessor, CommandRequest};
pub use snapshot::{OfficeSnapshot, build_snapshot};
pub use store::Store;
