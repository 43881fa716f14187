pub mod autopilot;
pub mod engine;
pub mod idempotency;
pub mod lifecycle;
pub mod planner;
pub mod rate_limit;
pub mod requests;
pub mod scheduler;

pub use engine::{CommandProcessor, MAX_RUN_DURATION_MINUTES};
pub use lifecycle::{
    InitializedRun, evaluate_progress, initialize_run, resume_target, transition_run,
};
pub use requests::{
    CommandRequest, MessageRequest, QaRequest, ReasonedRequest, ReprioritizeRequest,
    ReviewRequest, StartRequest, StatusRequest,
};
