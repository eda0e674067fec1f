//! Docker Compose orchestration
//!
//! Every example runs in its own compose project: the resolver picks the
//! compose file, the project builds the compose invocations and the
//! orchestrator drives a run from preparation to teardown.

pub mod orchestrator;
pub mod project;
pub mod resolver;

pub use orchestrator::{
    CancelReason, RunMode, RunOrchestrator, RunOutcome, RunPhase, RunRequest,
};
pub use project::ComposeProject;
pub use resolver::resolve;
