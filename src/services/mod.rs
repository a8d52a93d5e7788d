//! Business logic services.
//!
//! All task mutations flow through the `TaskLifecycle` service; the
//! `WorkflowEngine` drives step execution and the `EventMatcher` maps
//! inbound webhook events onto waiting tasks.

pub mod classifier;
pub mod event_matcher;
pub mod task_lifecycle;
pub mod workflow_engine;

pub use classifier::{ActionFamily, Classification};
pub use event_matcher::{EventMatchOutcome, EventMatcher, MatchStrategy, ResumptionOutcome};
pub use task_lifecycle::{CreateOptions, TaskLifecycle, TaskPatch};
pub use workflow_engine::{EngineResponse, WorkflowEngine};
