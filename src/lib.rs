//! Factotum - Task Orchestration & Resumption Engine
//!
//! Factotum carries out multi-step business actions (send an email,
//! wait for the reply, then create a calendar event) that span multiple
//! external round-trips and may take hours or days. Requests are
//! classified and decomposed into ordered steps; a step that fires a
//! resolve-later action suspends its task on a wait descriptor, and an
//! inbound webhook event is later matched back onto the correct waiting
//! task(s) to resume execution.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, the task state machine, error
//!   taxonomy, and port traits
//! - **Service Layer** (`services`): task lifecycle, workflow engine,
//!   event matching
//! - **Adapters** (`adapters`): SQLite persistence, the Anthropic
//!   reasoning oracle, scripted test doubles
//! - **Infrastructure** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): operator inspection commands
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use factotum::adapters::sqlite::{create_migrated_test_pool, SqliteTaskRepository};
//! use factotum::services::{EventMatcher, TaskLifecycle, WorkflowEngine};
//!
//! # async fn run(executor: Arc<impl factotum::domain::ports::ToolExecutor>,
//! #              oracle: Arc<impl factotum::domain::ports::ReasoningOracle>) -> anyhow::Result<()> {
//! let pool = create_migrated_test_pool().await?;
//! let repo = Arc::new(SqliteTaskRepository::new(pool));
//! let lifecycle = Arc::new(TaskLifecycle::new(repo));
//! let engine = Arc::new(WorkflowEngine::new(lifecycle.clone(), executor, oracle));
//! let matcher = EventMatcher::new(lifecycle, engine);
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Config, EventCategory, InboundEvent, Task, TaskPriority, TaskStatus, TaskType, WaitDescriptor,
    WaitingFor, WorkflowState,
};
pub use domain::ports::{
    ReasoningOracle, TaskFilter, TaskRepository, ToolExecutor, ToolOutcome, ToolRequest,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    EngineResponse, EventMatchOutcome, EventMatcher, MatchStrategy, ResumptionOutcome,
    TaskLifecycle, WorkflowEngine,
};
