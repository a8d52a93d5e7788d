//! Port trait definitions (Hexagonal Architecture)
//!
//! Async trait interfaces that infrastructure adapters implement:
//! - TaskRepository: task persistence and queries
//! - ToolExecutor: single named external actions
//! - ReasoningOracle: natural-language classification and generation

pub mod reasoning_oracle;
pub mod task_repository;
pub mod tool_executor;

pub use reasoning_oracle::ReasoningOracle;
pub use task_repository::{TaskFilter, TaskRepository};
pub use tool_executor::{ToolExecutor, ToolOutcome, ToolRequest};
