use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Task, TaskStatus, TaskType, WaitingFor};

/// Filters for querying tasks
#[derive(Default, Debug, Clone)]
pub struct TaskFilter {
    pub user_id: Option<String>,
    pub status: Option<TaskStatus>,
    pub task_type: Option<TaskType>,
    pub waiting_for: Option<WaitingFor>,
    pub parent_task_id: Option<Uuid>,
    pub limit: Option<i64>,
}

/// Repository port for task persistence operations.
///
/// `update_checked` is the single write path for mutations: it compares
/// the caller's pre-mutation version and fails with a concurrency
/// conflict when another writer got there first.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert a new task
    async fn insert(&self, task: &Task) -> DomainResult<()>;

    /// Get a task by ID
    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>>;

    /// Persist a mutated task; `expected_version` is the version the
    /// caller read before mutating. Fails with `ConcurrencyConflict`
    /// when the row moved on.
    async fn update_checked(&self, task: &Task, expected_version: u64) -> DomainResult<()>;

    /// Delete a task by ID
    async fn delete(&self, id: Uuid) -> DomainResult<()>;

    /// List tasks with optional filters, newest first
    async fn list(&self, filter: TaskFilter) -> DomainResult<Vec<Task>>;

    /// Non-terminal tasks for a user (pending, in progress, or
    /// waiting), newest first
    async fn active_tasks(&self, user_id: &str) -> DomainResult<Vec<Task>>;

    /// Waiting tasks for a user, optionally narrowed by wait kind,
    /// newest first
    async fn waiting_tasks(
        &self,
        user_id: &str,
        waiting_for: Option<WaitingFor>,
    ) -> DomainResult<Vec<Task>>;

    /// Non-terminal tasks whose scheduled_for lies in the past
    async fn overdue_tasks(&self, user_id: &str, now: DateTime<Utc>) -> DomainResult<Vec<Task>>;

    /// Direct subtasks of a parent
    async fn subtasks(&self, parent_task_id: Uuid) -> DomainResult<Vec<Task>>;

    /// Per-status counts for a user
    async fn count_by_status(&self, user_id: &str) -> DomainResult<HashMap<TaskStatus, u64>>;
}
