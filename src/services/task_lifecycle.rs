//! Task lifecycle management.
//!
//! Every task mutation in the system goes through this service so that
//! the state machine, the waiting invariant, retry budgets, and
//! `last_activity_at` stamping are enforced in one place. Writes are
//! atomic read-modify-write cycles against the repository's optimistic
//! version check; a lost race surfaces as `ConcurrencyConflict` (or
//! `NotWaiting` on the resume path, where the race has a meaning).

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Task, TaskPriority, TaskStatus, TaskType, WaitDescriptor, WaitingFor, WorkflowState,
};
use crate::domain::ports::TaskRepository;

/// Optional fields accepted at task creation.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<TaskPriority>,
    pub parent_task_id: Option<Uuid>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub max_retries: Option<u32>,
}

/// Field patch applied alongside a status change (or on its own via
/// `record_progress`). Absent fields are left untouched;
/// `completed_steps` are appended, never replaced.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub next_step: Option<String>,
    pub workflow_state: Option<WorkflowState>,
    pub failure_reason: Option<String>,
    pub completed_steps: Vec<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl TaskPatch {
    pub fn with_workflow_state(mut self, state: WorkflowState) -> Self {
        self.workflow_state = Some(state);
        self
    }

    pub fn with_next_step(mut self, step: impl Into<String>) -> Self {
        self.next_step = Some(step.into());
        self
    }

    pub fn with_failure_reason(mut self, reason: impl Into<String>) -> Self {
        self.failure_reason = Some(reason.into());
        self
    }

    pub fn with_completed_step(mut self, step_id: impl Into<String>) -> Self {
        self.completed_steps.push(step_id.into());
        self
    }
}

pub struct TaskLifecycle<R: TaskRepository> {
    repo: Arc<R>,
    default_max_retries: u32,
}

impl<R: TaskRepository> TaskLifecycle<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self {
            repo,
            default_max_retries: 3,
        }
    }

    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    /// Create a new pending task for a user request.
    ///
    /// Fails with `Validation` when required fields are missing or the
    /// parent task does not exist.
    pub async fn create(
        &self,
        user_id: &str,
        original_request: &str,
        task_type: TaskType,
        options: CreateOptions,
    ) -> DomainResult<Task> {
        let mut task = Task::new(user_id, original_request, task_type)
            .with_max_retries(options.max_retries.unwrap_or(self.default_max_retries));

        if let Some(title) = options.title {
            task = task.with_title(title);
        }
        if let Some(description) = options.description {
            task = task.with_description(description);
        }
        if let Some(priority) = options.priority {
            task = task.with_priority(priority);
        }
        if let Some(scheduled_for) = options.scheduled_for {
            task = task.with_scheduled_for(scheduled_for);
        }
        if let Some(parent_id) = options.parent_task_id {
            self.require(parent_id).await?;
            task = task.with_parent(parent_id);
        }

        task.validate().map_err(DomainError::Validation)?;
        self.repo.insert(&task).await?;

        tracing::info!(
            task_id = %task.id,
            user_id = %task.user_id,
            task_type = task.task_type.as_str(),
            "Task created"
        );
        Ok(task)
    }

    /// Fetch a task, failing with `TaskNotFound` when absent.
    pub async fn require(&self, task_id: Uuid) -> DomainResult<Task> {
        self.repo
            .get(task_id)
            .await?
            .ok_or(DomainError::TaskNotFound(task_id))
    }

    pub async fn get(&self, task_id: Uuid) -> DomainResult<Option<Task>> {
        self.repo.get(task_id).await
    }

    /// Apply a status change plus a field patch in one atomic write.
    ///
    /// Stamps `completed_at` / `failed_at` exactly once and clears the
    /// wait descriptor when the task leaves `WaitingForResponse`. When
    /// the new status is terminal, completion is propagated to the
    /// parent task if all siblings are settled.
    pub async fn transition(
        &self,
        task_id: Uuid,
        new_status: TaskStatus,
        patch: TaskPatch,
    ) -> DomainResult<Task> {
        let mut task = self.require(task_id).await?;
        let expected_version = task.version;

        if !task.can_transition_to(new_status) {
            return Err(DomainError::InvalidTransition {
                from: task.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
            });
        }
        if new_status == TaskStatus::WaitingForResponse {
            // Suspension carries a wait descriptor; that path is
            // mark_waiting, never a bare transition.
            return Err(DomainError::Validation(
                "use mark_waiting to suspend a task".to_string(),
            ));
        }

        Self::apply_patch(&mut task, patch);
        task.transition_to(new_status)
            .map_err(DomainError::Validation)?;

        task.waiting_for = None;
        task.waiting_for_data = None;
        if task.is_terminal() {
            task.next_step = None;
        }

        self.repo.update_checked(&task, expected_version).await?;

        tracing::info!(
            task_id = %task.id,
            status = new_status.as_str(),
            "Task transitioned"
        );

        if task.is_terminal() {
            if let Some(parent_id) = task.parent_task_id {
                self.propagate_parent_completion(parent_id).await?;
            }
        }

        Ok(task)
    }

    /// Patch task fields without a status change. Used by the workflow
    /// engine to record step progress mid-execution.
    pub async fn record_progress(&self, task_id: Uuid, patch: TaskPatch) -> DomainResult<Task> {
        let mut task = self.require(task_id).await?;
        let expected_version = task.version;

        if task.is_terminal() {
            return Err(DomainError::InvalidTransition {
                from: task.status.as_str().to_string(),
                to: task.status.as_str().to_string(),
            });
        }

        Self::apply_patch(&mut task, patch);
        task.touch();
        self.repo.update_checked(&task, expected_version).await?;
        Ok(task)
    }

    /// Suspend a task on an external wait.
    ///
    /// Any prior wait descriptor is cleared before the new one is
    /// written. Rejects descriptors with no identifying fields, since
    /// they could never be matched by an inbound event.
    pub async fn mark_waiting(
        &self,
        task_id: Uuid,
        waiting_for: WaitingFor,
        waiting_data: WaitDescriptor,
    ) -> DomainResult<Task> {
        if waiting_data.is_empty() {
            return Err(DomainError::Validation(
                "wait descriptor must carry at least one identifying field".to_string(),
            ));
        }

        let mut task = self.require(task_id).await?;
        let expected_version = task.version;

        task.waiting_for = None;
        task.waiting_for_data = None;

        if task.status == TaskStatus::WaitingForResponse {
            task.touch();
        } else {
            task.transition_to(TaskStatus::WaitingForResponse)
                .map_err(|_| DomainError::InvalidTransition {
                    from: task.status.as_str().to_string(),
                    to: TaskStatus::WaitingForResponse.as_str().to_string(),
                })?;
        }

        task.waiting_for = Some(waiting_for);
        task.waiting_for_data = Some(waiting_data);

        self.repo.update_checked(&task, expected_version).await?;

        tracing::info!(
            task_id = %task.id,
            waiting_for = waiting_for.as_str(),
            "Task suspended on external wait"
        );
        Ok(task)
    }

    /// Resume a waiting task with inbound event data.
    ///
    /// Only valid from `WaitingForResponse`. The event payload is merged
    /// into the workflow state's reserved `resume_event` slot and the
    /// wait descriptor is cleared. A concurrent second resume loses the
    /// version race, re-reads, and fails fast with `NotWaiting` rather
    /// than double-executing steps.
    pub async fn resume(
        &self,
        task_id: Uuid,
        event_data: serde_json::Value,
        new_status: TaskStatus,
    ) -> DomainResult<Task> {
        let mut task = self.require(task_id).await?;
        let expected_version = task.version;

        if task.status != TaskStatus::WaitingForResponse {
            return Err(DomainError::NotWaiting(task_id));
        }

        task.workflow_state.resume_event = Some(event_data);
        task.waiting_for = None;
        task.waiting_for_data = None;
        task.transition_to(new_status)
            .map_err(|_| DomainError::InvalidTransition {
                from: TaskStatus::WaitingForResponse.as_str().to_string(),
                to: new_status.as_str().to_string(),
            })?;

        match self.repo.update_checked(&task, expected_version).await {
            Ok(()) => {
                tracing::info!(task_id = %task.id, "Task resumed");
                Ok(task)
            }
            Err(DomainError::ConcurrencyConflict(_)) => {
                let current = self.require(task_id).await?;
                if current.status == TaskStatus::WaitingForResponse {
                    Err(DomainError::ConcurrencyConflict(task_id))
                } else {
                    Err(DomainError::NotWaiting(task_id))
                }
            }
            Err(other) => Err(other),
        }
    }

    /// Retry a failed task, resetting it to `Pending` for re-execution.
    ///
    /// Only valid from `Failed` and while the retry budget lasts. A
    /// subtask whose parent was cancelled cannot be reopened.
    pub async fn retry(&self, task_id: Uuid) -> DomainResult<Task> {
        let mut task = self.require(task_id).await?;
        let expected_version = task.version;

        if task.status != TaskStatus::Failed {
            return Err(DomainError::NotFailed(task_id));
        }
        if task.retry_count >= task.max_retries {
            return Err(DomainError::RetryExhausted {
                id: task_id,
                max_retries: task.max_retries,
            });
        }
        if let Some(parent_id) = task.parent_task_id {
            let parent = self.require(parent_id).await?;
            if parent.status == TaskStatus::Cancelled {
                return Err(DomainError::Validation(format!(
                    "cannot retry task {}: parent task was cancelled",
                    task_id
                )));
            }
        }

        task.retry().map_err(DomainError::Validation)?;
        self.repo.update_checked(&task, expected_version).await?;

        tracing::info!(
            task_id = %task.id,
            retry_count = task.retry_count,
            max_retries = task.max_retries,
            "Task reset for retry"
        );
        Ok(task)
    }

    /// Cancel a task and, recursively, every subtask that is still
    /// cancellable. Returns the ids of all tasks cancelled.
    pub async fn cancel(&self, task_id: Uuid, reason: &str) -> DomainResult<Vec<Uuid>> {
        let mut task = self.require(task_id).await?;
        let expected_version = task.version;

        if !task.can_transition_to(TaskStatus::Cancelled) {
            return Err(DomainError::InvalidTransition {
                from: task.status.as_str().to_string(),
                to: TaskStatus::Cancelled.as_str().to_string(),
            });
        }

        task.failure_reason = Some(reason.to_string());
        task.waiting_for = None;
        task.waiting_for_data = None;
        task.next_step = None;
        task.transition_to(TaskStatus::Cancelled)
            .map_err(DomainError::Validation)?;
        self.repo.update_checked(&task, expected_version).await?;

        tracing::info!(task_id = %task.id, reason, "Task cancelled");

        let mut cancelled = vec![task_id];
        for subtask in self.repo.subtasks(task_id).await? {
            if subtask.can_transition_to(TaskStatus::Cancelled) {
                let mut child_ids = Box::pin(self.cancel(subtask.id, reason)).await?;
                cancelled.append(&mut child_ids);
            }
        }

        if let Some(parent_id) = task.parent_task_id {
            self.propagate_parent_completion(parent_id).await?;
        }
        Ok(cancelled)
    }

    /// Non-terminal tasks for a user, newest first.
    pub async fn active_tasks(&self, user_id: &str) -> DomainResult<Vec<Task>> {
        self.repo.active_tasks(user_id).await
    }

    /// Waiting tasks for a user, optionally narrowed by wait kind,
    /// newest first.
    pub async fn waiting_tasks(
        &self,
        user_id: &str,
        waiting_for: Option<WaitingFor>,
    ) -> DomainResult<Vec<Task>> {
        self.repo.waiting_tasks(user_id, waiting_for).await
    }

    /// Non-terminal tasks whose `scheduled_for` lies before `now`. An
    /// operator signal for manual intervention; nothing times out
    /// automatically.
    pub async fn overdue_tasks(&self, user_id: &str, now: DateTime<Utc>) -> DomainResult<Vec<Task>> {
        self.repo.overdue_tasks(user_id, now).await
    }

    /// Per-status task counts for a user.
    pub async fn status_counts(&self, user_id: &str) -> DomainResult<HashMap<TaskStatus, u64>> {
        self.repo.count_by_status(user_id).await
    }

    pub async fn subtasks(&self, parent_task_id: Uuid) -> DomainResult<Vec<Task>> {
        self.repo.subtasks(parent_task_id).await
    }

    fn apply_patch(task: &mut Task, patch: TaskPatch) {
        if let Some(next_step) = patch.next_step {
            task.next_step = Some(next_step);
        }
        if let Some(state) = patch.workflow_state {
            task.workflow_state = state;
        }
        if let Some(reason) = patch.failure_reason {
            task.failure_reason = Some(reason);
        }
        if let Some(scheduled_for) = patch.scheduled_for {
            task.scheduled_for = Some(scheduled_for);
        }
        for step_id in patch.completed_steps {
            task.record_completed_step(step_id);
        }
    }

    /// Complete a parent once every subtask has reached a terminal
    /// state. A failed subtask keeps the parent open: it may still be
    /// retried.
    async fn propagate_parent_completion(&self, parent_id: Uuid) -> DomainResult<()> {
        let siblings = self.repo.subtasks(parent_id).await?;
        if siblings.is_empty() || !siblings.iter().all(Task::is_terminal) {
            return Ok(());
        }

        let parent = self.require(parent_id).await?;
        if parent.is_terminal() || !parent.can_transition_to(TaskStatus::Completed) {
            return Ok(());
        }

        tracing::info!(
            task_id = %parent_id,
            subtasks = siblings.len(),
            "All subtasks terminal; completing parent"
        );
        Box::pin(self.transition(parent_id, TaskStatus::Completed, TaskPatch::default())).await?;
        Ok(())
    }
}
