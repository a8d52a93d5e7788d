//! SQLite implementation of the TaskRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Task, TaskPriority, TaskStatus, TaskType, WaitDescriptor, WaitingFor, WorkflowState,
};
use crate::domain::ports::{TaskFilter, TaskRepository};

use super::{parse_datetime, parse_optional_datetime, parse_optional_uuid, parse_uuid};

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn insert(&self, task: &Task) -> DomainResult<()> {
        let steps_json = serde_json::to_string(&task.steps_completed)?;
        let state_json = serde_json::to_string(&task.workflow_state)?;
        let waiting_data_json = task
            .waiting_for_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"INSERT INTO tasks (id, user_id, parent_task_id, task_type, title, description,
               original_request, priority, status, next_step, steps_completed, workflow_state,
               waiting_for, waiting_for_data, failure_reason, retry_count, max_retries,
               scheduled_for, completed_at, failed_at, last_activity_at, created_at, version)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(task.id.to_string())
        .bind(&task.user_id)
        .bind(task.parent_task_id.map(|id| id.to_string()))
        .bind(task.task_type.as_str())
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.original_request)
        .bind(task.priority.as_str())
        .bind(task.status.as_str())
        .bind(&task.next_step)
        .bind(&steps_json)
        .bind(&state_json)
        .bind(task.waiting_for.map(|w| w.as_str()))
        .bind(&waiting_data_json)
        .bind(&task.failure_reason)
        .bind(task.retry_count as i64)
        .bind(task.max_retries as i64)
        .bind(task.scheduled_for.map(|t| t.to_rfc3339()))
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .bind(task.failed_at.map(|t| t.to_rfc3339()))
        .bind(task.last_activity_at.to_rfc3339())
        .bind(task.created_at.to_rfc3339())
        .bind(task.version as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Task::try_from).transpose()
    }

    async fn update_checked(&self, task: &Task, expected_version: u64) -> DomainResult<()> {
        let steps_json = serde_json::to_string(&task.steps_completed)?;
        let state_json = serde_json::to_string(&task.workflow_state)?;
        let waiting_data_json = task
            .waiting_for_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            r#"UPDATE tasks SET parent_task_id = ?, task_type = ?, title = ?, description = ?,
               priority = ?, status = ?, next_step = ?, steps_completed = ?, workflow_state = ?,
               waiting_for = ?, waiting_for_data = ?, failure_reason = ?, retry_count = ?,
               max_retries = ?, scheduled_for = ?, completed_at = ?, failed_at = ?,
               last_activity_at = ?, version = ?
               WHERE id = ? AND version = ?"#,
        )
        .bind(task.parent_task_id.map(|id| id.to_string()))
        .bind(task.task_type.as_str())
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.priority.as_str())
        .bind(task.status.as_str())
        .bind(&task.next_step)
        .bind(&steps_json)
        .bind(&state_json)
        .bind(task.waiting_for.map(|w| w.as_str()))
        .bind(&waiting_data_json)
        .bind(&task.failure_reason)
        .bind(task.retry_count as i64)
        .bind(task.max_retries as i64)
        .bind(task.scheduled_for.map(|t| t.to_rfc3339()))
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .bind(task.failed_at.map(|t| t.to_rfc3339()))
        .bind(task.last_activity_at.to_rfc3339())
        .bind(task.version as i64)
        .bind(task.id.to_string())
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish a missing row from a lost race.
            let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM tasks WHERE id = ?")
                .bind(task.id.to_string())
                .fetch_optional(&self.pool)
                .await?;
            return Err(match exists {
                Some(_) => DomainError::ConcurrencyConflict(task.id),
                None => DomainError::TaskNotFound(task.id),
            });
        }

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(id));
        }

        Ok(())
    }

    async fn list(&self, filter: TaskFilter) -> DomainResult<Vec<Task>> {
        let mut query = String::from("SELECT * FROM tasks WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(user_id) = &filter.user_id {
            query.push_str(" AND user_id = ?");
            bindings.push(user_id.clone());
        }
        if let Some(status) = &filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if let Some(task_type) = &filter.task_type {
            query.push_str(" AND task_type = ?");
            bindings.push(task_type.as_str().to_string());
        }
        if let Some(waiting_for) = &filter.waiting_for {
            query.push_str(" AND waiting_for = ?");
            bindings.push(waiting_for.as_str().to_string());
        }
        if let Some(parent_id) = &filter.parent_task_id {
            query.push_str(" AND parent_task_id = ?");
            bindings.push(parent_id.to_string());
        }

        query.push_str(" ORDER BY created_at DESC");

        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {}", limit));
        }

        let mut q = sqlx::query_as::<_, TaskRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<TaskRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn active_tasks(&self, user_id: &str) -> DomainResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            r#"SELECT * FROM tasks
               WHERE user_id = ?
                 AND status IN ('pending', 'in_progress', 'waiting_for_response')
               ORDER BY created_at DESC"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Task::try_from).collect()
    }

    async fn waiting_tasks(
        &self,
        user_id: &str,
        waiting_for: Option<WaitingFor>,
    ) -> DomainResult<Vec<Task>> {
        self.list(TaskFilter {
            user_id: Some(user_id.to_string()),
            status: Some(TaskStatus::WaitingForResponse),
            waiting_for,
            ..Default::default()
        })
        .await
    }

    async fn overdue_tasks(&self, user_id: &str, now: DateTime<Utc>) -> DomainResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            r#"SELECT * FROM tasks
               WHERE user_id = ?
                 AND scheduled_for IS NOT NULL
                 AND scheduled_for < ?
                 AND status NOT IN ('completed', 'cancelled')
               ORDER BY scheduled_for ASC"#,
        )
        .bind(user_id)
        .bind(now.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Task::try_from).collect()
    }

    async fn subtasks(&self, parent_task_id: Uuid) -> DomainResult<Vec<Task>> {
        self.list(TaskFilter {
            parent_task_id: Some(parent_task_id),
            ..Default::default()
        })
        .await
    }

    async fn count_by_status(&self, user_id: &str) -> DomainResult<HashMap<TaskStatus, u64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM tasks WHERE user_id = ? GROUP BY status")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        let mut counts = HashMap::new();
        for (status_str, count) in rows {
            if let Some(status) = TaskStatus::from_str(&status_str) {
                counts.insert(status, count as u64);
            }
        }
        Ok(counts)
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    user_id: String,
    parent_task_id: Option<String>,
    task_type: String,
    title: String,
    description: Option<String>,
    original_request: String,
    priority: String,
    status: String,
    next_step: Option<String>,
    steps_completed: Option<String>,
    workflow_state: Option<String>,
    waiting_for: Option<String>,
    waiting_for_data: Option<String>,
    failure_reason: Option<String>,
    retry_count: i64,
    max_retries: i64,
    scheduled_for: Option<String>,
    completed_at: Option<String>,
    failed_at: Option<String>,
    last_activity_at: String,
    created_at: String,
    version: i64,
}

impl TryFrom<TaskRow> for Task {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let id = parse_uuid(&row.id)?;
        let parent_task_id = parse_optional_uuid(row.parent_task_id)?;

        let task_type = TaskType::from_str(&row.task_type).ok_or_else(|| {
            DomainError::Serialization(format!("Invalid task_type: {}", row.task_type))
        })?;

        let status = TaskStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::Serialization(format!("Invalid status: {}", row.status)))?;

        let priority = TaskPriority::from_str(&row.priority).ok_or_else(|| {
            DomainError::Serialization(format!("Invalid priority: {}", row.priority))
        })?;

        let waiting_for = row
            .waiting_for
            .as_deref()
            .map(|s| {
                WaitingFor::from_str(s).ok_or_else(|| {
                    DomainError::Serialization(format!("Invalid waiting_for: {}", s))
                })
            })
            .transpose()?;

        let steps_completed: Vec<String> = row
            .steps_completed
            .map(|s| serde_json::from_str(&s))
            .transpose()?
            .unwrap_or_default();

        let workflow_state: WorkflowState = row
            .workflow_state
            .map(|s| serde_json::from_str(&s))
            .transpose()?
            .unwrap_or_default();

        let waiting_for_data: Option<WaitDescriptor> = row
            .waiting_for_data
            .map(|s| serde_json::from_str(&s))
            .transpose()?;

        Ok(Task {
            id,
            user_id: row.user_id,
            parent_task_id,
            task_type,
            title: row.title,
            description: row.description.unwrap_or_default(),
            original_request: row.original_request,
            priority,
            status,
            next_step: row.next_step,
            steps_completed,
            workflow_state,
            waiting_for,
            waiting_for_data,
            failure_reason: row.failure_reason,
            retry_count: row.retry_count as u32,
            max_retries: row.max_retries as u32,
            scheduled_for: parse_optional_datetime(row.scheduled_for)?,
            completed_at: parse_optional_datetime(row.completed_at)?,
            failed_at: parse_optional_datetime(row.failed_at)?,
            last_activity_at: parse_datetime(&row.last_activity_at)?,
            created_at: parse_datetime(&row.created_at)?,
            version: row.version as u64,
        })
    }
}
