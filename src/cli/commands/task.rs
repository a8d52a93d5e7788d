//! Implementation of the `factotum task` commands.
//!
//! Operator inspection of the task store: list, show, retry, cancel,
//! per-user statistics, and the overdue-task signal. Retries only reset
//! the task; re-execution happens on the next engine invocation.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand};
use std::sync::Arc;
use uuid::Uuid;

use crate::adapters::sqlite::{initialize_database, SqliteTaskRepository};
use crate::cli::output::{format_task_table, output, truncate, CommandOutput};
use crate::domain::models::{Task, TaskStatus, WaitingFor};
use crate::domain::ports::{TaskFilter, TaskRepository};
use crate::infrastructure::ConfigLoader;
use crate::services::TaskLifecycle;

#[derive(Args, Debug)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommands,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// List tasks
    List {
        /// Filter by owning user
        #[arg(short, long)]
        user: Option<String>,

        /// Filter by status
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by wait kind (waiting tasks only)
        #[arg(short, long)]
        waiting_for: Option<String>,

        /// Maximum number of tasks to display
        #[arg(short, long, default_value = "50")]
        limit: i64,
    },

    /// Show details for a specific task
    Show {
        /// Task ID
        task_id: Uuid,
    },

    /// Reset a failed task to pending for re-execution
    Retry {
        /// Task ID
        task_id: Uuid,
    },

    /// Cancel a task and all of its subtasks
    Cancel {
        /// Task ID
        task_id: Uuid,

        /// Reason recorded on the task
        #[arg(short, long, default_value = "cancelled by operator")]
        reason: String,
    },

    /// Per-status task counts for a user
    Stats {
        /// Owning user
        user: String,
    },

    /// Non-terminal tasks scheduled in the past
    Overdue {
        /// Owning user
        user: String,
    },
}

async fn open_repository() -> Result<SqliteTaskRepository> {
    let config = ConfigLoader::load()?;
    let database_url = format!("sqlite://{}", config.database.path);
    let pool = initialize_database(&database_url, config.database.max_connections)
        .await
        .context("Failed to open database; run 'factotum init' first")?;
    Ok(SqliteTaskRepository::new(pool))
}

async fn open_lifecycle() -> Result<TaskLifecycle<SqliteTaskRepository>> {
    let config = ConfigLoader::load()?;
    let repo = Arc::new(open_repository().await?);
    Ok(TaskLifecycle::new(repo).with_default_max_retries(config.engine.max_retries))
}

pub async fn execute(args: TaskArgs, json_mode: bool) -> Result<()> {
    match args.command {
        TaskCommands::List {
            user,
            status,
            waiting_for,
            limit,
        } => handle_list(user, status, waiting_for, limit, json_mode).await,
        TaskCommands::Show { task_id } => handle_show(task_id, json_mode).await,
        TaskCommands::Retry { task_id } => handle_retry(task_id, json_mode).await,
        TaskCommands::Cancel { task_id, reason } => handle_cancel(task_id, &reason, json_mode).await,
        TaskCommands::Stats { user } => handle_stats(&user, json_mode).await,
        TaskCommands::Overdue { user } => handle_overdue(&user, json_mode).await,
    }
}

#[derive(Debug, serde::Serialize)]
struct TaskListOutput {
    tasks: Vec<Task>,
}

impl CommandOutput for TaskListOutput {
    fn to_human(&self) -> String {
        if self.tasks.is_empty() {
            return "No tasks found.".to_string();
        }
        format!(
            "{}\n\nShowing {} task(s)",
            format_task_table(&self.tasks),
            self.tasks.len()
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.tasks).unwrap_or_default()
    }
}

async fn handle_list(
    user: Option<String>,
    status: Option<String>,
    waiting_for: Option<String>,
    limit: i64,
    json_mode: bool,
) -> Result<()> {
    let status = status
        .as_deref()
        .map(|s| {
            TaskStatus::from_str(s).ok_or_else(|| anyhow::anyhow!("unknown status: {}", s))
        })
        .transpose()?;
    let waiting_for = waiting_for
        .as_deref()
        .map(|s| {
            WaitingFor::from_str(s).ok_or_else(|| anyhow::anyhow!("unknown wait kind: {}", s))
        })
        .transpose()?;

    let repo = open_repository().await?;
    let tasks = repo
        .list(TaskFilter {
            user_id: user,
            status,
            waiting_for,
            limit: Some(limit),
            ..Default::default()
        })
        .await
        .context("Failed to list tasks")?;

    output(&TaskListOutput { tasks }, json_mode);
    Ok(())
}

#[derive(Debug, serde::Serialize)]
struct TaskShowOutput {
    task: Task,
}

impl CommandOutput for TaskShowOutput {
    fn to_human(&self) -> String {
        let task = &self.task;
        let mut lines = vec![
            "Task Details:".to_string(),
            format!("  ID: {}", task.id),
            format!("  User: {}", task.user_id),
            format!("  Type: {}", task.task_type.as_str()),
            format!("  Status: {}", task.status.as_str()),
            format!("  Priority: {}", task.priority.as_str()),
            format!("  Title: {}", task.title),
            format!("  Request: {}", truncate(&task.original_request, 120)),
            format!("  Retries: {}/{}", task.retry_count, task.max_retries),
            format!(
                "  Created at: {}",
                task.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            format!(
                "  Last activity: {}",
                task.last_activity_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
        ];

        if let Some(parent_id) = task.parent_task_id {
            lines.push(format!("  Parent: {}", parent_id));
        }
        if let Some(next_step) = &task.next_step {
            lines.push(format!("  Next step: {}", next_step));
        }
        if !task.steps_completed.is_empty() {
            lines.push(format!(
                "  Steps completed: {}",
                task.steps_completed.join(", ")
            ));
        }
        if let Some(waiting_for) = task.waiting_for {
            lines.push(format!("  Waiting on: {}", waiting_for.as_str()));
        }
        if let Some(descriptor) = &task.waiting_for_data {
            if let Some(thread_id) = &descriptor.thread_id {
                lines.push(format!("    Thread: {}", thread_id));
            }
            if let Some(recipient) = &descriptor.recipient_email {
                lines.push(format!("    Recipient: {}", recipient));
            }
        }
        if let Some(reason) = &task.failure_reason {
            lines.push(format!("  Failure reason: {}", reason));
        }
        if let Some(completed_at) = task.completed_at {
            lines.push(format!(
                "  Completed at: {}",
                completed_at.format("%Y-%m-%d %H:%M:%S UTC")
            ));
        }
        if let Some(failed_at) = task.failed_at {
            lines.push(format!(
                "  Failed at: {}",
                failed_at.format("%Y-%m-%d %H:%M:%S UTC")
            ));
        }

        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.task).unwrap_or_default()
    }
}

async fn handle_show(task_id: Uuid, json_mode: bool) -> Result<()> {
    let lifecycle = open_lifecycle().await?;
    let task = lifecycle
        .get(task_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Task {} not found", task_id))?;
    output(&TaskShowOutput { task }, json_mode);
    Ok(())
}

#[derive(Debug, serde::Serialize)]
struct TaskActionOutput {
    message: String,
    task_ids: Vec<Uuid>,
}

impl CommandOutput for TaskActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

async fn handle_retry(task_id: Uuid, json_mode: bool) -> Result<()> {
    let lifecycle = open_lifecycle().await?;
    let task = lifecycle.retry(task_id).await?;
    output(
        &TaskActionOutput {
            message: format!(
                "Task {} reset to pending (attempt {}/{})",
                task_id, task.retry_count, task.max_retries
            ),
            task_ids: vec![task_id],
        },
        json_mode,
    );
    Ok(())
}

async fn handle_cancel(task_id: Uuid, reason: &str, json_mode: bool) -> Result<()> {
    let lifecycle = open_lifecycle().await?;
    let cancelled = lifecycle.cancel(task_id, reason).await?;
    output(
        &TaskActionOutput {
            message: format!("Cancelled {} task(s)", cancelled.len()),
            task_ids: cancelled,
        },
        json_mode,
    );
    Ok(())
}

#[derive(Debug, serde::Serialize)]
struct TaskStatsOutput {
    user: String,
    counts: Vec<(String, u64)>,
}

impl CommandOutput for TaskStatsOutput {
    fn to_human(&self) -> String {
        if self.counts.is_empty() {
            return format!("No tasks for user {}.", self.user);
        }
        let mut lines = vec![format!("Task counts for {}:", self.user)];
        for (status, count) in &self.counts {
            lines.push(format!("  {:<22} {}", status, count));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

async fn handle_stats(user: &str, json_mode: bool) -> Result<()> {
    let lifecycle = open_lifecycle().await?;
    let counts = lifecycle.status_counts(user).await?;

    let mut counts: Vec<(String, u64)> = counts
        .into_iter()
        .map(|(status, count)| (status.as_str().to_string(), count))
        .collect();
    counts.sort();

    output(
        &TaskStatsOutput {
            user: user.to_string(),
            counts,
        },
        json_mode,
    );
    Ok(())
}

async fn handle_overdue(user: &str, json_mode: bool) -> Result<()> {
    let lifecycle = open_lifecycle().await?;
    let tasks = lifecycle.overdue_tasks(user, Utc::now()).await?;
    output(&TaskListOutput { tasks }, json_mode);
    Ok(())
}
