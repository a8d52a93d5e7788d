//! Task domain model.
//!
//! A task is a persisted, resumable unit of multi-step work owned by a
//! single user. Tasks move through a small state machine and may suspend
//! on an external wait (an email reply, a calendar response) recorded as
//! a wait descriptor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::workflow_state::WorkflowState;

/// Status of a task in the orchestration pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is created but execution has not started
    Pending,
    /// Task steps are being executed
    InProgress,
    /// Task is suspended until an external event arrives
    WaitingForResponse,
    /// Task finished successfully
    Completed,
    /// Task failed during execution
    Failed,
    /// Task was cancelled by an operator
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::WaitingForResponse => "waiting_for_response",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "waiting_for_response" | "waiting" => Some(Self::WaitingForResponse),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Valid transitions from this status.
    ///
    /// `Failed` is only left through retry paths; `Completed` and
    /// `Cancelled` are final.
    pub fn valid_transitions(&self) -> Vec<TaskStatus> {
        match self {
            Self::Pending => vec![Self::InProgress, Self::Cancelled],
            Self::InProgress => vec![
                Self::Completed,
                Self::WaitingForResponse,
                Self::Failed,
                Self::Cancelled,
            ],
            Self::WaitingForResponse => vec![Self::InProgress, Self::Failed, Self::Cancelled],
            Self::Failed => vec![Self::Pending, Self::InProgress],
            Self::Completed => vec![],
            Self::Cancelled => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// Closed set of task kinds the orchestrator knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    EmailWorkflow,
    CalendarWorkflow,
    HubspotWorkflow,
    EmailCalendarWorkflow,
    MultiStepAction,
    ScheduledTask,
    RecurringTask,
    FollowUpTask,
    CompositeTask,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmailWorkflow => "email_workflow",
            Self::CalendarWorkflow => "calendar_workflow",
            Self::HubspotWorkflow => "hubspot_workflow",
            Self::EmailCalendarWorkflow => "email_calendar_workflow",
            Self::MultiStepAction => "multi_step_action",
            Self::ScheduledTask => "scheduled_task",
            Self::RecurringTask => "recurring_task",
            Self::FollowUpTask => "follow_up_task",
            Self::CompositeTask => "composite_task",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "email_workflow" => Some(Self::EmailWorkflow),
            "calendar_workflow" => Some(Self::CalendarWorkflow),
            "hubspot_workflow" => Some(Self::HubspotWorkflow),
            "email_calendar_workflow" => Some(Self::EmailCalendarWorkflow),
            "multi_step_action" => Some(Self::MultiStepAction),
            "scheduled_task" => Some(Self::ScheduledTask),
            "recurring_task" => Some(Self::RecurringTask),
            "follow_up_task" => Some(Self::FollowUpTask),
            "composite_task" => Some(Self::CompositeTask),
        _ => None,
        }
    }
}

/// Priority level for tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low = 1,
    Medium = 2,
    High = 3,
    Urgent = 4,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "normal" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" | "critical" => Some(Self::Urgent),
            _ => None,
        }
    }
}

/// What kind of external event a waiting task expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitingFor {
    EmailReply,
    CalendarResponse,
    ExternalApproval,
    ScheduledTime,
    UserInput,
    ApiResponse,
    WebhookEvent,
    ManualCompletion,
}

impl WaitingFor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmailReply => "email_reply",
            Self::CalendarResponse => "calendar_response",
            Self::ExternalApproval => "external_approval",
            Self::ScheduledTime => "scheduled_time",
            Self::UserInput => "user_input",
            Self::ApiResponse => "api_response",
            Self::WebhookEvent => "webhook_event",
            Self::ManualCompletion => "manual_completion",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "email_reply" => Some(Self::EmailReply),
            "calendar_response" => Some(Self::CalendarResponse),
            "external_approval" => Some(Self::ExternalApproval),
            "scheduled_time" => Some(Self::ScheduledTime),
            "user_input" => Some(Self::UserInput),
            "api_response" => Some(Self::ApiResponse),
            "webhook_event" => Some(Self::WebhookEvent),
            "manual_completion" => Some(Self::ManualCompletion),
            _ => None,
        }
    }
}

/// The minimal fields needed to later match an inbound event against a
/// waiting task. Webhooks often arrive with only coarse identifiers, so
/// every field is optional; the descriptor as a whole must be non-empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitDescriptor {
    /// Mail thread the reply is expected on
    pub thread_id: Option<String>,
    /// Message id of the outbound message
    pub message_id: Option<String>,
    /// Address the outbound message was sent to
    pub recipient_email: Option<String>,
    /// Display name of the expected responder
    pub recipient_name: Option<String>,
    /// Subject line of the outbound message
    pub subject: Option<String>,
    /// CRM/calendar object id being watched
    pub object_id: Option<String>,
    /// CRM/calendar object type
    pub object_type: Option<String>,
    /// Anything else a tool recorded for matching
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

impl WaitDescriptor {
    /// A descriptor with no identifying fields cannot be matched and is
    /// rejected by `mark_waiting`.
    pub fn is_empty(&self) -> bool {
        self.thread_id.is_none()
            && self.message_id.is_none()
            && self.recipient_email.is_none()
            && self.recipient_name.is_none()
            && self.subject.is_none()
            && self.object_id.is_none()
            && self.object_type.is_none()
            && self.extra.is_empty()
    }

    pub fn with_thread_id(mut self, id: impl Into<String>) -> Self {
        self.thread_id = Some(id.into());
        self
    }

    pub fn with_recipient_email(mut self, email: impl Into<String>) -> Self {
        self.recipient_email = Some(email.into());
        self
    }

    pub fn with_recipient_name(mut self, name: impl Into<String>) -> Self {
        self.recipient_name = Some(name.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_object(mut self, id: impl Into<String>, object_type: impl Into<String>) -> Self {
        self.object_id = Some(id.into());
        self.object_type = Some(object_type.into());
        self
    }
}

/// A persisted, resumable unit of multi-step work owned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: Uuid,
    /// Owning user
    pub user_id: String,
    /// Parent task (for subtasks)
    pub parent_task_id: Option<Uuid>,
    /// Workflow kind
    pub task_type: TaskType,
    /// Human-readable title
    pub title: String,
    /// Detailed description
    pub description: String,
    /// Verbatim user text; replay source of truth
    pub original_request: String,
    /// Priority
    pub priority: TaskPriority,
    /// Current status
    pub status: TaskStatus,
    /// Opaque step identifier the engine resumes at
    pub next_step: Option<String>,
    /// Ordered, de-duplicated step identifiers; append-only
    pub steps_completed: Vec<String>,
    /// Accumulated step outputs and plan
    pub workflow_state: WorkflowState,
    /// Kind of external event this task is suspended on
    pub waiting_for: Option<WaitingFor>,
    /// Fields needed to match the expected event
    pub waiting_for_data: Option<WaitDescriptor>,
    /// Why the task failed, verbatim
    pub failure_reason: Option<String>,
    /// Retry count
    pub retry_count: u32,
    /// Maximum retries
    pub max_retries: u32,
    /// When the task is due to run (scheduled/recurring kinds)
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Set once, at the transition into Completed
    pub completed_at: Option<DateTime<Utc>>,
    /// Set once, at the first transition into Failed
    pub failed_at: Option<DateTime<Utc>>,
    /// Updated on every mutation
    pub last_activity_at: DateTime<Utc>,
    /// When created
    pub created_at: DateTime<Utc>,
    /// Version for optimistic locking
    pub version: u64,
}

impl Task {
    /// Create a new pending task for a user request. Title is derived
    /// from the first line of the request.
    pub fn new(user_id: impl Into<String>, original_request: impl Into<String>, task_type: TaskType) -> Self {
        let original_request = original_request.into();
        let title = generate_title(&original_request);
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            parent_task_id: None,
            task_type,
            title,
            description: original_request.clone(),
            original_request,
            priority: TaskPriority::default(),
            status: TaskStatus::default(),
            next_step: None,
            steps_completed: Vec::new(),
            workflow_state: WorkflowState::default(),
            waiting_for: None,
            waiting_for_data: None,
            failure_reason: None,
            retry_count: 0,
            max_retries: 3,
            scheduled_for: None,
            completed_at: None,
            failed_at: None,
            last_activity_at: now,
            created_at: now,
            version: 1,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_parent(mut self, parent_task_id: Uuid) -> Self {
        self.parent_task_id = Some(parent_task_id);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }

    /// Check if can transition to given status.
    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Transition to new status, stamping terminal timestamps.
    ///
    /// `completed_at` and `failed_at` are written exactly once; a retried
    /// task keeps the `failed_at` of its first failure.
    pub fn transition_to(&mut self, new_status: TaskStatus) -> Result<(), String> {
        if !self.can_transition_to(new_status) {
            return Err(format!(
                "cannot transition from {} to {}",
                self.status.as_str(),
                new_status.as_str()
            ));
        }

        self.status = new_status;
        self.touch();

        match new_status {
            TaskStatus::Completed if self.completed_at.is_none() => {
                self.completed_at = Some(Utc::now());
            }
            TaskStatus::Failed if self.failed_at.is_none() => {
                self.failed_at = Some(Utc::now());
            }
            _ => {}
        }

        Ok(())
    }

    /// Stamp activity and bump the optimistic-lock version.
    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
        self.version += 1;
    }

    /// Record a completed step identifier. Append-only, de-duplicated.
    pub fn record_completed_step(&mut self, step_id: impl Into<String>) {
        let step_id = step_id.into();
        if !self.steps_completed.contains(&step_id) {
            self.steps_completed.push(step_id);
        }
    }

    /// Check if task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check if task can be retried.
    pub fn can_retry(&self) -> bool {
        self.status == TaskStatus::Failed && self.retry_count < self.max_retries
    }

    /// Increment retry count and reset to Pending for re-execution.
    pub fn retry(&mut self) -> Result<(), String> {
        if !self.can_retry() {
            return Err("cannot retry: either not failed or max retries reached".to_string());
        }
        self.retry_count += 1;
        self.status = TaskStatus::Pending;
        self.failure_reason = None;
        self.touch();
        Ok(())
    }

    /// Check the waiting invariant: `WaitingForResponse` iff a usable
    /// wait descriptor is present.
    pub fn wait_state_consistent(&self) -> bool {
        let has_descriptor = self.waiting_for.is_some()
            && self.waiting_for_data.as_ref().is_some_and(|d| !d.is_empty());
        (self.status == TaskStatus::WaitingForResponse) == has_descriptor
    }

    /// Validate structural fields at creation time.
    pub fn validate(&self) -> Result<(), String> {
        if self.user_id.trim().is_empty() {
            return Err("task user_id cannot be empty".to_string());
        }
        if self.original_request.trim().is_empty() {
            return Err("task original_request cannot be empty".to_string());
        }
        if self.title.is_empty() {
            return Err("task title cannot be empty".to_string());
        }
        if self.parent_task_id == Some(self.id) {
            return Err("task cannot be its own parent".to_string());
        }
        Ok(())
    }
}

/// Generate a short title from a request string.
/// Takes the first line, truncates at ~80 chars on a word boundary.
fn generate_title(request: &str) -> String {
    let first_line = request.lines().next().unwrap_or(request).trim();
    if first_line.is_empty() {
        return "Untitled task".to_string();
    }
    let max_chars = 80;
    // Byte index of the cut point; never lands inside a multibyte char.
    let cut = match first_line.char_indices().nth(max_chars) {
        Some((idx, _)) => idx,
        None => return first_line.to_string(),
    };
    let head = &first_line[..cut];
    match head.rfind(' ') {
        Some(pos) => format!("{}...", &head[..pos]),
        None => format!("{}...", head),
    }
}
