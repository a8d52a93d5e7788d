//! Workflow engine: classification, decomposition, step execution.
//!
//! Turns a natural-language request into either a single synchronous
//! tool call (simple path) or a persisted task with an ordered step
//! plan (complex path). Steps run strictly in ascending order; a step
//! whose outcome implies an external wait suspends the task until the
//! event matcher resumes it.
//!
//! Oracle responses are untrusted text. Every parse here is defensive
//! and backed by a deterministic total fallback, so an unavailable or
//! rambling oracle degrades the engine, never breaks it.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    EventCategory, InboundEvent, PlanStep, ReplyAnalysis, StepResult, Task, TaskStatus,
    WaitDescriptor, WaitingFor,
};
use crate::domain::ports::{ReasoningOracle, TaskRepository, ToolExecutor, ToolOutcome, ToolRequest};
use crate::services::classifier::{
    heuristic_classify, heuristic_reply_analysis, parse_oracle_classification,
    parse_oracle_reply_analysis, ActionFamily, Classification,
};
use crate::services::task_lifecycle::{CreateOptions, TaskLifecycle, TaskPatch};

/// Step identifier a freshly created task starts at.
pub const STEP_ANALYZE_AND_EXECUTE: &str = "analyze_and_execute";

/// A step's own tool call can never trigger another full breakdown:
/// decomposition is only reachable below this depth, and step execution
/// always runs in a child context.
const MAX_DECOMPOSITION_DEPTH: u8 = 1;

/// Execution context threaded through the workflow, carrying the
/// decomposition depth.
#[derive(Debug, Clone, Copy)]
struct ExecutionContext {
    depth: u8,
}

impl ExecutionContext {
    fn root() -> Self {
        Self { depth: 0 }
    }

    fn child(self) -> Self {
        Self {
            depth: self.depth.saturating_add(1),
        }
    }

    fn can_decompose(self) -> bool {
        self.depth < MAX_DECOMPOSITION_DEPTH
    }
}

/// What `handle` returns to the caller.
#[derive(Debug, Clone)]
pub enum EngineResponse {
    /// Simple path: one tool call, no task row persisted.
    Simple(ToolOutcome),
    /// Complex path: a task was created and driven as far as possible.
    Workflow(Task),
    /// The request is too ambiguous to act on.
    ClarificationNeeded(Vec<String>),
}

/// How one executed step's tool outcome is interpreted.
#[derive(Debug, Clone, PartialEq)]
pub enum StepDisposition {
    /// The step finished; move to the next one.
    Completed,
    /// The step fired an action that resolves later; suspend the task.
    Suspend {
        waiting_for: WaitingFor,
        descriptor: WaitDescriptor,
    },
    /// The executor reported a failure.
    Failed(String),
}

pub struct WorkflowEngine<R, T, O>
where
    R: TaskRepository,
    T: ToolExecutor,
    O: ReasoningOracle,
{
    lifecycle: Arc<TaskLifecycle<R>>,
    executor: Arc<T>,
    oracle: Arc<O>,
    max_plan_steps: usize,
}

impl<R, T, O> WorkflowEngine<R, T, O>
where
    R: TaskRepository,
    T: ToolExecutor,
    O: ReasoningOracle,
{
    pub fn new(lifecycle: Arc<TaskLifecycle<R>>, executor: Arc<T>, oracle: Arc<O>) -> Self {
        Self {
            lifecycle,
            executor,
            oracle,
            max_plan_steps: 20,
        }
    }

    pub fn with_max_plan_steps(mut self, max_plan_steps: usize) -> Self {
        self.max_plan_steps = max_plan_steps;
        self
    }

    /// Request entry point.
    ///
    /// Classifies the request, then either executes it directly (one
    /// tool call, no task row), creates and drives a task, or asks the
    /// user for clarification. A simple-path tool failure surfaces the
    /// executor's error directly.
    pub async fn handle(&self, user_id: &str, request: &str) -> DomainResult<EngineResponse> {
        let classification = self.classify(user_id, request).await;
        tracing::info!(user_id, ?classification, "Request classified");

        match classification {
            Classification::Simple(family) => {
                let outcome = self
                    .executor
                    .execute(user_id, ToolRequest::instruction(family.tool_name(), request))
                    .await?;
                Ok(EngineResponse::Simple(outcome))
            }
            Classification::Clarify(questions) => Ok(EngineResponse::ClarificationNeeded(questions)),
            Classification::Complex(description) => {
                let family = ActionFamily::from_str(&description);
                let task = self
                    .lifecycle
                    .create(user_id, request, family.task_type(), CreateOptions::default())
                    .await?;
                let task = self.execute_task(task.id).await?;
                Ok(EngineResponse::Workflow(task))
            }
        }
    }

    /// Start (or restart, after a retry) executing a pending task.
    pub async fn execute_task(&self, task_id: Uuid) -> DomainResult<Task> {
        let task = self
            .lifecycle
            .transition(
                task_id,
                TaskStatus::InProgress,
                TaskPatch::default().with_next_step(STEP_ANALYZE_AND_EXECUTE),
            )
            .await?;
        self.run_workflow(task, ExecutionContext::root()).await
    }

    /// Resumption entry point, invoked by the event matcher once an
    /// inbound event has been matched to this task.
    ///
    /// For email-reply waits the reply is classified before deciding
    /// whether to continue: ACCEPTED proceeds (synthesizing a calendar
    /// step when the request implied scheduling and the plan is spent),
    /// DECLINED completes with a descriptive state, UNCLEAR re-suspends
    /// on the same descriptor.
    pub async fn resume(
        &self,
        task_id: Uuid,
        category: EventCategory,
        event: &InboundEvent,
    ) -> DomainResult<Task> {
        let waiting = self.lifecycle.require(task_id).await?;
        let prior_wait = waiting.waiting_for;
        let prior_descriptor = waiting.waiting_for_data.clone();

        let task = self
            .lifecycle
            .resume(task_id, event.to_value(), TaskStatus::InProgress)
            .await?;

        tracing::info!(
            task_id = %task.id,
            category = category.as_str(),
            "Resuming task from inbound event"
        );

        if prior_wait == Some(WaitingFor::EmailReply) {
            self.resume_email_reply(task, event, prior_descriptor).await
        } else {
            self.run_workflow(task, ExecutionContext::root()).await
        }
    }

    async fn resume_email_reply(
        &self,
        mut task: Task,
        event: &InboundEvent,
        prior_descriptor: Option<WaitDescriptor>,
    ) -> DomainResult<Task> {
        let analysis = self.analyze_reply(&task, event).await;
        tracing::info!(
            task_id = %task.id,
            analysis = analysis.as_str(),
            "Reply classified"
        );

        let mut state = task.workflow_state.clone();
        state.outputs.record_reply_analysis(analysis);
        state.scratch.insert(
            "reply_disposition".to_string(),
            serde_json::Value::String(analysis.as_str().to_string()),
        );

        match analysis {
            ReplyAnalysis::Accepted => {
                if state.next_pending_step().is_none() && implies_scheduling(&task) {
                    let number = state.append_step(format!(
                        "Create a calendar event confirming: {}",
                        task.original_request
                    ));
                    tracing::debug!(task_id = %task.id, step = number, "Synthesized calendar step");
                }
                task = self
                    .lifecycle
                    .record_progress(task.id, TaskPatch::default().with_workflow_state(state))
                    .await?;
                self.run_workflow(task, ExecutionContext::root()).await
            }
            ReplyAnalysis::Declined => {
                self.lifecycle
                    .transition(
                        task.id,
                        TaskStatus::Completed,
                        TaskPatch::default().with_workflow_state(state),
                    )
                    .await
            }
            ReplyAnalysis::Unclear => {
                task = self
                    .lifecycle
                    .record_progress(task.id, TaskPatch::default().with_workflow_state(state))
                    .await?;
                match prior_descriptor {
                    Some(descriptor) => {
                        self.lifecycle
                            .mark_waiting(task.id, WaitingFor::EmailReply, descriptor)
                            .await
                    }
                    // Resumed without a descriptor on record; nothing to
                    // re-arm the wait with, so fail rather than stall.
                    None => {
                        self.fail(
                            task,
                            "reply was unclear and no wait descriptor remains".to_string(),
                        )
                        .await
                    }
                }
            }
        }
    }

    /// Drive a task forward: decompose if no plan exists yet, then
    /// execute pending steps in order until completion, suspension, or
    /// failure.
    async fn run_workflow(&self, mut task: Task, ctx: ExecutionContext) -> DomainResult<Task> {
        if task.workflow_state.plan.is_empty() {
            if !ctx.can_decompose() {
                // Depth-capped context with no plan: nothing to run.
                return self.complete(task).await;
            }
            match self.breakdown(&task).await {
                Ok(steps) if steps.is_empty() => {
                    tracing::info!(task_id = %task.id, "Empty breakdown; degenerate completion");
                    return self.complete(task).await;
                }
                Ok(steps) => {
                    let mut state = task.workflow_state.clone();
                    state.plan = steps;
                    let next = state
                        .next_pending_step()
                        .map(PlanStep::step_id)
                        .unwrap_or_else(|| STEP_ANALYZE_AND_EXECUTE.to_string());
                    task = self
                        .lifecycle
                        .record_progress(
                            task.id,
                            TaskPatch::default()
                                .with_workflow_state(state)
                                .with_next_step(next),
                        )
                        .await?;
                }
                Err(err) => return self.fail(task, err.to_string()).await,
            }
        }

        self.execute_steps(task, ctx.child()).await
    }

    /// Execute pending steps strictly in ascending step-number order.
    ///
    /// `ctx` is a child context here, so `can_decompose()` is false:
    /// the executor is told to run the step with tools but without
    /// breaking it down further.
    async fn execute_steps(&self, mut task: Task, ctx: ExecutionContext) -> DomainResult<Task> {
        loop {
            let Some(step) = task.workflow_state.next_pending_step().cloned() else {
                return self.complete(task).await;
            };

            tracing::debug!(
                task_id = %task.id,
                step = step.number,
                description = %step.description,
                "Executing step"
            );

            let request = ToolRequest::instruction("auto", &step.description)
                .with_arg("task_id", task.id.to_string())
                .with_arg("step", step.number)
                .with_arg("allow_decomposition", ctx.can_decompose());

            let outcome = match self.executor.execute(&task.user_id, request).await {
                Ok(outcome) => outcome,
                Err(err) => return self.fail(task, err.to_string()).await,
            };

            let disposition = match classify_outcome(&outcome) {
                Ok(disposition) => disposition,
                Err(err) => return self.fail(task, err.to_string()).await,
            };

            let mut state = task.workflow_state.clone();
            state.complete_step(step.number);
            state.record_step_result(StepResult {
                step_id: step.step_id(),
                tool: outcome.tool.clone(),
                message: outcome.message.clone(),
                data: outcome.data.clone(),
            });
            record_outputs(&mut state.outputs, &outcome);

            let next_step_id = state
                .next_pending_step()
                .map(PlanStep::step_id)
                .unwrap_or_else(|| "finalize".to_string());

            match disposition {
                StepDisposition::Failed(message) => {
                    return self
                        .fail_with_state(task, state, format!("step {} failed: {}", step.number, message))
                        .await;
                }
                StepDisposition::Completed => {
                    task = self
                        .lifecycle
                        .record_progress(
                            task.id,
                            TaskPatch::default()
                                .with_workflow_state(state)
                                .with_next_step(next_step_id)
                                .with_completed_step(step.step_id()),
                        )
                        .await?;
                }
                StepDisposition::Suspend {
                    waiting_for,
                    descriptor,
                } => {
                    task = self
                        .lifecycle
                        .record_progress(
                            task.id,
                            TaskPatch::default()
                                .with_workflow_state(state)
                                .with_next_step(next_step_id)
                                .with_completed_step(step.step_id()),
                        )
                        .await?;
                    return self
                        .lifecycle
                        .mark_waiting(task.id, waiting_for, descriptor)
                        .await;
                }
            }
        }
    }

    async fn complete(&self, task: Task) -> DomainResult<Task> {
        self.lifecycle
            .transition(task.id, TaskStatus::Completed, TaskPatch::default())
            .await
    }

    async fn fail(&self, task: Task, reason: String) -> DomainResult<Task> {
        tracing::warn!(task_id = %task.id, reason = %reason, "Task failed");
        self.lifecycle
            .transition(
                task.id,
                TaskStatus::Failed,
                TaskPatch::default().with_failure_reason(reason),
            )
            .await
    }

    async fn fail_with_state(
        &self,
        task: Task,
        state: crate::domain::models::WorkflowState,
        reason: String,
    ) -> DomainResult<Task> {
        tracing::warn!(task_id = %task.id, reason = %reason, "Task failed");
        self.lifecycle
            .transition(
                task.id,
                TaskStatus::Failed,
                TaskPatch::default()
                    .with_workflow_state(state)
                    .with_failure_reason(reason),
            )
            .await
    }

    /// Classify a request, falling back to the deterministic heuristic
    /// when the oracle is unavailable or returns unparseable text. The
    /// fallback is total, so classification never fails.
    async fn classify(&self, user_id: &str, request: &str) -> Classification {
        match self
            .oracle
            .complete(user_id, &classification_prompt(request), false)
            .await
        {
            Ok(text) => parse_oracle_classification(&text).unwrap_or_else(|| {
                tracing::debug!(user_id, "Unparseable classification; using heuristic");
                heuristic_classify(request)
            }),
            Err(err) => {
                tracing::warn!(user_id, error = %err, "Oracle unavailable; using heuristic");
                heuristic_classify(request)
            }
        }
    }

    /// Decompose the original request into an ordered step plan.
    async fn breakdown(&self, task: &Task) -> DomainResult<Vec<PlanStep>> {
        let text = self
            .oracle
            .complete(&task.user_id, &breakdown_prompt(&task.original_request), false)
            .await?;
        Ok(parse_step_lines(&text, self.max_plan_steps))
    }

    /// Classify the inbound reply, preferring the oracle and falling
    /// back to keyword analysis of the reply body.
    async fn analyze_reply(&self, task: &Task, event: &InboundEvent) -> ReplyAnalysis {
        let body = event
            .body
            .as_deref()
            .or(event.subject.as_deref())
            .unwrap_or_default();

        match self
            .oracle
            .complete(
                &task.user_id,
                &reply_analysis_prompt(&task.original_request, body),
                false,
            )
            .await
        {
            Ok(text) => {
                parse_oracle_reply_analysis(&text).unwrap_or_else(|| heuristic_reply_analysis(body))
            }
            Err(err) => {
                tracing::warn!(task_id = %task.id, error = %err, "Oracle unavailable; keyword reply analysis");
                heuristic_reply_analysis(body)
            }
        }
    }
}

fn classification_prompt(request: &str) -> String {
    format!(
        "Classify the following user request. Respond with exactly one line:\n\
         SIMPLE:<action-kind> for a single direct action (action-kind is email, calendar, or crm),\n\
         COMPLEX:<short description> for anything requiring multiple ordered steps or waiting on a reply,\n\
         CLARIFY:<questions separated by ;> if the request is too ambiguous to act on.\n\n\
         Request: {}",
        request
    )
}

fn breakdown_prompt(request: &str) -> String {
    format!(
        "Break the following request into a short ordered list of concrete steps, \
         each executable as a single tool action (send an email, create a calendar event, \
         update a CRM record, search for context). Respond with one step per line in the form \
         'Step N: <description>'. Do not add commentary.\n\n\
         Request: {}",
        request
    )
}

fn reply_analysis_prompt(original_request: &str, reply_body: &str) -> String {
    format!(
        "A reply arrived for this request: {}\n\n\
         Reply:\n{}\n\n\
         Did the recipient accept, decline, or is it unclear? \
         Respond with exactly one word: ACCEPTED, DECLINED, or UNCLEAR.",
        original_request, reply_body
    )
}

/// Parse `Step N: <description>` lines out of free oracle text.
///
/// Tolerates leading prose, blank lines, list markers, and out-of-order
/// numbering; steps are renumbered sequentially in the order they
/// appear. Anything unparseable is skipped.
pub fn parse_step_lines(text: &str, max_steps: usize) -> Vec<PlanStep> {
    let mut steps = Vec::new();

    for raw in text.lines() {
        let line = raw.trim().trim_start_matches(['-', '*']).trim();
        let Some(prefix) = line.get(..4) else {
            continue;
        };
        if !prefix.eq_ignore_ascii_case("step") {
            continue;
        }
        let rest = line[4..].trim_start();
        let digits_len = rest.chars().take_while(char::is_ascii_digit).count();
        if digits_len == 0 {
            continue;
        }
        let after_number = &rest[digits_len..];
        let Some(sep_idx) = after_number.find([':', '.', '-']) else {
            continue;
        };
        let description = after_number[sep_idx + 1..].trim();
        if description.is_empty() {
            continue;
        }

        steps.push(PlanStep::new(steps.len() as u32 + 1, description));
        if steps.len() >= max_steps {
            break;
        }
    }

    steps
}

/// Executor status tokens recognized as success.
const SUCCESS_TOKENS: &[&str] = &["ok", "success", "succeeded", "completed", "done", "sent"];

/// Executor status tokens recognized as failure.
const FAILURE_TOKENS: &[&str] = &["error", "failed", "failure"];

/// Interpret one tool outcome strictly.
///
/// An outcome whose status is neither a recognized success nor a
/// recognized failure token is a `ToolExecution` error: the engine
/// never reports success for a result it cannot positively classify.
pub fn classify_outcome(outcome: &ToolOutcome) -> DomainResult<StepDisposition> {
    let status = outcome.status.trim().to_lowercase();

    if FAILURE_TOKENS.contains(&status.as_str()) {
        return Ok(StepDisposition::Failed(outcome.message.clone()));
    }
    if !SUCCESS_TOKENS.contains(&status.as_str()) {
        return Err(DomainError::ToolExecution {
            tool: outcome.tool.clone(),
            message: format!("unrecognized outcome status '{}'", outcome.status),
        });
    }

    let Some(waiting_for) = suspension_kind(outcome) else {
        return Ok(StepDisposition::Completed);
    };

    let descriptor = build_wait_descriptor(outcome);
    if descriptor.is_empty() {
        // An unmatched wait would stall forever; refuse it.
        return Err(DomainError::ToolExecution {
            tool: outcome.tool.clone(),
            message: "outcome expects a response but carries no identifying fields".to_string(),
        });
    }

    Ok(StepDisposition::Suspend {
        waiting_for,
        descriptor,
    })
}

/// Whether a successful outcome reports a fire-now-resolve-later
/// action, and which kind of event resolves it.
fn suspension_kind(outcome: &ToolOutcome) -> Option<WaitingFor> {
    if let Some(kind) = outcome.data_str("waiting_for").and_then(WaitingFor::from_str) {
        return Some(kind);
    }
    if outcome.data_bool("expects_reply") == Some(true) {
        return Some(WaitingFor::EmailReply);
    }
    if outcome.data_bool("awaits_rsvp") == Some(true) {
        return Some(WaitingFor::CalendarResponse);
    }
    None
}

/// Build the wait descriptor from an outcome's structured fields.
fn build_wait_descriptor(outcome: &ToolOutcome) -> WaitDescriptor {
    WaitDescriptor {
        thread_id: outcome.data_str("thread_id").map(String::from),
        message_id: outcome.data_str("message_id").map(String::from),
        recipient_email: outcome.data_str("recipient_email").map(String::from),
        recipient_name: outcome.data_str("recipient_name").map(String::from),
        subject: outcome.data_str("subject").map(String::from),
        object_id: outcome.data_str("object_id").map(String::from),
        object_type: outcome.data_str("object_type").map(String::from),
        extra: Default::default(),
    }
}

/// Fold an outcome's structured fields into the typed outputs.
fn record_outputs(outputs: &mut crate::domain::models::WorkflowOutputs, outcome: &ToolOutcome) {
    let message_id = outcome.data_str("message_id").map(String::from);
    let thread_id = outcome.data_str("thread_id").map(String::from);
    if message_id.is_some() || thread_id.is_some() {
        outputs.record_sent_email(message_id, thread_id);
    }
    if let Some(event_id) = outcome.data_str("event_id") {
        outputs.record_calendar_event(Some(event_id.to_string()));
    }
}

/// Whether the original request implied booking something on a
/// calendar once the other side agrees.
fn implies_scheduling(task: &Task) -> bool {
    let lowered = task.original_request.to_lowercase();
    ["meet", "meeting", "schedule", "appointment", "call", "free", "available", "calendar"]
        .iter()
        .any(|k| lowered.contains(k))
}
